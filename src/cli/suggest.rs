//! "Did you mean" suggestions for mistyped application names

/// Candidates scoring below this are not worth suggesting.
const MIN_SIMILARITY: f64 = 0.8;

/// Returns the candidate closest to `name`, if any is close enough.
pub fn closest<'a, I>(name: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .filter(|candidate| *candidate != name)
        .map(|candidate| (candidate, strsim::jaro_winkler(name, candidate)))
        .filter(|(_, score)| *score >= MIN_SIMILARITY)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}

/// `"Unknown application 'x'"`, with a suggestion appended when one exists.
pub fn unknown_app_message<'a, I>(name: &str, candidates: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    match closest(name, candidates) {
        Some(suggestion) => format!(
            "Unknown application '{}'. Did you mean '{}'?",
            name, suggestion
        ),
        None => format!("Unknown application '{}'", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    const APPS: &[&str] = &["billing-api", "web-frontend", "python-worker"];

    #[parameterized(
        typo = { "biling-api", Some("billing-api") },
        missing_suffix = { "web-fronten", Some("web-frontend") },
        unrelated = { "zzz", None },
    )]
    fn test_closest(name: &str, expected: Option<&str>) {
        assert_eq!(closest(name, APPS.iter().copied()), expected);
    }

    #[test]
    fn test_unknown_app_message() {
        let message = unknown_app_message("python-workr", APPS.iter().copied());
        assert_eq!(
            message,
            "Unknown application 'python-workr'. Did you mean 'python-worker'?"
        );
        assert_eq!(
            unknown_app_message("x", std::iter::empty()),
            "Unknown application 'x'"
        );
    }
}
