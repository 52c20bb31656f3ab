//! Change detection between two fingerprints

use crate::fingerprint::Fingerprint;
use serde::Serialize;

/// Paths that differ between a current and a stored fingerprint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn total(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

/// Returns true iff the fingerprints are not equal as mappings.
pub fn detect(current: &Fingerprint, stored: &Fingerprint) -> bool {
    current != stored
}

/// Computes the full per-path difference. Output lists are sorted.
pub fn diff(current: &Fingerprint, stored: &Fingerprint) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (path, digest) in current.iter() {
        match stored.get(path) {
            None => changes.added.push(path.to_string()),
            Some(previous) if previous != digest => changes.modified.push(path.to_string()),
            Some(_) => {}
        }
    }

    changes.removed = stored
        .paths()
        .filter(|path| !current.contains(path))
        .map(str::to_string)
        .collect();

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    fn fp(entries: &[(&str, &str)]) -> Fingerprint {
        entries
            .iter()
            .map(|(p, d)| (p.to_string(), d.to_string()))
            .collect()
    }

    #[parameterized(
        both_empty = { &[], &[], false },
        identical = { &[("a.txt", "1"), ("b.txt", "2")], &[("a.txt", "1"), ("b.txt", "2")], false },
        added = { &[("a.txt", "1"), ("b.txt", "2")], &[("a.txt", "1")], true },
        removed = { &[("a.txt", "1")], &[("a.txt", "1"), ("b.txt", "2")], true },
        modified = { &[("a.txt", "changed")], &[("a.txt", "1")], true },
        renamed = { &[("c.txt", "1")], &[("a.txt", "1")], true },
        first_analysis = { &[("a.txt", "1")], &[], true },
    )]
    fn test_detect(current: &[(&str, &str)], stored: &[(&str, &str)], expected: bool) {
        let current = fp(current);
        let stored = fp(stored);
        assert_eq!(detect(&current, &stored), expected);
        assert_eq!(diff(&current, &stored).is_empty(), !expected);
    }

    #[test]
    fn test_diff_classifies_paths() {
        let current = fp(&[("keep", "1"), ("edit", "new"), ("fresh", "3")]);
        let stored = fp(&[("keep", "1"), ("edit", "old"), ("gone", "4")]);

        let changes = diff(&current, &stored);
        assert_eq!(changes.added, vec!["fresh"]);
        assert_eq!(changes.removed, vec!["gone"]);
        assert_eq!(changes.modified, vec!["edit"]);
        assert_eq!(changes.total(), 3);
    }
}
