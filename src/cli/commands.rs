use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Change detection and versioned packaging for a directory of applications
#[derive(Parser, Debug)]
#[command(
    name = "repkeeper",
    about = "Change detection and versioned packaging for a directory of applications",
    version,
    long_about = "repkeeper fingerprints every application under an apps directory, \
                  keeps a version and status per application in SQLite, and writes a \
                  versioned tar.gz archive plus a deployment plan whenever an \
                  application's content changes."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'c',
        long,
        global = true,
        value_name = "FILE",
        help = "Configuration file (defaults to ./repkeeper.yaml when present)"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Detect changes and package applications",
        long_about = "Fingerprints every application directory, bumps versions for changed \
                      applications, and writes archives and deployment plans.\n\n\
                      Examples:\n  \
                      repkeeper run\n  \
                      repkeeper run --app billing\n  \
                      repkeeper run --jobs 4 --format json"
    )]
    Run(RunArgs),

    #[command(
        about = "Show recorded versions and statuses",
        long_about = "Lists application records from the database.\n\n\
                      Examples:\n  \
                      repkeeper status\n  \
                      repkeeper status billing\n  \
                      repkeeper status --all --format yaml"
    )]
    Status(StatusArgs),

    #[command(about = "Print the fingerprint of a directory")]
    Fingerprint(FingerprintArgs),

    #[command(about = "Fingerprint the contents of an archive")]
    Verify(VerifyArgs),

    #[command(
        about = "Report mismatches between the apps directory and the database",
        long_about = "Finds unregistered directories, registered applications without a \
                      directory, missing required files and TODO/FIXME markers. Never \
                      modifies the database.\n\n\
                      Examples:\n  \
                      repkeeper discrepancies\n  \
                      repkeeper discrepancies --output report.md"
    )]
    Discrepancies(DiscrepanciesArgs),

    #[command(about = "Attach a note to an application")]
    AddNote(AddNoteArgs),

    #[command(about = "Show the notes attached to an application")]
    ShowNotes(AppArg),

    #[command(about = "Stop processing an application, keeping its history")]
    Retire(AppArg),

    #[command(about = "Resume processing a retired application")]
    Reinstate(AppArg),

    #[command(
        about = "Write the deployment plan for an application",
        long_about = "Re-emits the deployment plan for the recorded version, or for the \
                      given version.\n\n\
                      Examples:\n  \
                      repkeeper plan billing\n  \
                      repkeeper plan billing --version 3"
    )]
    Plan(PlanArgs),

    #[command(about = "Show the resolved configuration")]
    Config(ConfigArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, value_name = "NAME", help = "Process only this application")]
    pub app: Option<String>,

    #[arg(
        short = 'j',
        long,
        value_name = "N",
        help = "Applications processed concurrently (overrides configuration)"
    )]
    pub jobs: Option<usize>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    #[arg(value_name = "APP", help = "Show a single application")]
    pub app: Option<String>,

    #[arg(long, help = "Include retired applications")]
    pub all: bool,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct FingerprintArgs {
    #[arg(value_name = "DIR", help = "Directory to fingerprint")]
    pub directory: PathBuf,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct VerifyArgs {
    #[arg(value_name = "ARCHIVE", help = "Archive written by `repkeeper run`")]
    pub archive: PathBuf,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct DiscrepanciesArgs {
    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Report path (defaults to <output_directory>/discrepancy_report.md)"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct AddNoteArgs {
    #[arg(value_name = "APP")]
    pub app: String,

    #[arg(value_name = "NOTE")]
    pub note: String,
}

#[derive(Parser, Debug, Clone)]
pub struct AppArg {
    #[arg(value_name = "APP")]
    pub app: String,
}

#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    #[arg(value_name = "APP")]
    pub app: String,

    #[arg(long, value_name = "N", help = "Version to plan (defaults to the recorded one)")]
    pub version: Option<i64>,
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_run_args() {
        let args = CliArgs::parse_from(["repkeeper", "run"]);
        match args.command {
            Commands::Run(run) => {
                assert!(run.app.is_none());
                assert!(run.jobs.is_none());
                assert_eq!(run.format, OutputFormatArg::Human);
            }
            _ => panic!("Expected Run command"),
        }
        assert!(args.config.is_none());
        assert!(!args.verbose);
    }

    #[test]
    fn test_run_with_options() {
        let args = CliArgs::parse_from([
            "repkeeper", "run", "--app", "billing", "-j", "4", "--format", "json",
        ]);
        match args.command {
            Commands::Run(run) => {
                assert_eq!(run.app.as_deref(), Some("billing"));
                assert_eq!(run.jobs, Some(4));
                assert_eq!(run.format, OutputFormatArg::Json);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from([
            "repkeeper",
            "status",
            "--all",
            "--config",
            "/etc/repkeeper.toml",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/etc/repkeeper.toml")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        match args.command {
            Commands::Status(status) => {
                assert!(status.all);
                assert!(status.app.is_none());
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_add_note() {
        let args = CliArgs::parse_from(["repkeeper", "add-note", "web", "rotated keys"]);
        match args.command {
            Commands::AddNote(note) => {
                assert_eq!(note.app, "web");
                assert_eq!(note.note, "rotated keys");
            }
            _ => panic!("Expected AddNote command"),
        }
    }

    #[test]
    fn test_plan_version() {
        let args = CliArgs::parse_from(["repkeeper", "plan", "web", "--version", "3"]);
        match args.command {
            Commands::Plan(plan) => {
                assert_eq!(plan.app, "web");
                assert_eq!(plan.version, Some(3));
            }
            _ => panic!("Expected Plan command"),
        }
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        let result = CliArgs::try_parse_from(["repkeeper", "-v", "-q", "status"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_fingerprint_requires_directory() {
        let result = CliArgs::try_parse_from(["repkeeper", "fingerprint"]);
        assert!(result.is_err());
    }
}
