use repkeeper::cli::commands::{
    AddNoteArgs, AppArg, CliArgs, Commands, ConfigArgs, DiscrepanciesArgs, FingerprintArgs,
    PlanArgs, RunArgs, StatusArgs, VerifyArgs,
};
use repkeeper::cli::output::OutputFormatter;
use repkeeper::cli::suggest::unknown_app_message;
use repkeeper::packager::verify_archive;
use repkeeper::progress::LoggingHandler;
use repkeeper::util::logging::{self, parse_level, LoggingConfig};
use repkeeper::workflow::discover_applications;
use repkeeper::{
    plan, DiscrepancyAnalyzer, Manager, RepkeeperConfig, StorageError, Store, TreeFingerprinter,
    NAME, VERSION,
};

use anyhow::{Context, Result};
use clap::Parser;
use std::process;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Level};

/// Exit code for a run that finished with per-application failures
const EXIT_PARTIAL: i32 = 2;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let loaded = RepkeeperConfig::load(args.config.as_deref());
    init_logging_from_args(&args, loaded.as_ref().ok());

    debug!("{} v{} starting", NAME, VERSION);
    debug!("Arguments: {:?}", args);

    let config = match loaded.and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    let exit_code = match &args.command {
        Commands::Run(run_args) => handle_run(run_args, config).await,
        Commands::Status(status_args) => report(handle_status(status_args, &config)),
        Commands::Fingerprint(fp_args) => report(handle_fingerprint(fp_args)),
        Commands::Verify(verify_args) => report(handle_verify(verify_args)),
        Commands::Discrepancies(d_args) => report(handle_discrepancies(d_args, &config)),
        Commands::AddNote(note_args) => report(handle_add_note(note_args, &config)),
        Commands::ShowNotes(app) => report(handle_show_notes(app, &config)),
        Commands::Retire(app) => report(handle_retire(app, &config, true)),
        Commands::Reinstate(app) => report(handle_retire(app, &config, false)),
        Commands::Plan(plan_args) => report(handle_plan(plan_args, &config)),
        Commands::Config(config_args) => report(handle_config(config_args, &config)),
    };

    process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs, config: Option<&RepkeeperConfig>) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        config
            .map(|c| parse_level(&c.log_level))
            .unwrap_or(Level::INFO)
    };

    logging::init_logging(LoggingConfig::with_level(level).with_env_overrides());
}

fn report(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

fn open_store(config: &RepkeeperConfig) -> Result<Store> {
    Store::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))
}

/// Turn a `NotFound` for `app` into a message with a suggestion.
fn explain_missing(err: StorageError, app: &str, store: &Store) -> anyhow::Error {
    match err {
        StorageError::NotFound(_) => {
            let names: Vec<String> = store
                .list()
                .map(|records| records.into_iter().map(|r| r.name).collect())
                .unwrap_or_default();
            anyhow::anyhow!(unknown_app_message(app, names.iter().map(String::as_str)))
        }
        other => other.into(),
    }
}

async fn handle_run(args: &RunArgs, mut config: RepkeeperConfig) -> i32 {
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
        if let Err(e) = config.validate() {
            error!("Configuration error: {}", e);
            return 1;
        }
    }

    let store = match open_store(&config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("{:#}", e);
            return 1;
        }
    };

    let names = match discover_applications(&config.apps_directory) {
        Ok(names) => names,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };
    let names = match &args.app {
        Some(app) if names.contains(app) => vec![app.clone()],
        Some(app) => {
            error!(
                "{}",
                unknown_app_message(app, names.iter().map(String::as_str))
            );
            return 1;
        }
        None => names,
    };

    info!(applications = names.len(), jobs = config.jobs, "Starting run");
    let manager = Manager::new(config, store).with_progress(Arc::new(LoggingHandler));
    let summary = match manager.run_apps(names).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Run aborted: {}", e);
            return 1;
        }
    };

    let formatter = OutputFormatter::new(args.format.into());
    match formatter.format_run(&summary) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            error!("{:#}", e);
            return 1;
        }
    }

    if summary.has_failures() {
        warn!(failures = summary.failures.len(), "Some applications failed");
        EXIT_PARTIAL
    } else {
        0
    }
}

fn handle_status(args: &StatusArgs, config: &RepkeeperConfig) -> Result<i32> {
    let store = open_store(config)?;
    let records = match &args.app {
        Some(app) => match store.find(app)? {
            Some(record) => vec![record],
            None => return Err(explain_missing(StorageError::NotFound(app.clone()), app, &store)),
        },
        None if args.all => store.list()?,
        None => store.list_active()?,
    };

    let formatter = OutputFormatter::new(args.format.into());
    print!("{}", formatter.format_status(&records)?);
    Ok(0)
}

fn handle_fingerprint(args: &FingerprintArgs) -> Result<i32> {
    let scan = TreeFingerprinter::new(&args.directory)
        .fingerprint()
        .with_context(|| format!("Failed to fingerprint {}", args.directory.display()))?;

    let formatter = OutputFormatter::new(args.format.into());
    print!("{}", formatter.format_fingerprint(&scan)?);
    Ok(0)
}

fn handle_verify(args: &VerifyArgs) -> Result<i32> {
    let contents = verify_archive(&args.archive)?;

    let formatter = OutputFormatter::new(args.format.into());
    print!("{}", formatter.format_archive(&contents)?);
    Ok(0)
}

fn handle_discrepancies(args: &DiscrepanciesArgs, config: &RepkeeperConfig) -> Result<i32> {
    let store = open_store(config)?;
    let report = DiscrepancyAnalyzer::new(config, &store).analyze()?;

    let path = args
        .output
        .clone()
        .unwrap_or_else(|| config.output_directory.join("discrepancy_report.md"));
    report.write_to(&path)?;

    if report.is_empty() {
        println!("No discrepancies found.");
    } else {
        println!(
            "{} findings across {} applications",
            report.total(),
            report.applications.len()
        );
    }
    println!("Report written to {}", path.display());
    Ok(0)
}

fn handle_add_note(args: &AddNoteArgs, config: &RepkeeperConfig) -> Result<i32> {
    let store = open_store(config)?;
    let note = store
        .add_note(&args.app, &args.note)
        .map_err(|e| explain_missing(e, &args.app, &store))?;

    info!(app = %args.app, note_id = note.id, "Added note");
    println!("Added note to {}", args.app);
    Ok(0)
}

fn handle_show_notes(args: &AppArg, config: &RepkeeperConfig) -> Result<i32> {
    let store = open_store(config)?;
    let notes = store
        .notes(&args.app)
        .map_err(|e| explain_missing(e, &args.app, &store))?;

    let formatter = OutputFormatter::new(repkeeper::cli::OutputFormat::Human);
    print!("{}", formatter.format_notes(&args.app, &notes)?);
    Ok(0)
}

fn handle_retire(args: &AppArg, config: &RepkeeperConfig, retire: bool) -> Result<i32> {
    let store = open_store(config)?;
    let result = if retire {
        store.retire(&args.app)
    } else {
        store.reinstate(&args.app)
    };
    let record = result.map_err(|e| explain_missing(e, &args.app, &store))?;

    if retire {
        info!(app = %record.name, version = record.version, "Retired application");
        println!("Retired {} at v{}", record.name, record.version);
    } else {
        info!(app = %record.name, version = record.version, "Reinstated application");
        println!("Reinstated {} at v{}", record.name, record.version);
    }
    Ok(0)
}

fn handle_plan(args: &PlanArgs, config: &RepkeeperConfig) -> Result<i32> {
    let store = open_store(config)?;
    let record = match store.find(&args.app)? {
        Some(record) => record,
        None => {
            return Err(explain_missing(
                StorageError::NotFound(args.app.clone()),
                &args.app,
                &store,
            ))
        }
    };

    let version = args.version.unwrap_or(record.version);
    if version < 1 || version > record.version {
        anyhow::bail!(
            "{} has versions 1 through {}; cannot plan v{}",
            record.name,
            record.version,
            version
        );
    }

    let path = plan::emit(&record.name, version, &config.deployment_plans_directory)?;
    println!("{}", path.display());
    Ok(0)
}

fn handle_config(args: &ConfigArgs, config: &RepkeeperConfig) -> Result<i32> {
    let formatter = OutputFormatter::new(args.format.into());
    print!("{}", formatter.format_config(config)?);
    Ok(0)
}
