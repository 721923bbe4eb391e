//! Rollbook CLI
//!
//! Runs one student-roll demo scenario against a fresh store and prints its
//! report to stdout.

use clap::{Parser, ValueEnum};
use rollbook_core::{open_db, open_db_in_memory, reset_store, run_scenario, Scenario, Session};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "rollbook")]
#[command(about = "Student roll CRUD sandbox over embedded SQLite", long_about = None)]
struct Cli {
    /// Scenario to run after the schema is created
    #[arg(value_enum, default_value_t = ScenarioArg::BulkInsert)]
    scenario: ScenarioArg,

    /// SQLite file to use instead of an in-memory store
    #[arg(long)]
    db: Option<PathBuf>,

    /// Delete every stored student before running the scenario
    #[arg(long)]
    reset: bool,

    /// Log level for file logging (trace|debug|info|warn|error)
    #[arg(long, default_value_t = rollbook_core::default_log_level().to_string())]
    log_level: String,

    /// Absolute directory for log files; logging is off when unset
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScenarioArg {
    BulkInsert,
    SingleInsert,
    QueryAll,
    SelectNames,
    OrderByName,
    GradeDesc,
    Oldest,
    Youngest,
    First,
    Count,
    Filter,
    UpdateTracked,
    UpdateBulk,
    Delete,
    DeleteBulk,
}

impl From<ScenarioArg> for Scenario {
    fn from(value: ScenarioArg) -> Self {
        match value {
            ScenarioArg::BulkInsert => Scenario::BulkInsert,
            ScenarioArg::SingleInsert => Scenario::SingleInsert,
            ScenarioArg::QueryAll => Scenario::QueryAll,
            ScenarioArg::SelectNames => Scenario::SelectNames,
            ScenarioArg::OrderByName => Scenario::OrderByName,
            ScenarioArg::GradeDesc => Scenario::GradeDesc,
            ScenarioArg::Oldest => Scenario::Oldest,
            ScenarioArg::Youngest => Scenario::Youngest,
            ScenarioArg::First => Scenario::First,
            ScenarioArg::Count => Scenario::Count,
            ScenarioArg::Filter => Scenario::Filter,
            ScenarioArg::UpdateTracked => Scenario::UpdateTracked,
            ScenarioArg::UpdateBulk => Scenario::UpdateBulk,
            ScenarioArg::Delete => Scenario::Delete,
            ScenarioArg::DeleteBulk => Scenario::DeleteBulk,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(log_dir) = &cli.log_dir {
        rollbook_core::init_logging(&cli.log_level, log_dir)?;
    }

    let conn = match &cli.db {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    let mut session = Session::new(conn);
    if cli.reset {
        reset_store(&mut session)?;
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_scenario(&mut session, cli.scenario.into(), &mut out)?;

    log::info!("event=cli_exit module=cli status=ok");
    Ok(())
}
