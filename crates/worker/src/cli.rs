use std::path::PathBuf;

use accesslog_core::preview::DEFAULT_PREVIEW_ROWS;
use accesslog_core::types::DbId;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Badge-reader access log importer.
#[derive(Parser, Debug)]
#[command(name = "accesslog-import")]
#[command(about = "Import and reconcile badge-reader CSV exports")]
#[command(version)]
pub struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import one CSV export
    Import(ImportArgs),
    /// Show the first records of a file as the importer reads them
    Preview(PreviewArgs),
    /// List past import runs, newest first
    History(HistoryArgs),
    /// Show one import run with its duplicate and error rows
    Show {
        run_id: DbId,
    },
    /// Write the duplicates of a run as CSV
    ExportDuplicates {
        run_id: DbId,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub file: PathBuf,

    /// Field separator (`;`, `,`, `tab`, `|`) or `auto` to detect it
    #[arg(short, long)]
    pub delimiter: Option<String>,

    /// The file has no header line
    #[arg(long)]
    pub no_header: bool,

    /// Run the pre-import validation report first
    #[arg(long)]
    pub validate: bool,

    /// Recorded as the run's initiator
    #[arg(long)]
    pub initiator: Option<String>,

    /// Date used for future-year clamping and the lookback window
    #[arg(long)]
    pub run_date: Option<NaiveDate>,

    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Duplicate lookback in days, or `all`
    #[arg(long)]
    pub lookback: Option<String>,

    /// Run against an empty in-memory store; nothing is written
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    pub file: PathBuf,

    #[arg(short, long)]
    pub delimiter: Option<String>,

    #[arg(long)]
    pub no_header: bool,

    #[arg(short, long, default_value_t = DEFAULT_PREVIEW_ROWS)]
    pub rows: usize,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[arg(short, long)]
    pub limit: Option<i64>,

    #[arg(short, long)]
    pub offset: Option<i64>,

    /// First day included (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day included (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_import_flags() {
        let cli = Cli::try_parse_from([
            "accesslog-import",
            "import",
            "export.csv",
            "--delimiter",
            "auto",
            "--run-date",
            "2025-04-30",
            "--lookback",
            "all",
            "--validate",
        ])
        .unwrap();

        let Command::Import(args) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(args.file, PathBuf::from("export.csv"));
        assert_eq!(args.delimiter.as_deref(), Some("auto"));
        assert_eq!(args.run_date, NaiveDate::from_ymd_opt(2025, 4, 30));
        assert_eq!(args.lookback.as_deref(), Some("all"));
        assert!(args.validate);
        assert!(!args.dry_run);
    }

    #[test]
    fn parses_export_duplicates() {
        let cli =
            Cli::try_parse_from(["accesslog-import", "export-duplicates", "7", "-o", "dups.csv"])
                .unwrap();
        let Command::ExportDuplicates { run_id, output } = cli.command else {
            panic!("expected export-duplicates");
        };
        assert_eq!(run_id, 7);
        assert_eq!(output, Some(PathBuf::from("dups.csv")));
    }
}
