use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ledgerscan_core::{
    Headers, Ledger, LedgerConfig, QueryAnswer, RecordTable, UploadedDocument, DEFAULT_PDF_PATH,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_SESSION: &str = "records.jsonl";

#[derive(Parser, Debug)]
#[command(name = "ledgerscan", version = VERSION, about = "Invoice and receipt extraction with cached LLM calls")]
struct Cli {
    /// TOML settings file; falls back to LEDGERSCAN_CONFIG, then ./ledgerscan.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// JSONL file holding the session's records between invocations.
    #[arg(long, global = true, default_value = DEFAULT_SESSION)]
    session: PathBuf,
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract one record per file and append them to the session.
    Extract {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the session's income and expense tables.
    Records {
        #[arg(long, action = ArgAction::SetTrue)]
        csv: bool,
    },
    /// Ask a question about the session's records.
    Ask { question: String },
    /// Build the financial report and export it as PDF.
    Report {
        #[arg(long, default_value = DEFAULT_PDF_PATH)]
        pdf: PathBuf,
    },
    /// Forget every record in the session.
    Clear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Extract { files } => {
            let ledger = open_ledger(cli.config.as_deref())?;
            let mut table = RecordTable::read_jsonl(&cli.session)?;
            let before = table.len();
            let documents = files
                .iter()
                .map(|path| {
                    UploadedDocument::from_path(path)
                        .with_context(|| format!("failed to read {}", path.display()))
                })
                .collect::<Result<Vec<_>>>()?;
            let outcome = ledger.ingest(documents, &mut table);
            // Records extracted before a failure are kept.
            table.write_jsonl(&cli.session)?;
            if let Err(err) = outcome {
                warn!(kept = table.len() - before, "batch stopped early");
                return Err(err.into());
            }
            info!(
                added = table.len() - before,
                session = %cli.session.display(),
                "session updated"
            );
            print_split(&table, false)?;
        }
        Commands::Records { csv } => {
            let table = RecordTable::read_jsonl(&cli.session)?;
            print_split(&table, csv)?;
        }
        Commands::Ask { question } => {
            let ledger = open_ledger(cli.config.as_deref())?;
            let table = load_nonempty(&cli.session)?;
            let answer = ledger.ask(&table, &question)?;
            print!("{}", format_answer(&answer)?);
        }
        Commands::Report { pdf } => {
            let ledger = open_ledger(cli.config.as_deref())?;
            let table = load_nonempty(&cli.session)?;
            let report = ledger.report(&table)?;
            println!("{}", serde_json::to_string_pretty(&report.entries())?);
            let written = ledger.export_pdf(&report, &pdf)?;
            println!("pdf written to {}", written.display());
        }
        Commands::Clear => {
            RecordTable::new().write_jsonl(&cli.session)?;
            println!("cleared {}", cli.session.display());
        }
    }
    Ok(())
}

fn open_ledger(config: Option<&Path>) -> Result<Ledger> {
    let config = LedgerConfig::load(config)?;
    Ok(Ledger::from_config(config)?)
}

fn load_nonempty(session: &Path) -> Result<RecordTable> {
    let table = RecordTable::read_jsonl(session)?;
    if table.is_empty() {
        bail!(
            "no records in {}; run `ledgerscan extract` first",
            session.display()
        );
    }
    Ok(table)
}

fn print_split(table: &RecordTable, csv: bool) -> Result<()> {
    let (income, expense) = table.split();
    for (title, part) in [("income", &income), ("expense", &expense)] {
        println!("# {title} ({})", part.len());
        if csv {
            print!("{}", part.to_csv()?);
        } else {
            println!("{}", part.render(Headers::Labels));
        }
        println!();
    }
    Ok(())
}

fn format_answer(answer: &QueryAnswer) -> Result<String> {
    let mut out = format!("{}\n", answer.answer_text);
    if let Some(value) = answer.answer_numeric {
        out.push_str(&format!("value: {value}\n"));
    }
    if answer.has_rows() {
        out.push_str(&serde_json::to_string_pretty(&answer.rows)?);
        out.push('\n');
    }
    Ok(out)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
