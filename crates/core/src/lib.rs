mod cache;
mod config;
mod error;
mod extract;
mod fingerprint;
mod ledger;
mod pdf;
mod prompt;
mod query;
mod record;
mod report;
mod schema;
mod store;
#[cfg(test)]
mod test_support;

pub use cache::{ResponseCache, DEFAULT_HIT_DELAY_MS};
pub use config::{
    CacheConfig, FileConfig, LedgerConfig, LedgerSettings, DEFAULT_CACHE_ROOT,
    DEFAULT_CONFIG_FILE, ENV_API_KEY, ENV_CACHE_DIR, ENV_CACHE_HIT_DELAY_MS, ENV_CONFIG,
    ENV_ENDPOINT, ENV_MODEL, ENV_NARRATIVE,
};
pub use error::{LedgerError, Result, SchemaError};
pub use extract::{decode_record, extract_all, extract_document, mime_for_path, UploadedDocument};
pub use fingerprint::{fingerprint, fingerprint_text};
pub use ledger::Ledger;
pub use pdf::{export_pdf, render_pdf, report_lines, DEFAULT_PDF_PATH};
pub use prompt::{narrative_prompt, query_prompt, EXTRACTION_PROMPT, TEMPLATE_NARRATIVE};
pub use query::{ask, decode_answer, query_key, QueryAnswer};
pub use record::{
    format_amount, Column, Headers, RecordTable, TransactionRecord, TransactionType, COLUMNS,
    DEFAULT_CURRENCY,
};
pub use report::{
    aggregate, generate_report, NarrativeSource, Report, Totals, LABEL_EXPENSE, LABEL_INCOME,
    LABEL_NET, LABEL_SUMMARY, LABEL_TITLE, REPORT_TITLE,
};
pub use store::{FsStore, KvStore, MemoryStore, Namespace};
