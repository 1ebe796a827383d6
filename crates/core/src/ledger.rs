use std::path::{Path, PathBuf};

use ledgerscan_llm::{ChatGateway, LlmClient};
use tracing::info;

use crate::cache::ResponseCache;
use crate::config::{LedgerConfig, LedgerSettings};
use crate::error::Result;
use crate::extract::{extract_all, extract_document, UploadedDocument};
use crate::pdf::export_pdf;
use crate::query::{ask, QueryAnswer};
use crate::record::{RecordTable, TransactionRecord};
use crate::report::{generate_report, Report};
use crate::store::FsStore;

/// Gateway, cache and limits bundled for the CLI and the HTTP service.
///
/// The ledger holds no records itself; callers own their session table.
pub struct Ledger {
    gateway: Box<dyn ChatGateway>,
    cache: ResponseCache,
    settings: LedgerSettings,
}

impl Ledger {
    pub fn new(
        gateway: Box<dyn ChatGateway>,
        cache: ResponseCache,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            gateway,
            cache,
            settings,
        }
    }

    /// Builds the HTTP client and opens the filesystem cache.
    pub fn from_config(config: LedgerConfig) -> Result<Self> {
        let LedgerConfig {
            gateway,
            cache,
            settings,
        } = config;
        let client = LlmClient::new(gateway)?;
        let store = FsStore::open(&cache.root)?;
        info!(
            model = client.model(),
            cache_root = %cache.root.display(),
            narrative = settings.narrative.as_str(),
            "ledger ready"
        );
        Ok(Self::new(
            Box::new(client),
            ResponseCache::new(Box::new(store), cache.hit_delay),
            settings,
        ))
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub fn extract(&self, document: UploadedDocument) -> Result<TransactionRecord> {
        extract_document(
            self.gateway.as_ref(),
            &self.cache,
            document,
            self.settings.extract_max_tokens,
        )
    }

    /// Appends one record per document to `table`, stopping at the first failure.
    pub fn ingest(&self, documents: Vec<UploadedDocument>, table: &mut RecordTable) -> Result<usize> {
        extract_all(
            self.gateway.as_ref(),
            &self.cache,
            documents,
            table,
            self.settings.extract_max_tokens,
        )
    }

    pub fn ask(&self, table: &RecordTable, question: &str) -> Result<QueryAnswer> {
        ask(
            self.gateway.as_ref(),
            &self.cache,
            table,
            question,
            self.settings.query_max_tokens,
        )
    }

    pub fn report(&self, table: &RecordTable) -> Result<Report> {
        generate_report(
            self.gateway.as_ref(),
            &self.cache,
            table,
            self.settings.narrative,
            self.settings.report_max_tokens,
        )
    }

    pub fn export_pdf(&self, report: &Report, path: &Path) -> Result<PathBuf> {
        export_pdf(&report.entries(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{NarrativeSource, LABEL_INCOME};
    use crate::test_support::{memory_cache, ScriptedGateway};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn ledger_with(replies: &[&str], narrative: NarrativeSource) -> (Arc<ScriptedGateway>, Ledger) {
        let gateway = Arc::new(ScriptedGateway::with_replies(replies.iter().copied()));
        let (_, cache) = memory_cache();
        let settings = LedgerSettings {
            narrative,
            ..LedgerSettings::default()
        };
        let ledger = Ledger::new(Box::new(gateway.clone()), cache, settings);
        (gateway, ledger)
    }

    #[test]
    fn extract_then_report_then_pdf() {
        let (gateway, ledger) = ledger_with(
            &[
                r#"{"transaction_type": "income", "total_amount": 120.5}"#,
                r#"{"transaction_type": "expense", "total_amount": 20}"#,
            ],
            NarrativeSource::Template,
        );
        let mut table = RecordTable::new();
        let added = ledger
            .ingest(
                vec![
                    UploadedDocument::new("a.png", "image/png", b"a".to_vec()),
                    UploadedDocument::new("b.png", "image/png", b"b".to_vec()),
                ],
                &mut table,
            )
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(gateway.calls(), 2);

        let report = ledger.report(&table).unwrap();
        assert_eq!(report.totals.net, 100.5);
        assert_eq!(report.entries()[LABEL_INCOME], "120.5");

        let dir = tempdir().unwrap();
        let path = ledger
            .export_pdf(&report, &dir.path().join("report.pdf"))
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn settings_limits_are_forwarded() {
        let (_, ledger) = ledger_with(&[], NarrativeSource::Model);
        assert_eq!(ledger.settings().narrative, NarrativeSource::Model);
        assert_eq!(ledger.settings().query_max_tokens, 2000);
    }
}
