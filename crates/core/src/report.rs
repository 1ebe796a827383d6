use indexmap::IndexMap;
use ledgerscan_llm::{ChatGateway, ChatMessage};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::ResponseCache;
use crate::error::{LedgerError, Result};
use crate::fingerprint::fingerprint;
use crate::prompt::{narrative_prompt, TEMPLATE_NARRATIVE};
use crate::record::{format_amount, RecordTable};
use crate::schema;
use crate::store::Namespace;

pub const REPORT_TITLE: &str = "تقرير مالي تحليلي";

pub const LABEL_TITLE: &str = "العنوان";
pub const LABEL_INCOME: &str = "إجمالي الإيرادات";
pub const LABEL_EXPENSE: &str = "إجمالي المصروفات";
pub const LABEL_NET: &str = "صافي الربح";
pub const LABEL_SUMMARY: &str = "الملخص";

const SCHEMA_TARGET: &str = "report narrative";

/// Where the report's prose comes from. Totals are always computed locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeSource {
    #[default]
    Template,
    Model,
}

impl NarrativeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NarrativeSource::Template => "template",
            NarrativeSource::Model => "model",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "template" => Some(NarrativeSource::Template),
            "model" => Some(NarrativeSource::Model),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub income: f64,
    pub expense: f64,
    pub net: f64,
}

/// Sums `total_amount` per direction. Records with a null total are left
/// out of the sum rather than counted as zero.
pub fn aggregate(table: &RecordTable) -> Totals {
    let (income, expense) = table.split();
    let income = sum_totals(&income);
    let expense = sum_totals(&expense);
    Totals {
        income,
        expense,
        net: income - expense,
    }
}

fn sum_totals(table: &RecordTable) -> f64 {
    table.records().iter().filter_map(|r| r.total_amount).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub totals: Totals,
    pub summary: String,
}

impl Report {
    /// Flat label/value view in display order; what gets exported.
    pub fn entries(&self) -> IndexMap<String, String> {
        let mut entries = IndexMap::new();
        entries.insert(LABEL_TITLE.to_string(), self.title.clone());
        entries.insert(LABEL_INCOME.to_string(), format_amount(self.totals.income));
        entries.insert(LABEL_EXPENSE.to_string(), format_amount(self.totals.expense));
        entries.insert(LABEL_NET.to_string(), format_amount(self.totals.net));
        entries.insert(LABEL_SUMMARY.to_string(), self.summary.clone());
        entries
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Narrative {
    summary: String,
}

pub fn generate_report(
    gateway: &dyn ChatGateway,
    cache: &ResponseCache,
    table: &RecordTable,
    source: NarrativeSource,
    max_tokens: u32,
) -> Result<Report> {
    let totals = aggregate(table);
    info!(
        rows = table.len(),
        income = totals.income,
        expense = totals.expense,
        narrative = source.as_str(),
        "building report"
    );
    let summary = match source {
        NarrativeSource::Template => TEMPLATE_NARRATIVE.to_string(),
        NarrativeSource::Model => model_narrative(gateway, cache, table, max_tokens)?,
    };
    Ok(Report {
        title: REPORT_TITLE.to_string(),
        totals,
        summary,
    })
}

fn model_narrative(
    gateway: &dyn ChatGateway,
    cache: &ResponseCache,
    table: &RecordTable,
    max_tokens: u32,
) -> Result<String> {
    if table.is_empty() {
        return Err(LedgerError::InvalidInput(
            "no records to summarise".to_string(),
        ));
    }
    let table_text = table.to_text();
    let key = fingerprint(table_text.as_bytes());
    let narrative: Narrative = cache.get_or_compute(Namespace::Reports, &key, || {
        let messages = [ChatMessage::user(narrative_prompt(&table_text))];
        let raw = gateway.complete(&messages, max_tokens)?;
        let object = schema::parse_object(SCHEMA_TARGET, &raw)?;
        schema::require_keys(SCHEMA_TARGET, &object, &["summary"])?;
        schema::decode(SCHEMA_TARGET, object)
    })?;
    Ok(narrative.summary)
}
