use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

pub const DEFAULT_CURRENCY: &str = "EGP";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }
}

/// One extracted financial document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_type: Option<TransactionType>,
    pub document_type: Option<String>,
    pub invoice_number: Option<String>,
    pub date: Option<String>,
    pub party_name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub subtotal: Option<f64>,
    pub tax_amount: Option<f64>,
    pub total_amount: Option<f64>,
    pub payment_method: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub confidence_score: Option<f64>,
    pub source_document: String,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl TransactionRecord {
    pub fn is_income(&self) -> bool {
        self.transaction_type == Some(TransactionType::Income)
    }

    /// Cell values in [`COLUMNS`] order; `None` for null fields.
    pub fn cells(&self) -> Vec<Option<String>> {
        vec![
            self.transaction_type.map(|t| t.as_str().to_string()),
            self.document_type.clone(),
            self.invoice_number.clone(),
            self.date.clone(),
            self.party_name.clone(),
            self.category.clone(),
            self.description.clone(),
            self.subtotal.map(format_amount),
            self.tax_amount.map(format_amount),
            self.total_amount.map(format_amount),
            self.payment_method.clone(),
            Some(self.currency.clone()),
            self.confidence_score.map(format_amount),
            Some(self.source_document.clone()),
        ]
    }
}

pub struct Column {
    pub key: &'static str,
    pub label: &'static str,
}

/// Field order of the table, with the Arabic headers shown to users.
pub const COLUMNS: [Column; 14] = [
    Column { key: "transaction_type", label: "نوع المعاملة" },
    Column { key: "document_type", label: "نوع المستند" },
    Column { key: "invoice_number", label: "رقم الفاتورة" },
    Column { key: "date", label: "التاريخ" },
    Column { key: "party_name", label: "العميل / المورد" },
    Column { key: "category", label: "التصنيف" },
    Column { key: "description", label: "الوصف" },
    Column { key: "subtotal", label: "قبل الضريبة" },
    Column { key: "tax_amount", label: "الضريبة" },
    Column { key: "total_amount", label: "إجمالي المبلغ" },
    Column { key: "payment_method", label: "طريقة الدفع" },
    Column { key: "currency", label: "العملة" },
    Column { key: "confidence_score", label: "درجة الثقة" },
    Column { key: "source_document", label: "المستند المصدر" },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Headers {
    Keys,
    Labels,
}

/// Records accumulated during one session, in upload order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordTable {
    records: Vec<TransactionRecord>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<TransactionRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: TransactionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Moves every record of `other` to the end of this table.
    pub fn append(&mut self, other: RecordTable) {
        self.records.extend(other.records);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Splits into (income, everything else); records without a type land
    /// on the expense side.
    pub fn split(&self) -> (RecordTable, RecordTable) {
        let (income, expense): (Vec<_>, Vec<_>) =
            self.records.iter().cloned().partition(|r| r.is_income());
        (Self::from_records(income), Self::from_records(expense))
    }

    /// Income rows first, then the rest, each group in table order.
    pub fn grouped(&self) -> RecordTable {
        let (mut income, rest) = self.split();
        income.append(rest);
        income
    }

    /// Canonical text rendering used in prompts and cache keys.
    pub fn to_text(&self) -> String {
        self.render(Headers::Keys)
    }

    /// Right-aligned columns, one line per record, no index column.
    pub fn render(&self, headers: Headers) -> String {
        let header: Vec<String> = COLUMNS
            .iter()
            .map(|c| match headers {
                Headers::Keys => c.key.to_string(),
                Headers::Labels => c.label.to_string(),
            })
            .collect();
        let rows: Vec<Vec<String>> = self
            .records
            .iter()
            .map(|r| {
                r.cells()
                    .into_iter()
                    .map(|cell| cell.unwrap_or_else(|| "None".to_string()))
                    .collect()
            })
            .collect();
        let widths: Vec<usize> = (0..COLUMNS.len())
            .map(|idx| {
                rows.iter()
                    .map(|row| row[idx].chars().count())
                    .chain(std::iter::once(header[idx].chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        let mut out = String::new();
        write_aligned(&mut out, &header, &widths);
        for row in &rows {
            out.push('\n');
            write_aligned(&mut out, row, &widths);
        }
        out
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(COLUMNS.iter().map(|c| c.key))?;
        for record in &self.records {
            writer.write_record(record.cells().into_iter().map(|c| c.unwrap_or_default()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| LedgerError::Io(err.into_error()))?;
        String::from_utf8(bytes).map_err(|err| LedgerError::InvalidInput(err.to_string()))
    }

    pub fn write_jsonl(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        for record in &self.records {
            let mut buf = serde_json::to_vec(record)?;
            buf.push(b'\n');
            writer.write_all(&buf)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Loads a table written by [`RecordTable::write_jsonl`]. A missing file
    /// is an empty table.
    pub fn read_jsonl(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(Self { records })
    }
}

impl FromIterator<TransactionRecord> for RecordTable {
    fn from_iter<I: IntoIterator<Item = TransactionRecord>>(iter: I) -> Self {
        Self::from_records(iter.into_iter().collect())
    }
}

pub fn format_amount(value: f64) -> String {
    format!("{value}")
}

fn write_aligned(out: &mut String, cells: &[String], widths: &[usize]) {
    for (idx, cell) in cells.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        let pad = widths[idx].saturating_sub(cell.chars().count());
        let _ = write!(out, "{}{}", " ".repeat(pad), cell);
    }
}
