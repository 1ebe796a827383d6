use std::fs::File;
use std::io::Read;
use std::path::Path;

use ledgerscan_llm::{ChatGateway, ChatMessage};
use serde::Deserialize;
use tracing::{info, warn};

use crate::cache::ResponseCache;
use crate::error::{LedgerError, Result, SchemaError};
use crate::fingerprint::fingerprint;
use crate::prompt::EXTRACTION_PROMPT;
use crate::record::{RecordTable, TransactionRecord, TransactionType, DEFAULT_CURRENCY};
use crate::schema;
use crate::store::Namespace;

const SCHEMA_TARGET: &str = "transaction record";
const REQUIRED_KEYS: &[&str] = &["transaction_type", "total_amount"];

/// An uploaded file: its bytes, declared MIME type and original name.
///
/// Extraction consumes the upload, so its bytes are read exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedDocument {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn from_reader<R: Read>(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        mut reader: R,
    ) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::new(filename, mime_type, bytes))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_string())
            .ok_or_else(|| LedgerError::InvalidInput(format!("no file name in {}", path.display())))?;
        let file = File::open(path)?;
        Self::from_reader(filename, mime_for_path(path), file)
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.bytes)
    }
}

/// MIME type guessed from the file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Fields the model is asked to fill. Provenance is not among them.
#[derive(Debug, Deserialize)]
struct ExtractedFields {
    transaction_type: Option<TransactionType>,
    document_type: Option<String>,
    invoice_number: Option<String>,
    date: Option<String>,
    party_name: Option<String>,
    category: Option<String>,
    description: Option<String>,
    subtotal: Option<f64>,
    tax_amount: Option<f64>,
    total_amount: Option<f64>,
    payment_method: Option<String>,
    currency: Option<String>,
    confidence_score: Option<f64>,
}

/// Decodes the model's reply into a record attributed to `filename`.
pub fn decode_record(raw: &str, filename: &str) -> Result<TransactionRecord> {
    let object = schema::parse_object(SCHEMA_TARGET, raw)?;
    schema::require_keys(SCHEMA_TARGET, &object, REQUIRED_KEYS)?;
    let fields: ExtractedFields = schema::decode(SCHEMA_TARGET, object)?;
    if let Some(score) = fields.confidence_score {
        if !(0.0..=1.0).contains(&score) {
            return Err(SchemaError::new(
                SCHEMA_TARGET,
                format!("confidence_score {score} is outside [0, 1]"),
            )
            .into());
        }
    }
    Ok(TransactionRecord {
        transaction_type: fields.transaction_type,
        document_type: fields.document_type,
        invoice_number: fields.invoice_number,
        date: fields.date,
        party_name: fields.party_name,
        category: fields.category,
        description: fields.description,
        subtotal: fields.subtotal,
        tax_amount: fields.tax_amount,
        total_amount: fields.total_amount,
        payment_method: fields.payment_method,
        currency: fields
            .currency
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        confidence_score: fields.confidence_score,
        source_document: filename.to_string(),
    })
}

/// Extracts one document, going to the model only on a cache miss.
pub fn extract_document(
    gateway: &dyn ChatGateway,
    cache: &ResponseCache,
    document: UploadedDocument,
    max_tokens: u32,
) -> Result<TransactionRecord> {
    let UploadedDocument {
        filename,
        mime_type,
        bytes,
    } = document;
    let key = fingerprint(&bytes);
    info!(
        filename = %filename,
        mime_type = %mime_type,
        bytes = bytes.len(),
        key = %key,
        "extracting document"
    );
    let mut record = cache.get_or_compute(Namespace::Documents, &key, || {
        let messages = [ChatMessage::user_with_image(
            EXTRACTION_PROMPT,
            &mime_type,
            &bytes,
        )];
        let raw = gateway.complete(&messages, max_tokens)?;
        decode_record(&raw, &filename)
    })?;
    // A cached entry may carry the name of an earlier upload of the same bytes.
    record.source_document = filename;
    Ok(record)
}

/// Extracts `documents` one after another into `table`.
///
/// The first failure stops the batch: earlier records stay in `table` (and
/// in the cache), later documents are not attempted.
pub fn extract_all(
    gateway: &dyn ChatGateway,
    cache: &ResponseCache,
    documents: Vec<UploadedDocument>,
    table: &mut RecordTable,
    max_tokens: u32,
) -> Result<usize> {
    let total = documents.len();
    let mut done = 0usize;
    for (position, document) in documents.into_iter().enumerate() {
        let filename = document.filename.clone();
        match extract_document(gateway, cache, document, max_tokens) {
            Ok(record) => {
                table.push(record);
                done += 1;
            }
            Err(err) => {
                warn!(
                    filename = %filename,
                    position = position + 1,
                    total,
                    error = %err,
                    "extraction failed, skipping remaining documents"
                );
                return Err(LedgerError::Extraction {
                    filename,
                    source: Box::new(err),
                });
            }
        }
    }
    info!(documents = done, "batch extraction finished");
    Ok(done)
}
