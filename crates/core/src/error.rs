use thiserror::Error;

/// Model output that parsed as JSON but does not have the expected shape.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("schema error in {target}: {message}")]
pub struct SchemaError {
    pub target: &'static str,
    pub message: String,
}

impl SchemaError {
    pub fn new(target: &'static str, message: impl Into<String>) -> Self {
        Self {
            target,
            message: message.into(),
        }
    }

    pub fn missing_key(target: &'static str, key: &str) -> Self {
        Self::new(target, format!("missing required key `{key}`"))
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("gateway error: {0}")]
    Gateway(String),
    #[error("model returned malformed json: {0}")]
    MalformedResponse(serde_json::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("failed to extract {filename}: {source}")]
    Extraction {
        filename: String,
        #[source]
        source: Box<LedgerError>,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<anyhow::Error> for LedgerError {
    fn from(value: anyhow::Error) -> Self {
        Self::Gateway(format!("{value:#}"))
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(value: toml::de::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<tempfile::PersistError> for LedgerError {
    fn from(value: tempfile::PersistError) -> Self {
        Self::Store(value.to_string())
    }
}
