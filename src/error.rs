use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TallyError {
    #[error("failed to read input: {0}")]
    InputRead(String),

    #[error("malformed row at line {line}: expected at least 2 tab-separated fields, found {fields}")]
    MalformedRow { line: u64, fields: usize },

    #[error("invalid sequence identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid taxonomy id: {0:?}")]
    InvalidTaxonomyId(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("sequence id not found in cache: {0}")]
    IdentifierNotFound(String),

    #[error("taxonomy id not found in cache: {0}")]
    TaxonomyNotFound(String),

    #[error("sequence id already cached: {0}")]
    DuplicateKey(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("malformed NCBI response for {id}: {reason}")]
    MalformedResponse { id: String, reason: String },

    #[error("NCBI response for {id} has no {field}")]
    MissingField { id: String, field: &'static str },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
