use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocToolsError {
    #[error("Failed to parse document: {0}")]
    InvalidDocument(String),

    #[error("Page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Invalid container: {0}")]
    MalformedContainer(String),

    #[error("{0}")]
    EmptyDocument(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Document operation failed: {0}")]
    Operation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to convert {from} to {to}: {source}")]
    Conversion {
        from: &'static str,
        to: &'static str,
        #[source]
        source: Box<DocToolsError>,
    },
}

impl DocToolsError {
    /// The innermost error, skipping conversion wrappers.
    pub fn root(&self) -> &DocToolsError {
        match self {
            DocToolsError::Conversion { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<lopdf::Error> for DocToolsError {
    fn from(e: lopdf::Error) -> Self {
        DocToolsError::InvalidDocument(e.to_string())
    }
}

impl From<zip::result::ZipError> for DocToolsError {
    fn from(e: zip::result::ZipError) -> Self {
        DocToolsError::Operation(format!("Archive error: {}", e))
    }
}

impl From<std::io::Error> for DocToolsError {
    fn from(e: std::io::Error) -> Self {
        DocToolsError::Operation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DocToolsError>;
