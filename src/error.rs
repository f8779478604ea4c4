use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, BuildError>;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("taxon {taxid} is not present in the taxonomy")]
    MissingTaxon { taxid: String },

    #[error("taxon {taxid} has no scientific name")]
    MissingName { taxid: String },

    #[error("invalid config: {message}")]
    Config { message: String },

    #[error("failed to process JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("record sink failed")]
    Sink(#[source] std::io::Error),
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

/// Conditions under which the radial layout cannot produce finite coordinates.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("node {taxid} was placed twice")]
    AlreadyPlaced { taxid: String },

    #[error("node {taxid} has no placement")]
    Unplaced { taxid: String },

    #[error("degenerate geometry at node {taxid}: {message}")]
    Degenerate { taxid: String, message: String },

    #[error("anchor radius must be positive and finite, got {radius}")]
    InvalidAnchor { radius: f64 },
}
