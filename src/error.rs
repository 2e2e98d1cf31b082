use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by tileset storage and the adapter roles built on it.
#[derive(Debug, Error)]
pub enum Error {
    /// The adapter configuration cannot be used.
    #[error("invalid tileset configuration: {0}")]
    Configuration(String),

    /// A format token or file extension outside png, jpg, json and pbf.
    #[error("MBTiles only supports \"png\", \"jpg\", \"json\" or \"pbf\", not \"{0}\"")]
    UnsupportedFormat(String),

    /// A tile was requested as a format other than the tileset's own.
    #[error("requested format \"{requested}\" does not match tileset format \"{declared}\"")]
    FormatMismatch {
        requested: String,
        declared: &'static str,
    },

    /// The tileset file does not exist.
    #[error("tileset {0} does not exist")]
    NotFound(PathBuf),

    /// Something already occupies the path a tileset should be created at.
    #[error("tileset {0} already exists")]
    AlreadyExists(PathBuf),

    /// The file exists but does not carry the MBTiles tables.
    #[error("{0} is not a valid MBTiles tileset")]
    InvalidTileset(PathBuf),

    /// The coordinate lies outside the tile pyramid.
    #[error("tile {zoom}/{column}/{row} is outside the tile pyramid")]
    InvalidCoordinate { zoom: i64, column: i64, row: i64 },

    /// A metadata value could not be interpreted.
    #[error("invalid metadata value for \"{key}\": {value:?}")]
    InvalidMetadata { key: &'static str, value: String },

    /// The storage file exists but cannot be read or written.
    #[error("tileset storage {path} is unavailable while trying to {operation}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Writing a tile response to its destination failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn storage(
        path: impl Into<PathBuf>,
        operation: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            operation,
            source: source.into(),
        }
    }
}
