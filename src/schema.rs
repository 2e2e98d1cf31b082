use crate::{Error, Result, TileFormat};
use rusqlite::{
    params, types::ValueRef, Connection, ErrorCode, OpenFlags, OptionalExtension, Transaction,
    TransactionBehavior,
};
use std::{fmt, fs, io, path::Path, str::FromStr};

/// Metadata keys every tileset is expected to carry, in canonical order.
pub const METADATA_KEYS: [&str; 6] = ["name", "type", "version", "description", "format", "bounds"];

pub fn create_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE metadata (
          name TEXT,
          value TEXT,
          PRIMARY KEY (name)
        )",
        (),
    )?;

    conn.execute(
        "CREATE TABLE tiles (
          zoom_level INTEGER,
          tile_column INTEGER,
          tile_row INTEGER,
          tile_data BLOB
        )",
        (),
    )?;

    conn.execute(
        "CREATE UNIQUE INDEX coord ON tiles (zoom_level, tile_column, tile_row)",
        (),
    )?;

    Ok(())
}

/// Whether a tileset is a base map or meant to be drawn over one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilesetType {
    Overlay,
    Baselayer,
}

impl TilesetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overlay => "overlay",
            Self::Baselayer => "baselayer",
        }
    }
}

impl FromStr for TilesetType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "overlay" => Ok(Self::Overlay),
            "baselayer" => Ok(Self::Baselayer),
            _ => Err(Error::InvalidMetadata {
                key: "type",
                value: value.to_owned(),
            }),
        }
    }
}

impl fmt::Display for TilesetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WGS-84 extent in OpenLayers order: left, bottom, right, top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl FromStr for Bounds {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = || Error::InvalidMetadata {
            key: "bounds",
            value: value.to_owned(),
        };

        let parts = value
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        let [left, bottom, right, top] = parts[..] else {
            return Err(invalid());
        };

        let lon = -180.0..=180.0;
        let lat = -90.0..=90.0;

        if !(lon.contains(&left) && lon.contains(&right) && lat.contains(&bottom) && lat.contains(&top))
            || left > right
            || bottom > top
        {
            return Err(invalid());
        }

        Ok(Self {
            left,
            bottom,
            right,
            top,
        })
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.left, self.bottom, self.right, self.top)
    }
}

/// Metadata written when a tileset is created.
#[derive(Debug, Clone, PartialEq)]
pub struct TilesetOptions {
    pub name: String,
    pub kind: TilesetType,
    pub version: String,
    pub description: String,
    pub format: TileFormat,
    pub bounds: Option<Bounds>,
}

impl TilesetOptions {
    /// Options with the placeholder metadata used for lazily created tilesets.
    ///
    /// `format` is a metadata token and must be one of png, jpg, json or pbf.
    pub fn new(name: impl Into<String>, format: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            kind: TilesetType::Baselayer,
            version: "0".into(),
            description: String::new(),
            format: format.parse()?,
            bounds: None,
        })
    }
}

/// The canonical metadata keys as found in a tileset; absent rows are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub format: Option<String>,
    pub bounds: Option<String>,
}

impl Metadata {
    pub fn tile_format(&self) -> Result<Option<TileFormat>> {
        self.format.as_deref().map(str::parse).transpose()
    }

    pub fn tileset_type(&self) -> Result<Option<TilesetType>> {
        self.kind.as_deref().map(str::parse).transpose()
    }

    pub fn parsed_bounds(&self) -> Result<Option<Bounds>> {
        self.bounds.as_deref().map(str::parse).transpose()
    }

    /// Key/value pairs in canonical order.
    pub fn entries(&self) -> [(&'static str, Option<&str>); 6] {
        [
            ("name", self.name.as_deref()),
            ("type", self.kind.as_deref()),
            ("version", self.version.as_deref()),
            ("description", self.description.as_deref()),
            ("format", self.format.as_deref()),
            ("bounds", self.bounds.as_deref()),
        ]
    }
}

/// Outcome of probing a path for a tileset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilesetStatus {
    /// Nothing exists at the path.
    Missing,
    /// A zero-length file, as left by a tool that claimed the path before writing it.
    Empty,
    /// A file exists but lacks a readable `metadata` or `tiles` table.
    Invalid,
    Ready,
}

/// Creates a tileset file with the given metadata and an empty tile table.
///
/// The database is built in a temporary file next to `path` and moved into place
/// only once complete, so `path` never shows a half-built tileset. Fails with
/// [`Error::AlreadyExists`] when anything is present at `path`.
pub fn create(path: &Path, options: &TilesetOptions) -> Result<()> {
    log::debug!("creating tileset {path:?} with format {}", options.format);

    let present = path
        .try_exists()
        .map_err(|e| Error::storage(path, "create tileset file", e))?;

    if present {
        return Err(Error::AlreadyExists(path.to_path_buf()));
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let staging = tempfile::Builder::new()
        .prefix(".mbtiles-")
        .tempfile_in(dir)
        .map_err(|e| Error::storage(path, "create tileset file", e))?;

    let mut conn = open_writable(staging.path())
        .map_err(|e| Error::storage(path, "open tileset", e))?;

    initialize(&mut conn, options).map_err(|e| Error::storage(path, "initialise tileset", e))?;

    conn.close().map_err(|(_, e)| Error::storage(path, "close tileset", e))?;

    // the link fails instead of replacing a tileset another writer published first
    staging.persist_noclobber(path).map_err(|e| match e.error.kind() {
        io::ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_path_buf()),
        _ => Error::storage(path, "publish tileset", e.error),
    })?;

    Ok(())
}

/// Writes the schema and metadata into a zero-length file found at `path`.
///
/// Some tools claim a path with an empty file before filling it in. The work runs
/// under an immediate transaction, so of several callers only the first one
/// initialises the file. Returns `false` when the file already held tables by
/// the time the write lock was taken.
pub fn initialize_empty(path: &Path, options: &TilesetOptions) -> Result<bool> {
    let storage =
        |operation: &'static str| move |e: rusqlite::Error| Error::storage(path, operation, e);

    let mut conn = open_writable(path).map_err(storage("open tileset"))?;

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(storage("begin transaction"))?;

    let tables: i64 = tx
        .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))
        .map_err(storage("inspect tileset"))?;

    if tables > 0 {
        log::debug!("{path:?} was initialised by another writer");

        return Ok(false);
    }

    create_schema(&tx).map_err(storage("create schema"))?;

    insert_metadata(&tx, options).map_err(storage("insert metadata"))?;

    tx.commit().map_err(storage("commit tileset"))?;

    Ok(true)
}

fn open_writable(path: &Path) -> Result<Connection, rusqlite::Error> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

fn initialize(conn: &mut Connection, options: &TilesetOptions) -> Result<(), rusqlite::Error> {
    let tx = conn.transaction()?;

    create_schema(&tx)?;

    insert_metadata(&tx, options)?;

    tx.commit()
}

fn insert_metadata(tx: &Transaction<'_>, options: &TilesetOptions) -> Result<(), rusqlite::Error> {
    let bounds = options.bounds.map(|bounds| bounds.to_string());

    let rows = [
        ("name", Some(options.name.as_str())),
        ("type", Some(options.kind.as_str())),
        ("version", Some(options.version.as_str())),
        ("description", Some(options.description.as_str())),
        ("format", Some(options.format.token())),
        ("bounds", bounds.as_deref()),
    ];

    for (name, value) in rows {
        if let Some(value) = value {
            tx.execute(
                "INSERT INTO metadata (name, value) VALUES (?1, ?2)",
                params![name, value],
            )?;
        }
    }

    Ok(())
}

/// Classifies what is found at `path`.
///
/// Missing files and files without the MBTiles tables are reported as a status;
/// a file that cannot be accessed at all fails with [`Error::StorageUnavailable`].
pub fn probe(path: &Path) -> Result<TilesetStatus> {
    let present = path
        .try_exists()
        .map_err(|e| Error::storage(path, "probe tileset", e))?;

    if !present {
        return Ok(TilesetStatus::Missing);
    }

    let file = fs::metadata(path).map_err(|e| Error::storage(path, "probe tileset", e))?;

    if !file.is_file() {
        return Err(Error::storage(
            path,
            "probe tileset",
            "path is not a regular file",
        ));
    }

    if file.len() == 0 {
        return Ok(TilesetStatus::Empty);
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| Error::storage(path, "open tileset", e))?;

    let checks = [
        "SELECT name, value FROM metadata LIMIT 1",
        "SELECT zoom_level, tile_column, tile_row, tile_data FROM tiles LIMIT 1",
    ];

    for sql in checks {
        let outcome = conn.prepare(sql).and_then(|mut stmt| stmt.exists([]));

        if let Err(e) = outcome {
            return match e.sqlite_error_code() {
                Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt | ErrorCode::Unknown) => {
                    log::debug!("{path:?} is not a tileset: {e}");

                    Ok(TilesetStatus::Invalid)
                }
                _ => Err(Error::storage(path, "probe tileset", e)),
            };
        }
    }

    Ok(TilesetStatus::Ready)
}

/// True when `path` holds a tileset with readable `metadata` and `tiles` tables.
pub fn exists(path: &Path) -> Result<bool> {
    Ok(probe(path)? == TilesetStatus::Ready)
}

/// Reads the canonical metadata keys, or `None` when no valid tileset exists at `path`.
pub fn read_metadata(path: &Path) -> Result<Option<Metadata>> {
    if !exists(path)? {
        return Ok(None);
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| Error::storage(path, "open tileset", e))?;

    let mut stmt = conn
        .prepare("SELECT value FROM metadata WHERE name = ?1")
        .map_err(|e| Error::storage(path, "read metadata", e))?;

    let mut values: [Option<String>; 6] = Default::default();

    for (key, value) in METADATA_KEYS.iter().zip(values.iter_mut()) {
        *value = stmt
            .query_row([*key], |row| Ok(text_value(row.get_ref(0)?)))
            .optional()
            .map_err(|e| Error::storage(path, "read metadata", e))?
            .flatten()
            .filter(|v| !v.is_empty());
    }

    let [name, kind, version, description, format, bounds] = values;

    Ok(Some(Metadata {
        name,
        kind,
        version,
        description,
        format,
        bounds,
    }))
}

// metadata written by other tools is not always stored as text
pub(crate) fn text_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
