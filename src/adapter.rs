//! The two roles a tile server sees: a read-only [`Provider`] and a read-write [`Cache`].
//!
//! Both are configured with a tileset reference that is resolved like a URL
//! reference against the host's base directory. Only local files are accepted.

use crate::{
    schema::{self, TilesetOptions, TilesetStatus},
    Error, Result, TileCoord, TileFormat, Tileset,
};
use std::{
    io::Write,
    path::{Path, PathBuf},
};
use url::Url;

/// Resolves a configured tileset reference against `base_dir`.
///
/// Relative references are joined onto the directory, absolute paths and
/// `file:` URLs are taken as they are. Any other scheme is a configuration error.
/// No I/O is performed.
pub fn resolve_tileset(base_dir: &Path, tileset: &str) -> Result<PathBuf> {
    if tileset.trim().is_empty() {
        return Err(Error::Configuration("missing required \"tileset\" reference".into()));
    }

    let base = Url::from_directory_path(base_dir).map_err(|()| {
        Error::Configuration(format!(
            "base directory {} must be an absolute path",
            base_dir.display()
        ))
    })?;

    let href = base
        .join(tileset)
        .map_err(|e| Error::Configuration(format!("bad tileset reference \"{tileset}\": {e}")))?;

    if href.scheme() != "file" {
        return Err(Error::Configuration(format!(
            "bad scheme in MBTiles tileset, must be local file: \"{}\"",
            href.scheme()
        )));
    }

    href.to_file_path().map_err(|()| {
        Error::Configuration(format!("tileset reference \"{tileset}\" is not a local path"))
    })
}

/// Raw tile content tagged with the tileset's encoder.
///
/// The content is passed through untouched; [`TileResponse::save`] only checks
/// that the requested output format agrees with what the tileset holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileResponse {
    pub encoder: Option<&'static str>,
    pub content: Option<Vec<u8>>,
}

impl TileResponse {
    /// Response for content of the given MIME type, tagged with the matching encoder.
    pub fn new(mime_type: &str, content: Vec<u8>) -> Result<Self> {
        let format = TileFormat::from_mime_type(mime_type)?;

        Ok(Self {
            encoder: Some(format.encoder()),
            content: Some(content),
        })
    }

    pub fn empty() -> Self {
        Self {
            encoder: None,
            content: None,
        }
    }

    /// Writes the content to `out` as `format`.
    ///
    /// Fails with [`Error::FormatMismatch`] when the response carries an encoder and
    /// `format` names a different one (compared without case).
    pub fn save<W: Write>(&self, out: &mut W, format: &str) -> Result<()> {
        if let Some(declared) = self.encoder {
            if !declared.eq_ignore_ascii_case(format) {
                return Err(Error::FormatMismatch {
                    requested: format.to_owned(),
                    declared,
                });
            }
        }

        if let Some(content) = &self.content {
            out.write_all(content)?;
        }

        Ok(())
    }
}

/// Read side of the host tile-serving contract.
pub trait TileProvider {
    fn render_tile(&self, coord: TileCoord) -> Result<TileResponse>;

    /// MIME type and encoder name for a requested file extension.
    fn resolve_extension(&self, extension: &str) -> Result<(&'static str, &'static str)>;
}

/// Write side of the host caching contract.
pub trait TileCache {
    fn lock(&self, coord: TileCoord) -> Result<()>;

    fn unlock(&self, coord: TileCoord) -> Result<()>;

    fn read(&self, coord: TileCoord) -> Result<Option<Vec<u8>>>;

    fn save(&self, coord: TileCoord, content: &[u8]) -> Result<()>;

    fn remove(&self, coord: TileCoord) -> Result<()>;
}

/// Serves tiles straight out of an MBTiles file.
#[derive(Debug, Clone)]
pub struct Provider {
    tileset: Tileset,
}

impl Provider {
    pub fn new(base_dir: &Path, tileset: &str) -> Result<Self> {
        let path = resolve_tileset(base_dir, tileset)?;

        log::debug!("MBTiles provider for {path:?}");

        Ok(Self {
            tileset: Tileset::new(path),
        })
    }

    pub fn tileset(&self) -> &Tileset {
        &self.tileset
    }
}

impl TileProvider for Provider {
    fn render_tile(&self, coord: TileCoord) -> Result<TileResponse> {
        match self.tileset.get_tile(coord)? {
            Some(tile) => TileResponse::new(tile.mime_type(), tile.data),
            None => Ok(TileResponse::empty()),
        }
    }

    fn resolve_extension(&self, extension: &str) -> Result<(&'static str, &'static str)> {
        let format = TileFormat::from_extension(extension)?;

        Ok((format.mime_type(), format.encoder()))
    }
}

/// Writes rendered tiles into an MBTiles file, creating it on first use.
///
/// `lock` and `unlock` do nothing: concurrent writers of the same tile are
/// serialised only by SQLite itself, the last write wins.
#[derive(Debug, Clone)]
pub struct Cache {
    tileset: Tileset,
    format: TileFormat,
}

impl Cache {
    /// Resolves `tileset` and bootstraps it with placeholder metadata when absent.
    ///
    /// `format` is matched like a file extension. An existing tileset that declares
    /// a different format is rejected. A zero-length file at the path is
    /// initialised in place, and losing the bootstrap race to another writer
    /// falls back to checking the tileset that writer published.
    pub fn new(base_dir: &Path, tileset: &str, format: &str, name: &str) -> Result<Self> {
        let path = resolve_tileset(base_dir, tileset)?;
        let format = TileFormat::from_extension(format)?;
        let tileset = Tileset::new(path);
        let options = TilesetOptions::new(name, format.token())?;

        let created = match tileset.probe()? {
            TilesetStatus::Ready => false,
            TilesetStatus::Invalid => return Err(Error::InvalidTileset(tileset.path().into())),
            TilesetStatus::Missing => match Tileset::create(tileset.path(), &options) {
                Ok(_) => true,
                // another writer bootstrapped it first
                Err(Error::AlreadyExists(path)) => {
                    log::warn!("tileset {path:?} appeared while creating it");

                    false
                }
                Err(e) => return Err(e),
            },
            TilesetStatus::Empty => schema::initialize_empty(tileset.path(), &options)?,
        };

        if created {
            log::info!("created tileset {:?}", tileset.path());
        } else {
            Self::check_format(&tileset, format)?;
        }

        Ok(Self { tileset, format })
    }

    fn check_format(tileset: &Tileset, format: TileFormat) -> Result<()> {
        let Some(metadata) = tileset.metadata()? else {
            return Err(Error::InvalidTileset(tileset.path().into()));
        };

        match metadata.tile_format()? {
            Some(declared) if declared != format => Err(Error::FormatMismatch {
                requested: format.encoder().into(),
                declared: declared.encoder(),
            }),
            _ => Ok(()),
        }
    }

    pub fn tileset(&self) -> &Tileset {
        &self.tileset
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }
}

impl TileCache for Cache {
    fn lock(&self, _coord: TileCoord) -> Result<()> {
        Ok(())
    }

    fn unlock(&self, _coord: TileCoord) -> Result<()> {
        Ok(())
    }

    fn read(&self, coord: TileCoord) -> Result<Option<Vec<u8>>> {
        Ok(self.tileset.get_tile(coord)?.map(|tile| tile.data))
    }

    fn save(&self, coord: TileCoord, content: &[u8]) -> Result<()> {
        self.tileset.put_tile(coord, content)
    }

    fn remove(&self, coord: TileCoord) -> Result<()> {
        self.tileset.delete_tile(coord)
    }
}
