mod args;

use args::{Args, Command};
use clap::Parser;
use freemap_mbstore::{
    schema, Bounds, Cache, Provider, TileCache, TileCoord, TileFormat, TileProvider, Tileset,
    TilesetOptions,
};
use std::{
    error::Error,
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};
use walkdir::{DirEntry, WalkDir};

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "info" } else { "warn" }),
    )
    .init();

    if let Err(e) = try_main(args) {
        eprintln!("{e}");

        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn try_main(args: Args) -> Result<(), Box<dyn Error>> {
    let base_dir = std::env::current_dir()?;

    match args.command {
        Command::Create {
            tileset,
            name,
            kind,
            version,
            description,
            format,
            bounds,
        } => {
            let options = TilesetOptions {
                name,
                kind: kind.parse()?,
                version,
                description,
                format: format.parse()?,
                bounds: bounds.as_deref().map(str::parse::<Bounds>).transpose()?,
            };

            let path = freemap_mbstore::adapter::resolve_tileset(&base_dir, &tileset)?;

            Tileset::create(path, &options)?;
        }

        Command::Info { tileset } => {
            let path = freemap_mbstore::adapter::resolve_tileset(&base_dir, &tileset)?;

            let metadata = schema::read_metadata(&path)?
                .ok_or_else(|| format!("{} is not a tileset", path.display()))?;

            for (key, value) in metadata.entries() {
                println!("{key}: {}", value.unwrap_or("-"));
            }

            if let Err(e) = metadata.parsed_bounds() {
                log::warn!("{}: {e}", path.display());
            }
        }

        Command::List { tileset } => {
            let provider = Provider::new(&base_dir, &tileset)?;

            let mut out = BufWriter::new(io::stdout().lock());

            for coord in provider.tileset().list_tiles()? {
                writeln!(out, "{}", coord?)?;
            }

            out.flush()?;
        }

        Command::Get {
            tileset,
            zoom,
            column,
            row,
            output,
            format,
        } => {
            let provider = Provider::new(&base_dir, &tileset)?;

            let response = provider.render_tile(TileCoord::new(zoom, column, row)?)?;

            if response.content.is_none() {
                return Err(format!("no tile at {zoom}/{column}/{row}").into());
            }

            let encoder = match format {
                Some(extension) => provider.resolve_extension(&extension)?.1,
                None => response.encoder.unwrap_or_default(),
            };

            let mut out: Box<dyn Write> = match output {
                Some(path) => Box::new(BufWriter::new(File::create(path)?)),
                None => Box::new(io::stdout().lock()),
            };

            response.save(&mut out, encoder)?;

            out.flush()?;
        }

        Command::Put {
            tileset,
            zoom,
            column,
            row,
            input,
        } => {
            let extension = input
                .extension()
                .map(|ext| ext.to_string_lossy().to_string())
                .ok_or_else(|| format!("cannot tell the format of {}", input.display()))?;

            let cache = Cache::new(&base_dir, &tileset, &extension, &default_name(&tileset))?;

            let data = fs::read(&input)
                .map_err(|e| format!("Error reading file {}: {e}", input.display()))?;

            cache.save(TileCoord::new(zoom, column, row)?, &data)?;
        }

        Command::Delete {
            tileset,
            zoom,
            column,
            row,
        } => {
            let path = freemap_mbstore::adapter::resolve_tileset(&base_dir, &tileset)?;

            Tileset::new(path).delete_tile(TileCoord::new(zoom, column, row)?)?;
        }

        Command::Pack {
            source_dir,
            tileset,
            name,
            format,
        } => {
            let name = name.unwrap_or_else(|| default_name(&tileset));

            let count = pack(&base_dir, &source_dir, &tileset, &name, format.as_deref())?;

            log::info!("packed {count} tiles into {tileset}");
        }
    }

    Ok(())
}

fn pack(
    base_dir: &Path,
    source_dir: &Path,
    tileset: &str,
    name: &str,
    format: Option<&str>,
) -> Result<usize, Box<dyn Error>> {
    let mut cache = match format {
        Some(format) => Some(Cache::new(base_dir, tileset, format, name)?),
        None => None,
    };

    let mut count = 0;

    // sorted so the first tile, which picks the format, is the same on every run
    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| format!("Error walking directory: {e}"))?;

        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();

        let Some((ext, coord)) = parse_path(&entry) else {
            log::warn!("unexpected file, skipping: {}", path.display());

            continue;
        };

        let Ok(tile_format) = TileFormat::from_extension(&ext) else {
            log::warn!("unsupported tile format, skipping: {}", path.display());

            continue;
        };

        if cache.is_none() {
            cache = Some(Cache::new(base_dir, tileset, &ext, name)?);
        }

        let Some(cache) = &cache else {
            continue;
        };

        if tile_format != cache.format() {
            log::warn!(
                "tile is not {}, skipping: {}",
                cache.format(),
                path.display()
            );

            continue;
        }

        let data = fs::read(path).map_err(|e| format!("Error reading file: {e}"))?;

        cache
            .save(coord, &data)
            .map_err(|e| format!("Error inserting tile {coord}.{ext}: {e}"))?;

        log::debug!("packed {}", path.display());

        count += 1;
    }

    Ok(count)
}

fn default_name(tileset: &str) -> String {
    PathBuf::from(tileset)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "noname".into())
}

fn parse_path(entry: &DirEntry) -> Option<(String, TileCoord)> {
    if entry.depth() != 3 {
        return None;
    }

    let mut parts = entry
        .path()
        .iter()
        .rev()
        .take(3)
        .map(|part| part.to_string_lossy().to_string());

    let file = parts.next()?;
    let x: u32 = parts.next()?.parse().ok()?;
    let z: u8 = parts.next()?.parse().ok()?;

    let (y, ext) = file.split_once('.')?;

    let coord = TileCoord::new(z, x, y.parse().ok()?).ok()?;

    Some((ext.to_string(), coord))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::collections::HashSet;
    use tempfile::TempDir;

    struct Workspace {
        dir: TempDir,
        source: PathBuf,
    }

    fn write_tile(source: &Path, relative: &str, data: &[u8]) {
        let path = source.join(relative);
        fs::create_dir_all(path.parent().expect("tile has a parent")).expect("create dirs");
        fs::write(path, data).expect("write tile");
    }

    #[fixture]
    fn workspace() -> Workspace {
        let dir = TempDir::new().expect("create temporary directory");
        let source = dir.path().join("tiles");

        write_tile(&source, "0/0/0.png", b"world");
        write_tile(&source, "1/1/0.png", b"north-east");
        write_tile(&source, "2/1/1.jpg", b"jpeg");
        write_tile(&source, "readme.txt", b"not a tile");
        write_tile(&source, "a/3/2/1.png", b"too deep");
        write_tile(&source, "x/y/z.png", b"not numeric");
        write_tile(&source, "1/0/5.png", b"outside the pyramid");
        write_tile(&source, "3/2/1.gif", b"unsupported");

        Workspace { dir, source }
    }

    fn coord(zoom: u8, column: u32, row: u32) -> TileCoord {
        TileCoord::new(zoom, column, row).expect("valid coordinate")
    }

    fn listed(tileset: &Tileset) -> Result<HashSet<TileCoord>, Box<dyn Error>> {
        Ok(tileset.list_tiles()?.collect::<Result<HashSet<_>, _>>()?)
    }

    #[rstest]
    fn packs_tiles_in_format_of_first_tile(workspace: Workspace) -> Result<(), Box<dyn Error>> {
        let base = workspace.dir.path();

        let count = pack(base, &workspace.source, "out.mbtiles", "out", None)?;

        assert_eq!(count, 2);

        let tileset = Tileset::new(base.join("out.mbtiles"));
        assert_eq!(listed(&tileset)?, HashSet::from([coord(0, 0, 0), coord(1, 1, 0)]));

        let metadata = tileset.metadata()?.expect("metadata present");
        assert_eq!(metadata.tile_format()?, Some(TileFormat::Png));
        assert_eq!(metadata.name.as_deref(), Some("out"));

        let tile = tileset.get_tile(coord(1, 1, 0))?.expect("tile packed");
        assert_eq!(tile.data, b"north-east");

        Ok(())
    }

    #[rstest]
    fn packs_only_tiles_of_requested_format(workspace: Workspace) -> Result<(), Box<dyn Error>> {
        let base = workspace.dir.path();

        let count = pack(base, &workspace.source, "out.mbtiles", "out", Some("jpg"))?;

        assert_eq!(count, 1);

        let tileset = Tileset::new(base.join("out.mbtiles"));
        assert_eq!(listed(&tileset)?, HashSet::from([coord(2, 1, 1)]));
        assert_eq!(
            tileset.metadata()?.and_then(|metadata| metadata.format),
            Some("jpg".into())
        );

        Ok(())
    }

    #[rstest]
    fn appends_to_existing_tileset(workspace: Workspace) -> Result<(), Box<dyn Error>> {
        let base = workspace.dir.path();

        pack(base, &workspace.source, "out.mbtiles", "out", None)?;
        let count = pack(base, &workspace.source, "out.mbtiles", "renamed", None)?;

        assert_eq!(count, 2);

        let tileset = Tileset::new(base.join("out.mbtiles"));
        assert_eq!(listed(&tileset)?.len(), 2);
        assert_eq!(
            tileset.metadata()?.and_then(|metadata| metadata.name),
            Some("out".into())
        );

        Ok(())
    }

    #[rstest]
    #[case("3/2/1.png", Some(("png", 3, 2, 1)))]
    #[case("0/0/0.PBF", Some(("PBF", 0, 0, 0)))]
    #[case("a/3/2/1.png", None)]
    #[case("3/2.png", None)]
    #[case("3/2/1", None)]
    #[case("3/9/1.png", None)]
    #[case("z/x/y.png", None)]
    fn parses_tile_paths(
        #[case] relative: &str,
        #[case] expected: Option<(&str, u8, u32, u32)>,
    ) {
        let dir = TempDir::new().expect("create temporary directory");
        write_tile(dir.path(), relative, b"");

        let entry = WalkDir::new(dir.path())
            .into_iter()
            .map(|entry| entry.expect("walk"))
            .find(|entry| entry.file_type().is_file())
            .expect("file written");

        let expected = expected.map(|(ext, z, x, y)| (ext.to_string(), coord(z, x, y)));

        assert_eq!(parse_path(&entry), expected);
    }

    #[test]
    fn names_tileset_after_file_stem() {
        assert_eq!(default_name("maps/roads.mbtiles"), "roads");
        assert_eq!(default_name(""), "noname");
    }
}
