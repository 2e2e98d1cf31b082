use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Verbose
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty tileset
    Create {
        /// Tileset *.mbtiles file
        tileset: String,

        /// Name
        #[arg(long, short)]
        name: String,

        /// Layer type: overlay or baselayer
        #[arg(long = "type", default_value = "baselayer")]
        kind: String,

        /// Tileset version
        #[arg(long, default_value = "1.0")]
        version: String,

        /// Description
        #[arg(long, short, default_value = "")]
        description: String,

        /// Tile format: png, jpg, json or pbf
        #[arg(long, short)]
        format: String,

        /// Extent as left,bottom,right,top
        #[arg(long, allow_hyphen_values = true)]
        bounds: Option<String>,
    },

    /// Print tileset metadata
    Info {
        /// Tileset *.mbtiles file
        tileset: String,
    },

    /// List stored tiles as z/x/y
    List {
        /// Tileset *.mbtiles file
        tileset: String,
    },

    /// Write a single tile to a file or stdout
    Get {
        /// Tileset *.mbtiles file
        tileset: String,

        zoom: u8,
        column: u32,
        row: u32,

        /// Output file, stdout when missing
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Requested format, the tileset's own when missing
        #[arg(long = "as")]
        format: Option<String>,
    },

    /// Store a single tile
    Put {
        /// Tileset *.mbtiles file
        tileset: String,

        zoom: u8,
        column: u32,
        row: u32,

        /// Tile file
        input: PathBuf,
    },

    /// Delete a single tile
    Delete {
        /// Tileset *.mbtiles file
        tileset: String,

        zoom: u8,
        column: u32,
        row: u32,
    },

    /// Pack a z/x/y.ext directory into a tileset
    Pack {
        /// Input directory
        source_dir: PathBuf,

        /// Output *.mbtiles file
        tileset: String,

        /// Name
        #[arg(long, short)]
        name: Option<String>,

        /// Tile format, taken from the first tile when missing
        #[arg(long, short)]
        format: Option<String>,
    },
}
