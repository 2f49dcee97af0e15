use std::path::PathBuf;

use clap::Parser;
use log::debug;
use raster2pgsql::{parse_block_size, LoaderConfig, Result, RunSummary, TableMode};

/// Convert GeoTIFF rasters into PostGIS WKT Raster SQL.
#[derive(Parser, Debug)]
#[command(name = "raster2pgsql", disable_version_flag = true)]
struct Cli {
    /// Raster files or glob patterns to load
    #[arg(short = 'r', long = "raster", required = true, num_args = 1..)]
    raster: Vec<String>,

    /// Destination table, [<schema>.]<table>
    #[arg(short = 't', long = "table")]
    table: String,

    /// Assign this SRID instead of the one found in the raster
    #[arg(short = 's', long = "srid")]
    srid: Option<i32>,

    /// Load only this band (1-based)
    #[arg(short = 'b', long = "band")]
    band: Option<usize>,

    /// Cut rasters into tiles, WIDTHxHEIGHT or 'auto'
    #[arg(short = 'k', long = "block-size")]
    block_size: Option<String>,

    /// Register the raster out-of-db, storing a file reference only
    #[arg(short = 'R', long = "register")]
    register: bool,

    /// Overview level to import, requires --block-size
    #[arg(short = 'l', long = "overview-level", default_value_t = 1)]
    overview_level: usize,

    /// Create the table and load (default)
    #[arg(short = 'c', long = "create")]
    create: bool,

    /// Append to an existing table
    #[arg(short = 'a', long = "append")]
    append: bool,

    /// Drop the table, then create and load
    #[arg(short = 'd', long = "drop")]
    drop: bool,

    /// Name of the raster column
    #[arg(short = 'f', long = "field", default_value = "rast")]
    field: String,

    /// Add a column with the name of the source file
    #[arg(short = 'F', long = "filename")]
    filename: bool,

    /// Create a GiST index on the raster column
    #[arg(short = 'I', long = "index")]
    index: bool,

    /// Vacuum analyze the raster table after loading
    #[arg(short = 'M', long = "vacuum")]
    vacuum: bool,

    /// Create the raster_overviews catalog table
    #[arg(short = 'V', long = "create-raster-overviews")]
    create_raster_overviews: bool,

    /// Output endianness, NDR (1) only
    #[arg(short = 'e', long = "endian", default_value_t = 1)]
    endian: u8,

    /// WKB format version, 0 only
    #[arg(short = 'w', long = "raster-version", default_value_t = 0)]
    raster_version: u16,

    /// Write the SQL script to this file instead of stdout
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
    debug!("parsed CLI args: {cli:?}");

    if let Err(err) = run(&cli) {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = LoaderConfig::new(cli.raster.clone(), cli.table.clone());
    config.srid = cli.srid;
    config.band = cli.band;
    config.block_size = match &cli.block_size {
        Some(value) => Some(parse_block_size(value)?),
        None => None,
    };
    config.out_db = cli.register;
    config.overview_level = cli.overview_level;
    config.table_mode = TableMode::from_flags(cli.create, cli.append, cli.drop)?;
    config.column = cli.field.clone();
    config.filename_column = cli.filename;
    config.create_index = cli.index;
    config.vacuum = cli.vacuum;
    config.create_overview_catalog = cli.create_raster_overviews;
    config.endian = cli.endian;
    config.version = cli.raster_version;
    config.output = cli.output.clone();

    let summary = raster2pgsql::run(&config)?;
    // The script owns stdout when no output file is given.
    if config.output.is_some() {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("------------------------------------------------------------");
    println!(" Processed {} raster file(s)", summary.files);
    for (table, tiles) in &summary.tables {
        println!(" {table}: {tiles} tile(s)");
    }
    println!("------------------------------------------------------------");
}
