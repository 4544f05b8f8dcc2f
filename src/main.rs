use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use heapdb::{
    client::Shell,
    common::{DEFAULT_POOL_SIZE, PAGE_SIZE},
    config::Config,
    instance::Instance,
    record::Record,
};
use tracing_subscriber::EnvFilter;

/// Interactive shell over a single heap file of integer records.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Heap file to open, created if missing
    #[arg(long, default_value = "heapdb.tbl")]
    data_file: PathBuf,

    /// Number of i32 fields per record
    #[arg(long, default_value_t = 2)]
    fields: usize,

    /// Buffer pool capacity in pages
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
    pool_size: usize,

    /// Page size in bytes; must match the size the file was created with
    #[arg(long, default_value_t = PAGE_SIZE)]
    page_size: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::default()
        .with_page_size(args.page_size)
        .with_pool_size(args.pool_size);
    let instance = Instance::new(config);
    let table_id = instance.open_table(&args.data_file, Record::width_for_fields(args.fields))?;
    Shell::new(instance, table_id, args.fields).run()
}
