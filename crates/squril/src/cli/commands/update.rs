use anyhow::Result;
use clap::Args;

use crate::backend::Backend;
use crate::cli::runtime::read_json_payload;

#[derive(Debug, Clone, Args)]
pub struct UpdateArgs {
    pub table: String,

    /// A SQURIL query string, e.g. `set=name&where=id=eq.1`.
    pub query: String,

    /// A JSON object literal, or `@path` to read one from a file.
    pub data: String,
}

pub fn run(args: &UpdateArgs, backend: &dyn Backend) -> Result<()> {
    let data = read_json_payload(&args.data)?;
    println!("update: start table={} query={}", args.table, args.query);
    backend.update(&args.table, &args.query, &data)?;
    println!("update: complete table={}", args.table);
    Ok(())
}
