use anyhow::Result;
use clap::Args;

use crate::backend::Backend;
use crate::cli::runtime::read_json_payload;

#[derive(Debug, Clone, Args)]
pub struct InsertArgs {
    pub table: String,

    /// A JSON object/array literal, or `@path` to read one from a file.
    pub data: String,

    #[arg(long, default_value_t = false)]
    pub no_audit: bool,
}

pub fn run(args: &InsertArgs, backend: &dyn Backend) -> Result<()> {
    let data = read_json_payload(&args.data)?;
    println!("insert: start table={}", args.table);
    backend.insert(&args.table, &data, !args.no_audit)?;
    println!("insert: complete table={}", args.table);
    Ok(())
}
