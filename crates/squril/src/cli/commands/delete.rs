use anyhow::Result;
use clap::Args;

use crate::backend::Backend;

#[derive(Debug, Clone, Args)]
pub struct DeleteArgs {
    pub table: String,

    /// A SQURIL where-clause; omit to drop the whole table.
    #[arg(default_value = "")]
    pub query: String,

    #[arg(long, default_value_t = false)]
    pub no_audit: bool,
}

pub fn run(args: &DeleteArgs, backend: &dyn Backend) -> Result<()> {
    println!("delete: start table={} query={}", args.table, args.query);
    backend.delete(&args.table, &args.query, !args.no_audit)?;
    println!("delete: complete table={}", args.table);
    Ok(())
}
