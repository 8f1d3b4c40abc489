use anyhow::Result;
use clap::Args;

use crate::backend::Backend;

#[derive(Debug, Clone, Args)]
pub struct AlterArgs {
    pub table: String,

    /// An alter clause, e.g. `alter=name=eq.new_table_name`.
    pub query: String,
}

pub fn run(args: &AlterArgs, backend: &dyn Backend) -> Result<()> {
    println!("alter: start table={} query={}", args.table, args.query);
    let report = backend.alter(&args.table, &args.query)?;
    println!("alter: complete renamed={}", report.tables.join(","));
    Ok(())
}
