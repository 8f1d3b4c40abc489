use anyhow::Result;
use clap::Args;

use crate::backend::Backend;

#[derive(Debug, Clone, Args)]
pub struct RestoreArgs {
    pub table: String,

    /// Must include `restore` and `primary_key=<dotted path>`, e.g.
    /// `restore&primary_key=id&where=timestamp=gte.2024-01-01`.
    pub query: String,
}

pub fn run(args: &RestoreArgs, backend: &dyn Backend) -> Result<()> {
    println!("restore: start table={} query={}", args.table, args.query);
    let report = backend.restore(&args.table, &args.query)?;
    println!(
        "restore: complete table={} restored={} updated={}",
        args.table,
        report.restored.len(),
        report.updated.len()
    );
    Ok(())
}
