use anyhow::Result;
use clap::Args;

use crate::backend::Backend;

#[derive(Debug, Clone, Args)]
pub struct SelectArgs {
    pub table: String,

    /// A SQURIL query string, e.g. `select=a,b&where=a=eq.1&order=a.asc`.
    #[arg(default_value = "")]
    pub query: String,

    #[arg(long, default_value_t = false)]
    pub audit: bool,
}

pub fn run(args: &SelectArgs, backend: &dyn Backend) -> Result<()> {
    println!("select: start table={} query={}", args.table, args.query);
    let rows = backend.select(&args.table, &args.query, args.audit)?;
    println!("select: complete table={} rows={}", args.table, rows.len());
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
