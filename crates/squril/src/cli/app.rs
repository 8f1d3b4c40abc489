use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::commands::{
    alter::AlterArgs, delete::DeleteArgs, insert::InsertArgs, restore::RestoreArgs, select::SelectArgs,
    update::UpdateArgs,
};

#[derive(Debug, Parser)]
#[command(name = "squril", version, about = "Structured query URI language engine")]
pub struct Cli {
    #[command(flatten)]
    pub backend: BackendArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Which store to connect to, and how. Exactly one of `db_path` (embedded)
/// or `host` (server) must be given.
#[derive(Debug, Clone, Args)]
pub struct BackendArgs {
    /// Path to a SQLite database file; selects the embedded dialect.
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// PostgreSQL host; selects the server dialect.
    #[arg(long, global = true)]
    pub host: Option<String>,

    #[arg(long, global = true, default_value_t = 5432)]
    pub port: u16,

    #[arg(long, global = true, default_value = "squril")]
    pub dbname: String,

    #[arg(long, global = true, default_value = "squril")]
    pub user: String,

    #[arg(long, global = true)]
    pub password: Option<String>,

    #[arg(long, global = true)]
    pub schema: Option<String>,

    #[arg(long, global = true)]
    pub schema_pattern: Option<String>,

    #[arg(long, global = true)]
    pub backup_days: Option<i64>,

    #[arg(long, global = true, default_value_t = false)]
    pub update_all_view: bool,

    #[arg(long, global = true)]
    pub requestor: Option<String>,

    #[arg(long, global = true)]
    pub requestor_name: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Insert(InsertArgs),
    Select(SelectArgs),
    Update(UpdateArgs),
    Delete(DeleteArgs),
    Alter(AlterArgs),
    Restore(RestoreArgs),
}
