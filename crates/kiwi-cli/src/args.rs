use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "kiwi", version, about = "kiwi artifact store and executor")]
pub struct Cli {
    /// Emit JSON output on stdout.
    #[arg(long, global = true)]
    pub json: bool,

    /// Project root (the directory containing `.ai/`). Defaults to the
    /// current directory when it has an `.ai/` subdirectory.
    #[arg(long, global = true)]
    pub project: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Search artifacts by keyword across project and user scopes.
    Search {
        /// Artifact kind: directive|tool|knowledge
        kind: String,
        /// Search query.
        query: String,
        /// Scope to search: all|project|user
        #[arg(long, default_value = "all")]
        scope: String,
        /// Maximum results.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Load an artifact: read it, or copy it across scopes.
    Load {
        kind: String,
        id: String,
        /// Source scope: project|user
        #[arg(long, default_value = "project")]
        from: String,
        /// Destination scope; omit for read-only.
        #[arg(long)]
        to: Option<String>,
    },

    /// Validate and sign an artifact in place.
    Sign {
        kind: String,
        id: String,
        /// Scope to sign in: project|user; omit for project-first resolution.
        #[arg(long)]
        scope: Option<String>,
    },

    /// Recompute an artifact's integrity hash and compare with its signature.
    Verify { kind: String, id: String },

    /// Run structural validation without signing.
    Validate { kind: String, id: String },

    /// Execute a tool through its resolved chain.
    Run {
        tool_id: String,
        /// Runtime parameters as key=value pairs (values parse as JSON when
        /// possible, falling back to strings).
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// Runtime parameters as one JSON object (merged over --param).
        #[arg(long)]
        params_json: Option<String>,
        /// Resolve and verify the chain without executing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete an artifact from a scope.
    Delete {
        kind: String,
        id: String,
        /// Scope: project|user; omit to delete the first resolution match.
        #[arg(long)]
        scope: Option<String>,
    },

    /// Run environment checks.
    Doctor,
}
