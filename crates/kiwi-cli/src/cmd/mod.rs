use std::path::PathBuf;

use anyhow::Result;

use crate::args::{Cli, Command};

mod doctor;
mod load;
mod run;
mod search;
mod sign;
mod validate;
mod verify;

/// The project root: explicit flag, else the current directory when it
/// carries an `.ai/` store.
pub fn project_root(cli: &Cli) -> Option<PathBuf> {
    if let Some(project) = &cli.project {
        return Some(PathBuf::from(project));
    }
    let cwd = std::env::current_dir().ok()?;
    cwd.join(".ai").is_dir().then_some(cwd)
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    let project = project_root(&cli);
    match cli.command.clone() {
        Command::Search {
            kind,
            query,
            scope,
            limit,
        } => search::run(project.as_deref(), &kind, &query, &scope, limit),
        Command::Load { kind, id, from, to } => {
            load::run(project.as_deref(), &kind, &id, &from, to.as_deref())
        }
        Command::Sign { kind, id, scope } => {
            sign::run(project.as_deref(), &kind, &id, scope.as_deref())
        }
        Command::Verify { kind, id } => verify::run(project.as_deref(), &kind, &id),
        Command::Validate { kind, id } => validate::run(project.as_deref(), &kind, &id),
        Command::Run {
            tool_id,
            params,
            params_json,
            dry_run,
        } => {
            run::run(
                project.as_deref(),
                &tool_id,
                &params,
                params_json.as_deref(),
                dry_run,
            )
            .await
        }
        Command::Delete { kind, id, scope } => {
            load::delete(project.as_deref(), &kind, &id, scope.as_deref())
        }
        Command::Doctor => doctor::run(project.as_deref()),
    }
}
