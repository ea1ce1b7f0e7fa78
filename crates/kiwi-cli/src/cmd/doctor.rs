use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde_json::{json, Value};

use kiwi_core::artifact::ArtifactKind;
use kiwi_core::manager::MetadataManager;
use kiwi_core::report::Envelope;
use kiwi_store::envfile;
use kiwi_store::paths::PROJECT_STORE_DIR;
use kiwi_store::search::{search_artifacts, SortBy};
use kiwi_store::{user_space, Roots};

use crate::output;

/// Environment checks: store roots, environment variables (USER_SPACE plus
/// every `required_env_vars` declared by stored tools), interpreter
/// availability.
pub fn run(project: Option<&Path>) -> Result<()> {
    let mut checks = Vec::new();

    let user_root = user_space();
    checks.push(json!({
        "name": "user_space",
        "path": user_root.display().to_string(),
        "exists": user_root.is_dir(),
        "writable": is_writable(&user_root),
    }));

    checks.push(json!({
        "name": "env_USER_SPACE",
        "set": std::env::var_os("USER_SPACE").is_some(),
        "effective": user_root.display().to_string(),
        "note": "defaults to ~/.ai when unset",
    }));

    match project {
        Some(project) => {
            let store_dir = project.join(PROJECT_STORE_DIR);
            checks.push(json!({
                "name": "project_store",
                "path": store_dir.display().to_string(),
                "exists": store_dir.is_dir(),
                "writable": is_writable(&store_dir),
            }));
        }
        None => {
            checks.push(json!({
                "name": "project_store",
                "note": "no project detected; pass --project or run inside one",
            }));
        }
    }

    checks.push(tool_env_var_check(project));

    checks.push(json!({
        "name": "python3",
        "available": which("python3"),
    }));

    let envelope = Envelope::ok().with_field("checks", json!(checks));
    output::print(&envelope)
}

/// Collect `required_env_vars` from every stored tool and report the ones
/// absent from the layered environment, with the tools that want them.
fn tool_env_var_check(project: Option<&Path>) -> Value {
    let roots = Roots::new(project);
    let env = envfile::load_layered_env(project, &BTreeMap::new());

    let mut required: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for hit in search_artifacts(&roots, ArtifactKind::Tool, "", None, usize::MAX, SortBy::Name) {
        let Ok(parsed) =
            MetadataManager::parse_file(ArtifactKind::Tool, Path::new(&hit.path))
        else {
            continue;
        };
        let Some(vars) = parsed.get("required_env_vars").and_then(Value::as_array) else {
            continue;
        };
        for var in vars.iter().filter_map(Value::as_str) {
            required
                .entry(var.to_string())
                .or_default()
                .push(hit.name.clone());
        }
    }

    let missing: Vec<Value> = required
        .iter()
        .filter(|(var, _)| !env.contains_key(*var))
        .map(|(var, tools)| json!({"var": var, "wanted_by": tools}))
        .collect();
    let ok = missing.is_empty();

    json!({
        "name": "tool_env_vars",
        "required_count": required.len(),
        "missing": missing,
        "ok": ok,
    })
}

fn is_writable(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    let probe = path.join(".kiwi-doctor-probe");
    match std::fs::write(&probe, b"probe") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

fn which(binary: &str) -> bool {
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(binary).is_file())
}
