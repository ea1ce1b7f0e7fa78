//! Layered `.env` loading for process environments.
//!
//! Load order, later wins:
//! 1. user scope: `${USER_SPACE:-~/.ai}/.env`
//! 2. project scope: `<project>/.ai/.env`
//! 3. current process environment
//! 4. explicit overrides
//!
//! `PYTHONHOME` is stripped unconditionally: a stale value from the parent
//! process breaks any interpreter spawned out of a venv.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::paths::{user_space, PROJECT_STORE_DIR};

/// Parse `.env` content: `KEY=VALUE` lines, `#` comments, optional `export `
/// prefix, single or double quoted values.
pub fn parse_env_content(content: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut value = value.trim();
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        out.insert(key.to_string(), value.to_string());
    }
    out
}

fn load_env_file(path: &Path) -> BTreeMap<String, String> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(target: "kiwi_store.env", path = %path.display(), "loaded env file");
            parse_env_content(&content)
        }
        Err(_) => BTreeMap::new(),
    }
}

/// Build the layered environment for a spawned process.
pub fn load_layered_env(
    project: Option<&Path>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = load_env_file(&user_space().join(".env"));

    if let Some(project) = project {
        let project_env = project.join(PROJECT_STORE_DIR).join(".env");
        merged.extend(load_env_file(&project_env));
    }

    for (k, v) in std::env::vars() {
        merged.insert(k, v);
    }
    for (k, v) in overrides {
        merged.insert(k.clone(), v.clone());
    }

    merged.remove("PYTHONHOME");
    merged
}

/// Prefix `PATH` with a venv's bin directory and point `VIRTUAL_ENV` at it.
pub fn apply_venv(env: &mut BTreeMap<String, String>, venv_dir: &Path) {
    let bin = venv_dir.join("bin");
    let path = env.get("PATH").cloned().unwrap_or_default();
    env.insert(
        "PATH".to_string(),
        format!("{}:{path}", bin.display()),
    );
    env.insert(
        "VIRTUAL_ENV".to_string(),
        venv_dir.display().to_string(),
    );
}

/// Create a virtual environment at `venv_dir` if missing, under an advisory
/// lock so concurrent creations do not race. Returns the venv path once it
/// contains an interpreter.
pub fn ensure_venv(venv_dir: &Path) -> crate::StoreResult<std::path::PathBuf> {
    if venv_has_python(venv_dir) {
        return Ok(venv_dir.to_path_buf());
    }
    crate::lock::with_lock(venv_dir, || {
        // Another process may have won the race while we waited.
        if venv_has_python(venv_dir) {
            return Ok(venv_dir.to_path_buf());
        }
        if let Some(parent) = venv_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let status = std::process::Command::new("python3")
            .args(["-m", "venv"])
            .arg(venv_dir)
            .status()?;
        if !status.success() {
            return Err(crate::StoreError::Io(std::io::Error::other(format!(
                "venv creation failed with status {status}"
            ))));
        }
        Ok(venv_dir.to_path_buf())
    })
}

/// True when a venv directory exists and holds an interpreter.
pub fn venv_has_python(venv_dir: &Path) -> bool {
    venv_dir.join("bin").join("python").is_file()
        || venv_dir.join("bin").join("python3").is_file()
}

/// Append search paths to `PYTHONPATH`.
pub fn augment_pythonpath(env: &mut BTreeMap<String, String>, search_paths: &[&Path]) {
    if search_paths.is_empty() {
        return;
    }
    let mut parts: Vec<String> = search_paths
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    if let Some(existing) = env.get("PYTHONPATH") {
        if !existing.is_empty() {
            parts.push(existing.clone());
        }
    }
    env.insert("PYTHONPATH".to_string(), parts.join(":"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_lines() {
        let env = parse_env_content(
            "# comment\nFOO=bar\nexport BAZ=qux\nQUOTED=\"a b\"\nSINGLE='c d'\n\nBROKEN_LINE\n",
        );
        assert_eq!(env.get("FOO").unwrap(), "bar");
        assert_eq!(env.get("BAZ").unwrap(), "qux");
        assert_eq!(env.get("QUOTED").unwrap(), "a b");
        assert_eq!(env.get("SINGLE").unwrap(), "c d");
        assert!(!env.contains_key("BROKEN_LINE"));
    }

    #[test]
    fn value_may_contain_equals() {
        let env = parse_env_content("URL=https://x/y?a=b\n");
        assert_eq!(env.get("URL").unwrap(), "https://x/y?a=b");
    }

    #[test]
    fn overrides_win_and_pythonhome_stripped() {
        let mut overrides = BTreeMap::new();
        overrides.insert("KIWI_TEST_LAYER".to_string(), "override".to_string());
        overrides.insert("PYTHONHOME".to_string(), "/stale".to_string());
        std::env::set_var("KIWI_TEST_LAYER", "process");

        let env = load_layered_env(None, &overrides);
        assert_eq!(env.get("KIWI_TEST_LAYER").unwrap(), "override");
        assert!(!env.contains_key("PYTHONHOME"));
        std::env::remove_var("KIWI_TEST_LAYER");
    }

    #[test]
    fn venv_prefixes_path() {
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "/usr/bin".to_string());
        apply_venv(&mut env, Path::new("/proj/.ai/scripts/.venv"));
        assert!(env.get("PATH").unwrap().starts_with("/proj/.ai/scripts/.venv/bin:"));
        assert_eq!(env.get("VIRTUAL_ENV").unwrap(), "/proj/.ai/scripts/.venv");
    }

    #[test]
    fn pythonpath_prepends_search_paths() {
        let mut env = BTreeMap::new();
        env.insert("PYTHONPATH".to_string(), "/old".to_string());
        augment_pythonpath(&mut env, &[Path::new("/a"), Path::new("/b")]);
        assert_eq!(env.get("PYTHONPATH").unwrap(), "/a:/b:/old");
    }
}
