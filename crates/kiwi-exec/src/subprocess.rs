//! Subprocess primitive.
//!
//! Spawns a process directly (never through a shell), streams optional input
//! into stdin, captures stdout/stderr, and enforces a deadline. Every string
//! config value passes through env-var substitution first. The spawned
//! process receives the layered environment (user `.env`, project `.env`,
//! process env, config overrides).

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use kiwi_store::envfile;

use crate::subst::{process_env, substitute_env};

/// Default wall-clock limit for a spawned process.
pub const DEFAULT_TIMEOUT_S: u64 = 300;

/// Result of a subprocess execution.
#[derive(Debug, Clone, Serialize)]
pub struct SubprocessResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub return_code: i64,
    pub duration_ms: u64,
}

impl SubprocessResult {
    fn failure(stderr: String, started: Instant) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr,
            return_code: -1,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Primitive for executing subprocess commands.
#[derive(Default)]
pub struct SubprocessPrimitive {
    project: Option<std::path::PathBuf>,
}

impl SubprocessPrimitive {
    pub fn new(project: Option<&Path>) -> Self {
        Self {
            project: project.map(Path::to_path_buf),
        }
    }

    /// Execute with a merged config and runtime params.
    pub async fn execute(&self, config: &Value, params: &Value) -> SubprocessResult {
        let started = Instant::now();
        let env_snapshot = process_env();

        let Some(command) = config.get("command").and_then(Value::as_str) else {
            return SubprocessResult::failure("command is required in config".to_string(), started);
        };
        let command = substitute_env(command, &env_snapshot);

        let args: Vec<String> = config
            .get("args")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|a| match a {
                        Value::String(s) => substitute_env(s, &env_snapshot),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let timeout_s = config
            .get("timeout_s")
            .or_else(|| config.get("timeout"))
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_S);
        let capture_output = config
            .get("capture_output")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let input_data = params
            .get("input_data")
            .or_else(|| config.get("input_data"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        let cwd = config
            .get("cwd")
            .and_then(Value::as_str)
            .map(|c| substitute_env(c, &env_snapshot));

        // Layered environment plus config overrides.
        let mut overrides = BTreeMap::new();
        if let Some(env_map) = config.get("env").and_then(Value::as_object) {
            for (k, v) in env_map {
                let raw = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                overrides.insert(k.clone(), substitute_env(&raw, &env_snapshot));
            }
        }
        let mut env = envfile::load_layered_env(self.project.as_deref(), &overrides);

        // Runtime configs may route execution through a venv; the bin dir
        // prefixes PATH only when the interpreter is actually there.
        if let Some(venv) = config.get("venv").and_then(Value::as_object) {
            if venv.get("enabled").and_then(Value::as_bool).unwrap_or(false) {
                let venv_dir = venv
                    .get("path")
                    .and_then(Value::as_str)
                    .map(std::path::PathBuf::from)
                    .unwrap_or_else(|| kiwi_store::user_space().join(".venv"));
                if envfile::venv_has_python(&venv_dir) {
                    envfile::apply_venv(&mut env, &venv_dir);
                }
            }
        }

        debug!(target: "kiwi_exec.subprocess", %command, args = ?args, timeout_s, "spawning");

        let mut cmd = Command::new(&command);
        cmd.args(&args).env_clear().envs(&env).kill_on_drop(true);
        if let Some(cwd) = &cwd {
            cmd.current_dir(cwd);
        }
        if capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        if input_data.is_some() {
            cmd.stdin(Stdio::piped());
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let stderr = match e.kind() {
                    std::io::ErrorKind::NotFound => format!("command not found: {command}"),
                    std::io::ErrorKind::PermissionDenied => {
                        format!("permission denied: {command}")
                    }
                    _ => format!("failed to spawn '{command}': {e}"),
                };
                return SubprocessResult::failure(stderr, started);
            }
        };

        if let Some(input) = &input_data {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    return SubprocessResult::failure(
                        format!("failed to write stdin: {e}"),
                        started,
                    );
                }
                drop(stdin);
            }
        }

        let waited =
            tokio::time::timeout(Duration::from_secs(timeout_s), child.wait_with_output()).await;

        match waited {
            Ok(Ok(output)) => {
                let return_code = output.status.code().map(i64::from).unwrap_or(-1);
                SubprocessResult {
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    return_code,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            Ok(Err(e)) => SubprocessResult::failure(format!("process wait failed: {e}"), started),
            Err(_elapsed) => {
                // Dropping the timed-out future drops the child; kill_on_drop
                // reaps it so nothing leaks past the deadline.
                SubprocessResult::failure(
                    format!("command timed out after {timeout_s} seconds"),
                    started,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn echo_succeeds() {
        let primitive = SubprocessPrimitive::new(None);
        let config = json!({"command": "echo", "args": ["hi"]});
        let result = primitive.execute(&config, &json!({})).await;
        assert!(result.success, "stderr: {}", result.stderr);
        assert_eq!(result.stdout, "hi\n");
        assert_eq!(result.return_code, 0);
    }

    #[tokio::test]
    async fn missing_command_fails_cleanly() {
        let primitive = SubprocessPrimitive::new(None);
        let result = primitive.execute(&json!({}), &json!({})).await;
        assert!(!result.success);
        assert!(result.stderr.contains("command is required"));
    }

    #[tokio::test]
    async fn command_not_found_reported() {
        let primitive = SubprocessPrimitive::new(None);
        let config = json!({"command": "kiwi-no-such-binary-exists"});
        let result = primitive.execute(&config, &json!({})).await;
        assert!(!result.success);
        assert!(result.stderr.contains("command not found"));
        assert_eq!(result.return_code, -1);
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure_with_code() {
        let primitive = SubprocessPrimitive::new(None);
        let config = json!({"command": "sh", "args": ["-c", "exit 3"]});
        let result = primitive.execute(&config, &json!({})).await;
        assert!(!result.success);
        assert_eq!(result.return_code, 3);
    }

    #[tokio::test]
    async fn timeout_kills_process() {
        let primitive = SubprocessPrimitive::new(None);
        let config = json!({"command": "sleep", "args": ["30"], "timeout_s": 1});
        let started = Instant::now();
        let result = primitive.execute(&config, &json!({})).await;
        assert!(!result.success);
        assert!(result.stderr.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn env_substitution_in_args() {
        std::env::set_var("KIWI_SUBST_TEST", "expanded");
        let primitive = SubprocessPrimitive::new(None);
        let config = json!({"command": "echo", "args": ["${KIWI_SUBST_TEST}", "${KIWI_SUBST_MISSING:-fallback}"]});
        let result = primitive.execute(&config, &json!({})).await;
        assert_eq!(result.stdout, "expanded fallback\n");
        std::env::remove_var("KIWI_SUBST_TEST");
    }

    #[tokio::test]
    async fn input_data_streams_to_stdin() {
        let primitive = SubprocessPrimitive::new(None);
        let config = json!({"command": "cat"});
        let params = json!({"input_data": "piped content"});
        let result = primitive.execute(&config, &params).await;
        assert!(result.success);
        assert_eq!(result.stdout, "piped content");
    }

    #[tokio::test]
    async fn config_env_reaches_child() {
        let primitive = SubprocessPrimitive::new(None);
        let config = json!({
            "command": "sh",
            "args": ["-c", "printf %s \"$KIWI_CHILD_VAR\""],
            "env": {"KIWI_CHILD_VAR": "from-config"},
        });
        let result = primitive.execute(&config, &json!({})).await;
        assert_eq!(result.stdout, "from-config");
    }
}
