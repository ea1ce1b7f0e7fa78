//! Primitive executor: resolve, verify, merge, dispatch.
//!
//! The fixed order inside one `execute` call:
//! 1. resolve the executor chain
//! 2. re-verify every link's integrity hash (abort naming the failing link)
//! 3. merge configs, leaf wins
//! 4. dispatch on the terminal primitive id (`subprocess` / `http_client`)
//!
//! Results wrap into a uniform `ExecutionResult`; callers turn that into the
//! response envelope.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use kiwi_core::report::Envelope;

use crate::chain::ChainResolver;
use crate::http::HttpClientPrimitive;
use crate::merge::merge_chain_configs;
use crate::sink::{EventSink, SINKS_PARAM};
use crate::subprocess::SubprocessPrimitive;
use crate::verifier::IntegrityVerifier;

/// Terminal primitive ids the executor can dispatch to.
pub const PRIMITIVE_SUBPROCESS: &str = "subprocess";
pub const PRIMITIVE_HTTP_CLIENT: &str = "http_client";

/// Unified result of a tool execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub data: Value,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: Value,
}

impl ExecutionResult {
    fn failure(error: impl Into<String>, started: Instant, metadata: Value) -> Self {
        Self {
            success: false,
            data: Value::Null,
            duration_ms: started.elapsed().as_millis() as u64,
            error: Some(error.into()),
            metadata,
        }
    }

    /// Convert into the uniform response envelope.
    pub fn into_envelope(self) -> Envelope {
        if self.success {
            Envelope::ok()
                .with_field("data", self.data)
                .with_field("metadata", self.metadata)
                .with_field("duration_ms", json!(self.duration_ms))
        } else {
            Envelope::primitive_execution(
                self.error.unwrap_or_else(|| "execution failed".to_string()),
            )
            .with_field("metadata", self.metadata)
            .with_field("duration_ms", json!(self.duration_ms))
        }
    }
}

/// Orchestrator that routes execution to the correct primitive.
pub struct PrimitiveExecutor {
    resolver: ChainResolver,
    verifier: IntegrityVerifier,
    subprocess: SubprocessPrimitive,
    http_client: HttpClientPrimitive,
}

impl PrimitiveExecutor {
    pub fn new(project: Option<&Path>) -> Self {
        Self {
            resolver: ChainResolver::new(project),
            verifier: IntegrityVerifier::new(),
            subprocess: SubprocessPrimitive::new(project),
            http_client: HttpClientPrimitive::new(),
        }
    }

    pub fn resolver(&self) -> &ChainResolver {
        &self.resolver
    }

    pub fn verifier(&self) -> &IntegrityVerifier {
        &self.verifier
    }

    /// Execute a tool with runtime params.
    pub async fn execute(&self, tool_id: &str, params: Value) -> ExecutionResult {
        self.execute_with_sinks(tool_id, params, Vec::new()).await
    }

    /// Execute with pre-instantiated streaming sinks. Any `__sinks` key left
    /// in params by an outer layer is stripped; the typed argument wins.
    pub async fn execute_with_sinks(
        &self,
        tool_id: &str,
        mut params: Value,
        sinks: Vec<Box<dyn EventSink>>,
    ) -> ExecutionResult {
        let started = Instant::now();
        if let Some(map) = params.as_object_mut() {
            map.remove(SINKS_PARAM);
        }

        // 1. Resolve.
        let chain = match self.resolver.resolve(tool_id) {
            Ok(chain) => chain,
            Err(e) => {
                error!(target: "kiwi_exec", tool_id, error = %e, "chain resolution failed");
                return ExecutionResult::failure(
                    e.to_string(),
                    started,
                    json!({"stage": "resolve"}),
                );
            }
        };
        let terminal = match chain.last() {
            Some(link) => link,
            None => {
                return ExecutionResult::failure(
                    format!("tool '{tool_id}' resolved to an empty chain"),
                    started,
                    json!({"stage": "resolve"}),
                );
            }
        };
        if !terminal.tool_type.is_primitive() {
            return ExecutionResult::failure(
                format!(
                    "invalid tool chain: terminal tool '{}' is not a primitive",
                    terminal.id
                ),
                started,
                json!({"stage": "resolve", "chain_length": chain.len()}),
            );
        }

        // 2. Verify integrity of every link before anything runs.
        let verification = self.verifier.verify_chain(&chain);
        if !verification.success {
            return ExecutionResult::failure(
                format!(
                    "integrity verification failed for '{}': {}",
                    verification
                        .failed_tool_id
                        .as_deref()
                        .unwrap_or("unknown"),
                    verification.error.as_deref().unwrap_or("unknown error")
                ),
                started,
                json!({
                    "stage": "verify",
                    "chain_length": chain.len(),
                    "failed_at_index": verification.failed_at,
                    "integrity_verified": false,
                }),
            );
        }
        debug!(target: "kiwi_exec", tool_id, links = chain.len(), "chain verified");

        // 3. Merge configs, leaf wins.
        let config = merge_chain_configs(&chain);

        // 4. Dispatch on the terminal primitive id.
        let primitive_type = terminal.id.as_str();
        let metadata_base = |primitive: &str| {
            json!({
                "type": primitive,
                "chain_length": chain.len(),
                "integrity_verified": true,
            })
        };

        match primitive_type {
            PRIMITIVE_SUBPROCESS => {
                let result = self.subprocess.execute(&config, &params).await;
                subprocess_execution(result, started, metadata_base(PRIMITIVE_SUBPROCESS))
            }
            PRIMITIVE_HTTP_CLIENT => {
                let result = self.http_client.execute(&config, &params, sinks).await;
                let mut metadata = metadata_base(PRIMITIVE_HTTP_CLIENT);
                metadata["status_code"] = json!(result.status_code);
                metadata["headers"] = json!(result.headers);
                if let Some(count) = result.stream_events_count {
                    metadata["stream_events_count"] = json!(count);
                }
                if let Some(dests) = &result.stream_destinations {
                    metadata["stream_destinations"] = json!(dests);
                }
                ExecutionResult {
                    success: result.success,
                    error: result.error.clone(),
                    data: result.body,
                    duration_ms: started.elapsed().as_millis() as u64,
                    metadata,
                }
            }
            // A primitive that is neither built-in terminal executes its own
            // file as a script (python3 for .py, direct exec for .sh).
            other => match script_primitive_config(&config, &terminal.file_path) {
                Some(script_config) => {
                    let result = self.subprocess.execute(&script_config, &params).await;
                    subprocess_execution(result, started, metadata_base(PRIMITIVE_SUBPROCESS))
                }
                None => ExecutionResult::failure(
                    format!("unknown primitive type: {other}"),
                    started,
                    json!({"stage": "dispatch", "chain_length": chain.len()}),
                ),
            },
        }
    }

    /// Drop caches for a tool after its file was rewritten (e.g. re-signed).
    /// Evicts the resolver entry and invalidates the verifier for every hash
    /// the cached chain carried.
    pub fn invalidate_tool(&self, tool_id: &str) {
        for hash in self.resolver.invalidate_tool(tool_id) {
            self.verifier.invalidate(&hash);
        }
    }

    pub fn clear_caches(&self) {
        self.resolver.clear_caches();
        self.verifier.clear_cache();
    }

    /// Combined cache statistics.
    pub fn cache_stats(&self) -> Value {
        let mut out = Map::new();
        out.insert("chains".to_string(), json!(self.resolver.cache_stats()));
        out.insert("integrity".to_string(), json!(self.verifier.cache_stats()));
        Value::Object(out)
    }
}

fn subprocess_execution(
    result: crate::subprocess::SubprocessResult,
    started: Instant,
    mut metadata: Value,
) -> ExecutionResult {
    metadata["return_code"] = json!(result.return_code);
    ExecutionResult {
        success: result.success,
        error: if result.success {
            None
        } else {
            Some(result.stderr.clone())
        },
        data: json!({
            "stdout": result.stdout,
            "stderr": result.stderr,
            "return_code": result.return_code,
        }),
        duration_ms: started.elapsed().as_millis() as u64,
        metadata,
    }
}

/// Config for a self-executing script primitive, or `None` when the file is
/// not a runnable script.
fn script_primitive_config(merged: &Value, file_path: &Path) -> Option<Value> {
    let ext = file_path.extension().and_then(|e| e.to_str())?;
    let mut config = merged.as_object().cloned().unwrap_or_default();
    match ext {
        "py" => {
            let interpreter = config
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or("python3")
                .to_string();
            config.insert("command".to_string(), json!(interpreter));
            config.insert(
                "args".to_string(),
                json!([file_path.display().to_string()]),
            );
        }
        "sh" => {
            config.insert(
                "command".to_string(),
                json!(file_path.display().to_string()),
            );
            config.insert("args".to_string(), json!([]));
        }
        _ => return None,
    }
    Some(Value::Object(config))
}
