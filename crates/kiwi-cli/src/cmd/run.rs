use std::path::Path;

use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};

use kiwi_core::artifact::ArtifactKind;
use kiwi_core::report::Envelope;
use kiwi_exec::PrimitiveExecutor;
use kiwi_store::Store;

use crate::output;

pub async fn run(
    project: Option<&Path>,
    tool_id: &str,
    params: &[String],
    params_json: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let params = build_params(params, params_json)?;
    let store = Store::new(project);
    let executor = PrimitiveExecutor::new(project);

    if dry_run {
        let envelope = match executor.resolver().resolve(tool_id) {
            Err(e) => Envelope::chain_error(e.to_string()),
            Ok(chain) => {
                let verification = executor.verifier().verify_chain(&chain);
                if verification.success {
                    Envelope::ok()
                        .with_field("dry_run", json!(true))
                        .with_field("chain", json!(chain.as_ref()))
                        .with_field("chain_length", json!(chain.len()))
                        .with_field("integrity_verified", json!(true))
                } else {
                    Envelope::error(
                        verification
                            .error
                            .clone()
                            .unwrap_or_else(|| "verification failed".to_string()),
                    )
                    .with_field("failed_tool_id", json!(verification.failed_tool_id))
                    .with_field("failed_at_index", json!(verification.failed_at))
                }
            }
        };
        return output::print(&envelope);
    }

    let result = executor.execute(tool_id, Value::Object(params)).await;

    // Attach the newer-version warning the way load does.
    let mut envelope = result.into_envelope();
    if let Some(path) = store.resolve(ArtifactKind::Tool, tool_id) {
        let scope = store.roots().scope_of(&path);
        if let Ok(parsed) = kiwi_core::manager::MetadataManager::parse_file(ArtifactKind::Tool, &path)
        {
            if let Some(version) = parsed.get("version").and_then(Value::as_str) {
                if let Some(warning) =
                    store.newer_version_warning(ArtifactKind::Tool, tool_id, version, scope)
                {
                    envelope = envelope.with_field("version_warning", warning);
                }
            }
        }
    }
    output::print(&envelope)
}

fn build_params(pairs: &[String], params_json: Option<&str>) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("--param expects KEY=VALUE, got '{pair}'"))?;
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.to_string(), value);
    }
    if let Some(raw) = params_json {
        let parsed: Value = serde_json::from_str(raw)
            .map_err(|e| anyhow!("--params-json is not valid JSON: {e}"))?;
        let obj = parsed
            .as_object()
            .ok_or_else(|| anyhow!("--params-json must be a JSON object"))?;
        for (k, v) in obj {
            map.insert(k.clone(), v.clone());
        }
    }
    Ok(map)
}
