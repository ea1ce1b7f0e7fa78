//! HTTP client primitive.
//!
//! Two modes, selected by the `mode` runtime parameter:
//! - `sync`: one request per attempt with retry/backoff; the body parses as
//!   JSON when possible, falling back to text
//! - `stream`: reads SSE-style `data:` lines and fans each event out to the
//!   provided sinks
//!
//! Retry policy applies to connection errors, timeouts, and request errors
//! only; HTTP 4xx/5xx responses return immediately. Exponential backoff
//! sleeps `2^attempt` seconds.
//!
//! URL and header values pass through env-var substitution; URL and body
//! pass through parameter templating (a body string that is exactly one
//! placeholder keeps the parameter's JSON type on the wire).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::sink::EventSink;
use crate::subst::{process_env, substitute_env, template_body, template_str};

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_S: u64 = 30;

/// Result of an HTTP execution.
#[derive(Debug, Clone, Serialize)]
pub struct HttpResult {
    pub success: bool,
    pub status_code: u16,
    pub body: Value,
    pub headers: HashMap<String, String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_events_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_destinations: Option<Vec<String>>,
}

impl HttpResult {
    fn failure(error: String, started: Instant) -> Self {
        Self {
            success: false,
            status_code: 0,
            body: Value::Null,
            headers: HashMap::new(),
            duration_ms: started.elapsed().as_millis() as u64,
            error: Some(error),
            stream_events_count: None,
            stream_destinations: None,
        }
    }
}

#[derive(Debug)]
struct RequestPlan {
    method: reqwest::Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    timeout: Duration,
    max_attempts: u32,
    exponential_backoff: bool,
}

/// Primitive for HTTP requests with a pooled client.
pub struct HttpClientPrimitive {
    client: reqwest::Client,
}

impl Default for HttpClientPrimitive {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientPrimitive {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .pool_max_idle_per_host(10)
                .build()
                .expect("default reqwest client"),
        }
    }

    /// Execute with merged config and runtime params. `sinks` receive stream
    /// events in `stream` mode and are ignored in `sync` mode.
    pub async fn execute(
        &self,
        config: &Value,
        params: &Value,
        sinks: Vec<Box<dyn EventSink>>,
    ) -> HttpResult {
        let started = Instant::now();
        let mode = params
            .get("mode")
            .and_then(Value::as_str)
            .unwrap_or("sync");
        match mode {
            "sync" => self.execute_sync(config, params, started).await,
            "stream" => self.execute_stream(config, params, sinks, started).await,
            other => HttpResult::failure(
                format!("unknown mode '{other}': must be 'sync' or 'stream'"),
                started,
            ),
        }
    }

    async fn execute_sync(&self, config: &Value, params: &Value, started: Instant) -> HttpResult {
        let plan = match build_plan(config, params) {
            Ok(plan) => plan,
            Err(e) => return HttpResult::failure(e, started),
        };

        let mut last_error = String::new();
        for attempt in 0..plan.max_attempts {
            if attempt > 0 {
                let delay = if plan.exponential_backoff {
                    Duration::from_secs(1u64 << (attempt - 1))
                } else {
                    Duration::from_secs(1)
                };
                debug!(target: "kiwi_exec.http", attempt, ?delay, "retrying after backoff");
                tokio::time::sleep(delay).await;
            }

            match self.send(&plan).await {
                Ok(response) => {
                    let status = response.status();
                    let headers = header_map(&response);
                    let text = response.text().await.unwrap_or_default();
                    let body = serde_json::from_str::<Value>(&text)
                        .unwrap_or(Value::String(text));

                    let success = status.as_u16() >= 200 && status.as_u16() < 400;
                    return HttpResult {
                        success,
                        status_code: status.as_u16(),
                        body,
                        headers,
                        duration_ms: started.elapsed().as_millis() as u64,
                        error: if success {
                            None
                        } else {
                            Some(format!(
                                "HTTP {}: {}",
                                status.as_u16(),
                                status.canonical_reason().unwrap_or("error")
                            ))
                        },
                        stream_events_count: None,
                        stream_destinations: None,
                    };
                }
                Err(e) => {
                    // Only transport-level failures retry.
                    last_error = e.to_string();
                    warn!(target: "kiwi_exec.http", attempt, error = %last_error, "request failed");
                }
            }
        }

        HttpResult::failure(
            format!(
                "request failed after {} attempts: {last_error}",
                plan.max_attempts
            ),
            started,
        )
    }

    async fn execute_stream(
        &self,
        config: &Value,
        params: &Value,
        mut sinks: Vec<Box<dyn EventSink>>,
        started: Instant,
    ) -> HttpResult {
        let plan = match build_plan(config, params) {
            Ok(plan) => plan,
            Err(e) => {
                close_sinks(&mut sinks).await;
                return HttpResult::failure(e, started);
            }
        };

        let response = match self.send(&plan).await {
            Ok(r) => r,
            Err(e) => {
                close_sinks(&mut sinks).await;
                return HttpResult::failure(format!("stream request failed: {e}"), started);
            }
        };

        let status = response.status();
        let headers = header_map(&response);

        let mut event_count = 0u64;
        let mut stream = response.bytes_stream();
        let mut pending = String::new();
        let mut stream_error = None;

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    pending.push_str(&String::from_utf8_lossy(&bytes));
                    while let Some(newline) = pending.find('\n') {
                        let line: String = pending.drain(..=newline).collect();
                        if let Some(event) = parse_sse_line(line.trim_end()) {
                            event_count += 1;
                            for sink in sinks.iter_mut() {
                                if let Err(e) = sink.write(&event).await {
                                    warn!(target: "kiwi_exec.http", sink = sink.name(), error = %e, "sink write failed");
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    stream_error = Some(format!("stream interrupted: {e}"));
                    break;
                }
            }
        }
        // A final event without a trailing newline still counts.
        if let Some(event) = parse_sse_line(pending.trim_end()) {
            event_count += 1;
            for sink in sinks.iter_mut() {
                let _ = sink.write(&event).await;
            }
        }

        let mut body = Value::Null;
        let mut destinations = Vec::new();
        for sink in sinks.iter_mut() {
            if let Err(e) = sink.close().await {
                warn!(target: "kiwi_exec.http", sink = sink.name(), error = %e, "sink close failed");
            }
            destinations.push(sink.name().to_string());
            if body.is_null() {
                if let Some(events) = sink.take_events() {
                    body = Value::Array(events.into_iter().map(Value::String).collect());
                }
            }
        }

        let success = stream_error.is_none()
            && status.as_u16() >= 200
            && status.as_u16() < 400;
        let error = stream_error.or_else(|| {
            if success {
                None
            } else {
                Some(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("error")
                ))
            }
        });

        HttpResult {
            success,
            status_code: status.as_u16(),
            body,
            headers,
            duration_ms: started.elapsed().as_millis() as u64,
            error,
            stream_events_count: Some(event_count),
            stream_destinations: if destinations.is_empty() {
                None
            } else {
                Some(destinations)
            },
        }
    }

    async fn send(&self, plan: &RequestPlan) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self
            .client
            .request(plan.method.clone(), &plan.url)
            .timeout(plan.timeout);
        for (name, value) in &plan.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &plan.body {
            let writes_body = plan.method == reqwest::Method::POST
                || plan.method == reqwest::Method::PUT
                || plan.method == reqwest::Method::PATCH;
            if writes_body {
                request = request.json(body);
            }
        }
        request.send().await
    }
}

fn build_plan(config: &Value, params: &Value) -> Result<RequestPlan, String> {
    let env = process_env();
    let empty = Map::new();
    let param_map = params.as_object().unwrap_or(&empty);

    let url = config
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| "url is required in config".to_string())?;
    let url = substitute_env(url, &env);
    let url = template_str(&url, param_map).map_err(|e| e.to_string())?;

    let method_str = config
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_uppercase();
    let method: reqwest::Method = method_str
        .parse()
        .map_err(|_| format!("invalid HTTP method: {method_str}"))?;

    let mut headers: Vec<(String, String)> = Vec::new();
    if let Some(map) = config.get("headers").and_then(Value::as_object) {
        for (k, v) in map {
            let raw = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            headers.push((k.clone(), substitute_env(&raw, &env)));
        }
    }

    // Auth: bearer token or configurable api-key header.
    if let Some(auth) = config.get("auth").and_then(Value::as_object) {
        match auth.get("type").and_then(Value::as_str) {
            Some("bearer") => {
                let token = auth
                    .get("token")
                    .and_then(Value::as_str)
                    .map(|t| substitute_env(t, &env))
                    .unwrap_or_default();
                headers.push(("Authorization".to_string(), format!("Bearer {token}")));
            }
            Some("api_key") => {
                let key = auth
                    .get("key")
                    .and_then(Value::as_str)
                    .map(|k| substitute_env(k, &env))
                    .unwrap_or_default();
                let header = auth
                    .get("header")
                    .and_then(Value::as_str)
                    .unwrap_or("X-API-Key");
                headers.push((header.to_string(), key));
            }
            _ => {}
        }
    }

    let body = match config.get("body") {
        Some(body) if !body.is_null() => {
            Some(template_body(body, param_map).map_err(|e| e.to_string())?)
        }
        _ => None,
    };

    let timeout_s = config
        .get("timeout_s")
        .or_else(|| config.get("timeout"))
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_TIMEOUT_S);

    let retry = config.get("retry").and_then(Value::as_object);
    let max_attempts = retry
        .and_then(|r| r.get("max_attempts"))
        .and_then(Value::as_u64)
        .unwrap_or(1)
        .max(1) as u32;
    let exponential_backoff = retry
        .and_then(|r| r.get("backoff"))
        .and_then(Value::as_str)
        .map(|b| b == "exponential")
        .unwrap_or(true);

    Ok(RequestPlan {
        method,
        url,
        headers,
        body,
        timeout: Duration::from_secs(timeout_s),
        max_attempts,
        exponential_backoff,
    })
}

fn header_map(response: &reqwest::Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

/// Extract the payload of a `data:` line; empty payloads are skipped.
fn parse_sse_line(line: &str) -> Option<String> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload.to_string())
    }
}

async fn close_sinks(sinks: &mut [Box<dyn EventSink>]) {
    for sink in sinks.iter_mut() {
        let _ = sink.close().await;
    }
}
