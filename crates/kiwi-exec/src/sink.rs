//! Streaming event sinks.
//!
//! Stream-mode HTTP fans every event out to a list of sinks. Sinks are
//! pre-instantiated by the outer executor layer and enter the primitive
//! through the reserved `__sinks` channel; the core ships one built-in,
//! `ReturnSink`, which buffers events for inclusion in the response body.
//! Other sinks (file, websocket, null) are data-driven tools owned by the
//! outer layer and only need to satisfy the `EventSink` contract.

use async_trait::async_trait;

/// Reserved parameter key for sink hand-off. Typed sinks are passed as an
/// argument in this crate; the key is stripped from params if a caller left
/// it there.
pub const SINKS_PARAM: &str = "__sinks";

/// A consumer of streaming events.
#[async_trait]
pub trait EventSink: Send {
    /// Consume one event payload (the text after the `data:` prefix).
    async fn write(&mut self, event: &str) -> anyhow::Result<()>;

    /// Flush and release resources. Called once after the stream ends.
    async fn close(&mut self) -> anyhow::Result<()>;

    /// Sink name for result metadata.
    fn name(&self) -> &'static str;

    /// Buffered events, for sinks that return them in the response body.
    /// The default sink discards nothing to return.
    fn take_events(&mut self) -> Option<Vec<String>> {
        None
    }
}

/// Buffers up to `max_buffer_size` events and returns them as the response
/// body. Events past the cap are counted by the stream but dropped here.
pub struct ReturnSink {
    buffer: Vec<String>,
    max_buffer_size: usize,
}

impl ReturnSink {
    pub fn new(max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_buffer_size,
        }
    }
}

impl Default for ReturnSink {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl EventSink for ReturnSink {
    async fn write(&mut self, event: &str) -> anyhow::Result<()> {
        if self.buffer.len() < self.max_buffer_size {
            self.buffer.push(event.to_string());
        }
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ReturnSink"
    }

    fn take_events(&mut self) -> Option<Vec<String>> {
        Some(std::mem::take(&mut self.buffer))
    }
}
