//! Streaming aggregation: adaptive text batching and tool-call reassembly.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};

use qprovider::{FunctionCall, ToolCall};
use tokio::sync::Mutex;

use crate::TokenSink;

fn lock_buffer(buffer: &StdMutex<String>) -> std::sync::MutexGuard<'_, String> {
    // The buffer lock only wraps appends and swaps; recover on poison so no
    // observed bytes are ever dropped.
    buffer
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Batches content deltas towards a single slow consumer without dropping
/// or reordering bytes.
///
/// The producer appends under a short buffer lock, then tries the delivery
/// mutex without blocking: on success a delivery task drains whatever has
/// accumulated, looping until the buffer is empty; on failure the in-flight
/// delivery will pick the bytes up on its next pass. The final flush awaits
/// the delivery mutex so it runs after any in-flight delivery.
pub(crate) struct DeltaBatcher {
    sink: TokenSink,
    pending: Arc<StdMutex<String>>,
    delivery: Arc<Mutex<()>>,
    total: String,
}

impl DeltaBatcher {
    pub fn new(sink: TokenSink) -> Self {
        Self {
            sink,
            pending: Arc::new(StdMutex::new(String::new())),
            delivery: Arc::new(Mutex::new(())),
            total: String::new(),
        }
    }

    pub fn push(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }

        self.total.push_str(delta);
        lock_buffer(&self.pending).push_str(delta);

        let Ok(guard) = Arc::clone(&self.delivery).try_lock_owned() else {
            return;
        };

        let pending = Arc::clone(&self.pending);
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            let _guard = guard;
            loop {
                let chunk = std::mem::take(&mut *lock_buffer(&pending));
                if chunk.is_empty() {
                    break;
                }
                (sink)(chunk).await;
            }
        });
    }

    /// Delivers any bytes an in-flight delivery has not picked up and returns
    /// the full accumulated text. Also used on error paths so observed bytes
    /// reach the consumer before the error surfaces.
    pub async fn finish(self) -> String {
        let _guard = self.delivery.lock_owned().await;
        let chunk = std::mem::take(&mut *lock_buffer(&self.pending));
        if !chunk.is_empty() {
            (self.sink)(chunk).await;
        }

        self.total
    }
}

/// Reassembles streamed tool-call fragments keyed by positional index.
#[derive(Debug, Default)]
pub(crate) struct ToolCallAssembler {
    fragments: BTreeMap<u32, ToolCallBuilder>,
}

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    kind: String,
    name: String,
    arguments: String,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, fragment: &ToolCall) {
        let entry = self.fragments.entry(fragment.index).or_default();

        if !fragment.id.is_empty() {
            entry.id = fragment.id.clone();
        }
        if !fragment.kind.is_empty() {
            entry.kind = fragment.kind.clone();
        }
        if !fragment.function.name.is_empty() {
            entry.name = fragment.function.name.clone();
        }
        entry.arguments.push_str(&fragment.function.arguments);
    }

    /// Finalized calls in ascending index order, with `kind` defaulted.
    pub fn finish(self) -> Vec<ToolCall> {
        self.fragments
            .into_iter()
            .map(|(index, builder)| ToolCall {
                index,
                id: builder.id,
                kind: if builder.kind.is_empty() {
                    "function".to_string()
                } else {
                    builder.kind
                },
                function: FunctionCall {
                    name: builder.name,
                    arguments: builder.arguments,
                },
            })
            .collect()
    }
}
