//! Token batching
//!
//! Fragments from the decision function arrive one token at a time. The
//! transport sends them in larger units: a batch is flushed as soon as the
//! buffer holds more fragments than the traffic class threshold, and the
//! remainder goes out when the stream ends, followed by [`Batch::End`].

use futures::{Stream, StreamExt};

/// One delivery unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Batch {
    Chunk(String),
    End,
}

/// Fragment buffer with a count threshold
#[derive(Debug)]
pub struct TokenBatcher {
    threshold: usize,
    buffer: Vec<String>,
}

impl TokenBatcher {
    /// Thresholds below one are treated as one
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            buffer: Vec::new(),
        }
    }

    /// Buffer a fragment, returning a batch once the count exceeds the threshold
    pub fn push(&mut self, fragment: String) -> Option<String> {
        self.buffer.push(fragment);
        (self.buffer.len() > self.threshold).then(|| self.take())
    }

    /// Flush whatever is left
    pub fn finish(&mut self) -> Option<String> {
        (!self.buffer.is_empty()).then(|| self.take())
    }

    fn take(&mut self) -> String {
        std::mem::take(&mut self.buffer).concat()
    }
}

/// Batch a finite fragment stream. Always ends with exactly one [`Batch::End`].
pub fn batch_stream<S>(fragments: S, threshold: usize) -> impl Stream<Item = Batch>
where
    S: Stream<Item = String>,
{
    let fragments = Box::pin(fragments.fuse());
    futures::stream::unfold(
        Some((fragments, TokenBatcher::new(threshold))),
        |state| async move {
            let (mut fragments, mut batcher) = state?;
            while let Some(fragment) = fragments.next().await {
                if let Some(batch) = batcher.push(fragment) {
                    return Some((Batch::Chunk(batch), Some((fragments, batcher))));
                }
            }
            match batcher.finish() {
                Some(rest) => Some((Batch::Chunk(rest), Some((fragments, batcher)))),
                None => Some((Batch::End, None)),
            }
        },
    )
}
