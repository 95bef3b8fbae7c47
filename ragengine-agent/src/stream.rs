//! ABOUTME: Step Stream (C12)
//! ABOUTME: Ordered, backpressured Step channel with cooperative cancellation

use ragengine_core::error::{RagError, Result};
use ragengine_core::types::Step;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;

/// A cooperative cancellation signal shared between a query's driver and the
/// graph/speculative path running it. Checked between node transitions
/// rather than pre-empting in-flight work.
#[derive(Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// # Errors
    /// Returns `RagError::Cancelled` if cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RagError::cancelled("query cancelled"))
        } else {
            Ok(())
        }
    }
}

/// The sending half of a Step stream (C12). `emit` backpressures naturally:
/// it awaits until the receiver has room, bounding how far the producer can
/// run ahead of a slow consumer.
#[derive(Clone)]
pub struct StepEmitter {
    sender: mpsc::Sender<Step>,
}

impl StepEmitter {
    /// Send the next Step in order.
    ///
    /// # Errors
    /// Returns `RagError::Cancelled` if the receiving end has been dropped
    /// (the consumer walked away), signalling the producer to stop.
    pub async fn emit(&self, step: Step) -> Result<()> {
        self.sender
            .send(step)
            .await
            .map_err(|_| RagError::cancelled("step stream receiver dropped"))
    }
}

/// Create a bounded Step channel: a `StepEmitter` for the producer side and
/// a `Stream<Item = Step>` for the consumer side.
#[must_use]
pub fn step_stream(capacity: usize) -> (StepEmitter, impl Stream<Item = Step>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (StepEmitter { sender }, ReceiverStream::new(receiver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use ragengine_core::types::StepKind;

    #[tokio::test]
    async fn emitted_steps_arrive_in_order() {
        let (emitter, stream) = step_stream(4);
        emitter.emit(Step::new(StepKind::Memory, "one")).await.unwrap();
        emitter.emit(Step::new(StepKind::Action, "two")).await.unwrap();
        drop(emitter);

        let collected: Vec<Step> = stream.collect().await;
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].content, "one");
        assert_eq!(collected[1].content, "two");
    }

    #[tokio::test]
    async fn emit_fails_after_receiver_dropped() {
        let (emitter, stream) = step_stream(1);
        drop(stream);
        let err = emitter.emit(Step::new(StepKind::Info, "x")).await.unwrap_err();
        assert!(matches!(err, RagError::Cancelled { .. }));
    }

    #[test]
    fn cancellation_flag_reflects_cancel_call() {
        let flag = CancellationFlag::new();
        assert!(flag.check().is_ok());
        flag.cancel();
        assert!(flag.check().is_err());
    }
}
