//! Streamed replies.

use futures::Stream;
use parley_core::MessageId;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// An event of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Newly produced text.
    Data(String),
    /// The reply is complete and persisted.
    End {
        message_id: MessageId,
        content: String,
    },
    /// The reply failed; nothing was persisted.
    Error(String),
}

/// Handle to a reply being streamed.
///
/// Dropping the handle cancels the reply.
#[derive(Debug)]
pub struct StreamHandle {
    rx: mpsc::Receiver<StreamEvent>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub(crate) fn new(rx: mpsc::Receiver<StreamEvent>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }

    /// Waits for the next event. `None` once the reply has ended.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Stops producing the reply. Nothing is persisted unless the reply
    /// already ended.
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Stream for StreamHandle {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
