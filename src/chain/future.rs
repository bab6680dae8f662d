//! Height-reached futures

use crate::storage::StoredHeader;
use futures::channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pub use futures::channel::oneshot::Canceled;

/// Resolves with the best-chain header at `height` once the chain reaches it.
///
/// Resolves with `Canceled` if the chain is dropped first.
#[derive(Debug)]
pub struct HeightFuture {
    height: u64,
    receiver: oneshot::Receiver<StoredHeader>,
    resolved: Option<StoredHeader>,
}

impl HeightFuture {
    pub(crate) fn pending(height: u64) -> (Self, oneshot::Sender<StoredHeader>) {
        let (sender, receiver) = oneshot::channel();
        let future = Self {
            height,
            receiver,
            resolved: None,
        };
        (future, sender)
    }

    pub(crate) fn ready(header: StoredHeader) -> Self {
        let (future, sender) = Self::pending(header.height());
        let _ = sender.send(header);
        future
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// The header, if the chain has reached the height
    pub fn try_get(&mut self) -> Option<StoredHeader> {
        if self.resolved.is_none() {
            if let Ok(Some(header)) = self.receiver.try_recv() {
                self.resolved = Some(header);
            }
        }
        self.resolved.clone()
    }

    pub fn is_done(&mut self) -> bool {
        self.try_get().is_some()
    }
}

impl Future for HeightFuture {
    type Output = Result<StoredHeader, Canceled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(header) = self.resolved.clone() {
            return Poll::Ready(Ok(header));
        }
        Pin::new(&mut self.receiver).poll(cx)
    }
}
