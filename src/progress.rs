use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use crate::types::ProgressSender;

pin_project! {
    /// Byte-counting wrapper around a request body stream. Reports the
    /// cumulative count after every chunk, so percentages derived from it
    /// never move backwards.
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        sender: ProgressSender,
        bytes_sent: u64,
        bytes_total: u64,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, sender: ProgressSender, bytes_total: u64) -> Self {
        Self {
            inner,
            sender,
            bytes_sent: 0,
            bytes_total,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    *this.bytes_sent += chunk.len() as u64;
                    this.sender.send(*this.bytes_sent, *this.bytes_total);
                }

                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}
