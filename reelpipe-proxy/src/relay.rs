//! Bounded-chunk relay of upstream bodies.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

/// Byte stream of an in-flight upstream response.
pub type UpstreamByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// Re-chunks an upstream byte stream so no item exceeds `chunk_size`.
///
/// Oversize network reads are split zero-copy, undersize ones pass through
/// as-is, so peak memory stays bounded by a few reads regardless of media
/// length. The first upstream error ends the stream; nothing is emitted
/// after it.
pub struct ChunkedRelay<S> {
    inner: S,
    pending: Bytes,
    chunk_size: usize,
    done: bool,
}

impl<S> ChunkedRelay<S> {
    pub fn new(inner: S, chunk_size: usize) -> Self {
        Self {
            inner,
            pending: Bytes::new(),
            chunk_size: chunk_size.max(1),
            done: false,
        }
    }
}

impl<S, E> Stream for ChunkedRelay<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Item = Result<Bytes, io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.as_mut().get_mut();
        loop {
            if !this.pending.is_empty() {
                let take = this.pending.len().min(this.chunk_size);
                return Poll::Ready(Some(Ok(this.pending.split_to(take))));
            }
            if this.done {
                return Poll::Ready(None);
            }
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    if !bytes.is_empty() {
                        this.pending = bytes;
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(io::Error::other(e))));
                }
                Poll::Ready(None) => this.done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Wrap a streaming upstream response for relaying to the consumer.
#[must_use]
pub fn relay_stream(
    response: reqwest::Response,
    chunk_size: usize,
) -> ChunkedRelay<UpstreamByteStream> {
    ChunkedRelay::new(response.bytes_stream().boxed(), chunk_size)
}
