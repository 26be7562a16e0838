use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use tracing::debug;

use pokechat_core::codec::{CodecError, FrameDecoder};
use pokechat_core::events::OutboundEvent;

pin_project! {
    /// Adapts a byte stream into decoded events. Malformed records are
    /// skipped; transport errors are passed through and end the stream.
    pub struct FrameStream<S> {
        #[pin]
        inner: S,
        decoder: FrameDecoder,
        ready: VecDeque<OutboundEvent>,
        skipped: usize,
        exhausted: bool,
    }
}

impl<S> FrameStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
            skipped: 0,
            exhausted: false,
        }
    }

    /// Records dropped because they could not be decoded.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

fn accept(ready: &mut VecDeque<OutboundEvent>, skipped: &mut usize, record: Result<OutboundEvent, CodecError>) {
    match record {
        Ok(event) => ready.push_back(event),
        Err(e) => {
            debug!(error = %e, "skipping malformed record");
            *skipped += 1;
        }
    }
}

impl<S, B, E> Stream for FrameStream<S>
where
    S: Stream<Item = Result<B, E>>,
    B: Into<Bytes>,
{
    type Item = Result<OutboundEvent, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(event) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if *this.exhausted {
                return Poll::Ready(None);
            }
            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    let chunk: Bytes = chunk.into();
                    for record in this.decoder.push(&chunk) {
                        accept(this.ready, this.skipped, record);
                    }
                }
                Some(Err(e)) => {
                    *this.exhausted = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    *this.exhausted = true;
                    if let Some(record) = this.decoder.finish() {
                        accept(this.ready, this.skipped, record);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn decodes_across_chunk_boundaries() {
        let input = chunks(&[
            "event: text\ndata: {\"type\":\"text\",",
            "\"delta\":\"Hi\"}\n",
            "\nevent: done\ndata: {\"type\":\"done\"}\n\n",
        ]);
        let events: Vec<_> = FrameStream::new(input).map(|r| r.unwrap()).collect().await;
        assert_eq!(events, vec![OutboundEvent::text("Hi"), OutboundEvent::Done]);
    }

    #[tokio::test]
    async fn malformed_records_are_skipped() {
        let input = chunks(&[
            "event: text\ndata: {broken\n\n",
            "event: mystery\ndata: {\"type\":\"mystery\"}\n\n",
            "event: text\ndata: {\"type\":\"text\",\"delta\":\"ok\"}\n\n",
        ]);
        let mut frames = FrameStream::new(input);
        let mut events = Vec::new();
        while let Some(event) = frames.next().await {
            events.push(event.unwrap());
        }
        assert_eq!(events, vec![OutboundEvent::text("ok")]);
        assert_eq!(frames.skipped(), 2);
    }

    #[tokio::test]
    async fn trailing_record_is_decoded_at_end() {
        let input = chunks(&["event: done\ndata: {\"type\":\"done\"}"]);
        let events: Vec<_> = FrameStream::new(input).map(|r| r.unwrap()).collect().await;
        assert_eq!(events, vec![OutboundEvent::Done]);
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let input = stream::iter(vec![
            Ok(Bytes::from_static(b"event: text\ndata: {\"type\":\"text\",\"delta\":\"a\"}\n\n")),
            Err(std::io::Error::other("reset")),
            Ok(Bytes::from_static(b"event: done\ndata: {\"type\":\"done\"}\n\n")),
        ]);
        let results: Vec<_> = FrameStream::new(input).collect().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
