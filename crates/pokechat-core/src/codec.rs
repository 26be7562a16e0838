//! Wire framing for [`OutboundEvent`]s.
//!
//! Each event becomes one server-push record:
//!
//! ```text
//! event: <tag>
//! data: <json>
//!
//! ```
//!
//! [`FrameDecoder`] is the inverse. It buffers raw bytes so a record (or a
//! multibyte character) split across reads is reassembled, and it reports a
//! malformed record as an `Err` item without losing its place in the stream.

use crate::events::{OutboundEvent, EVENT_TYPES};

const DELIMITER: &[u8] = b"\n\n";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("record has no event tag")]
    MissingTag,
    #[error("record has no data payload")]
    MissingData,
    #[error("unknown event tag: {0}")]
    UnknownTag(String),
    #[error("unparseable payload for {tag}: {reason}")]
    Payload { tag: String, reason: String },
    #[error("tag {tag} does not match payload type {payload}")]
    TagMismatch { tag: String, payload: String },
    #[error("record is not valid UTF-8")]
    Utf8,
}

/// Frame one event as a complete record, delimiter included.
pub fn encode(event: &OutboundEvent) -> Result<String, CodecError> {
    let data = serde_json::to_string(event)?;
    Ok(format!("event: {}\ndata: {}\n\n", event.event_type(), data))
}

/// Incremental decoder for a stream of framed records.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every record it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<OutboundEvent, CodecError>> {
        // CR never appears unescaped inside a JSON payload, so dropping it
        // normalizes CRLF framing without touching data.
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut out = Vec::new();
        while let Some(idx) = find_delimiter(&self.buf) {
            let record: Vec<u8> = self.buf.drain(..idx + DELIMITER.len()).collect();
            if let Some(result) = decode_record(&record[..idx]) {
                out.push(result);
            }
        }
        out
    }

    /// Flush a trailing record that was never delimited.
    pub fn finish(&mut self) -> Option<Result<OutboundEvent, CodecError>> {
        let rest = std::mem::take(&mut self.buf);
        decode_record(&rest)
    }

    /// Bytes held back waiting for a delimiter.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(DELIMITER.len()).position(|w| w == DELIMITER)
}

/// Decode one record body. Returns `None` for records carrying nothing but
/// whitespace or comments.
fn decode_record(raw: &[u8]) -> Option<Result<OutboundEvent, CodecError>> {
    let text = match std::str::from_utf8(raw) {
        Ok(t) => t,
        Err(_) => return Some(Err(CodecError::Utf8)),
    };

    let mut tag: Option<&str> = None;
    let mut data: Vec<&str> = Vec::new();
    let mut saw_field = false;

    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        saw_field = true;
        if let Some(value) = line.strip_prefix("event:") {
            tag = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.trim());
        }
    }

    if !saw_field {
        return None;
    }
    Some(parse_fields(tag, &data))
}

fn parse_fields(tag: Option<&str>, data: &[&str]) -> Result<OutboundEvent, CodecError> {
    let tag = match tag {
        Some(t) if !t.is_empty() => t,
        _ => return Err(CodecError::MissingTag),
    };
    if !EVENT_TYPES.contains(&tag) {
        return Err(CodecError::UnknownTag(tag.to_string()));
    }
    if data.is_empty() {
        return Err(CodecError::MissingData);
    }

    let payload = data.join("\n");
    let event: OutboundEvent = serde_json::from_str(&payload).map_err(|e| CodecError::Payload {
        tag: tag.to_string(),
        reason: e.to_string(),
    })?;

    if event.event_type() != tag {
        return Err(CodecError::TagMismatch {
            tag: tag.to_string(),
            payload: event.event_type().to_string(),
        });
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ToolCallId;
    use crate::tools::ToolOutcome;
    use serde_json::json;

    fn ok_events(results: Vec<Result<OutboundEvent, CodecError>>) -> Vec<OutboundEvent> {
        results.into_iter().filter_map(Result::ok).collect()
    }

    #[test]
    fn encode_framing() {
        let framed = encode(&OutboundEvent::text("Hi")).unwrap();
        assert_eq!(framed, "event: text\ndata: {\"type\":\"text\",\"delta\":\"Hi\"}\n\n");
        let done = encode(&OutboundEvent::Done).unwrap();
        assert_eq!(done, "event: done\ndata: {\"type\":\"done\"}\n\n");
    }

    #[test]
    fn decodes_every_variant() {
        let events = vec![
            OutboundEvent::text("Pika"),
            OutboundEvent::tool_call("lookup", json!({"pokemon": "pikachu"}), ToolCallId::from_raw("toolu_a")),
            OutboundEvent::tool_result(
                "lookup",
                ToolOutcome::success(json!({"id": 25})),
                ToolCallId::from_raw("toolu_a"),
            ),
            OutboundEvent::error("upstream failed"),
            OutboundEvent::Done,
        ];
        let wire: String = events.iter().map(|e| encode(e).unwrap()).collect();

        let mut decoder = FrameDecoder::new();
        let decoded = ok_events(decoder.push(wire.as_bytes()));
        assert_eq!(decoded, events);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn record_split_across_reads() {
        let wire = encode(&OutboundEvent::text("split me")).unwrap();
        let (a, b) = wire.as_bytes().split_at(11);

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(a).is_empty());
        let decoded = ok_events(decoder.push(b));
        assert_eq!(decoded, vec![OutboundEvent::text("split me")]);
    }

    #[test]
    fn byte_at_a_time() {
        let wire: String = [OutboundEvent::text("a"), OutboundEvent::Done]
            .iter()
            .map(|e| encode(e).unwrap())
            .collect();
        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        for b in wire.as_bytes() {
            decoded.extend(ok_events(decoder.push(std::slice::from_ref(b))));
        }
        assert_eq!(decoded, vec![OutboundEvent::text("a"), OutboundEvent::Done]);
    }

    #[test]
    fn multibyte_character_split_mid_sequence() {
        let wire = encode(&OutboundEvent::text("Pokémon ⚡")).unwrap();
        let bytes = wire.as_bytes();
        let cut = wire.find('é').unwrap() + 1;

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&bytes[..cut]).is_empty());
        let decoded = ok_events(decoder.push(&bytes[cut..]));
        assert_eq!(decoded, vec![OutboundEvent::text("Pokémon ⚡")]);
    }

    #[test]
    fn malformed_record_does_not_stop_stream() {
        let mut wire = encode(&OutboundEvent::text("before")).unwrap();
        wire.push_str("event: text\ndata: {not json\n\n");
        wire.push_str(&encode(&OutboundEvent::text("after")).unwrap());

        let mut decoder = FrameDecoder::new();
        let results = decoder.push(wire.as_bytes());
        assert_eq!(results.len(), 3);
        assert!(matches!(results[1], Err(CodecError::Payload { .. })));
        assert_eq!(
            ok_events(results),
            vec![OutboundEvent::text("before"), OutboundEvent::text("after")]
        );
    }

    #[test]
    fn rejects_bad_tags() {
        let mut decoder = FrameDecoder::new();
        let results = decoder.push(b"event: bogus\ndata: {\"type\":\"done\"}\n\n");
        assert!(matches!(&results[0], Err(CodecError::UnknownTag(t)) if t == "bogus"));

        let results = decoder.push(b"event: done\ndata: {\"type\":\"text\",\"delta\":\"x\"}\n\n");
        assert!(matches!(results[0], Err(CodecError::TagMismatch { .. })));

        let results = decoder.push(b"data: {\"type\":\"done\"}\n\n");
        assert!(matches!(results[0], Err(CodecError::MissingTag)));

        let results = decoder.push(b"event: done\n\n");
        assert!(matches!(results[0], Err(CodecError::MissingData)));
    }

    #[test]
    fn comments_and_keepalives_are_skipped() {
        let mut decoder = FrameDecoder::new();
        let mut wire = b": keep-alive\n\n".to_vec();
        wire.extend_from_slice(encode(&OutboundEvent::Done).unwrap().as_bytes());
        let results = decoder.push(&wire);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), &OutboundEvent::Done);
    }

    #[test]
    fn crlf_framing_is_accepted() {
        let mut decoder = FrameDecoder::new();
        let results = decoder.push(b"event: text\r\ndata: {\"type\":\"text\",\"delta\":\"hi\"}\r\n\r\n");
        assert_eq!(ok_events(results), vec![OutboundEvent::text("hi")]);
    }

    #[test]
    fn finish_flushes_trailing_record() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"event: done\ndata: {\"type\":\"done\"}").is_empty());
        assert_eq!(decoder.finish().unwrap().unwrap(), OutboundEvent::Done);
        assert!(decoder.finish().is_none());
    }
}
