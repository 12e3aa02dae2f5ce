//! Incremental decoding of streamed chat responses.
//!
//! Providers stream line-framed events (`data: {...}\n`), but the transport
//! hands us arbitrary byte chunks: a read may end mid code point or mid
//! line. [`StreamDecoder`] carries the undecodable tail bytes and the
//! unterminated line across reads, so decoding N arbitrary chunks delivers
//! exactly the same delta sequence as decoding the whole body at once.
//!
//! The decoder must only be fed after the caller has verified a 2xx status;
//! error bodies are not line-framed.

use super::shape;

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// Stateful line-frame decoder for one streaming call.
pub struct StreamDecoder {
    /// Bytes from a code point split across read boundaries.
    utf8_carry: Vec<u8>,
    /// Decoded text of the trailing unterminated line.
    line_carry: String,
    /// All delta text seen so far, in arrival order.
    accumulated: String,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            utf8_carry: Vec::new(),
            line_carry: String::new(),
            accumulated: String::new(),
        }
    }

    /// Feed one read's worth of bytes. Every completed frame with non-empty
    /// delta text is appended to the accumulated string and handed to
    /// `sink(delta, accumulated)` synchronously, in arrival order.
    pub fn push(&mut self, bytes: &[u8], sink: &mut dyn FnMut(&str, &str)) {
        let text = self.decode_utf8(bytes);
        self.line_carry.push_str(&text);

        // Split off completed lines, keep the unterminated tail.
        let mut rest = std::mem::take(&mut self.line_carry);
        while let Some(pos) = rest.find('\n') {
            let line: String = rest.drain(..=pos).collect();
            let line = line.trim();

            let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
                // Keep-alive, comment or blank line.
                continue;
            };

            if payload.trim() == DONE_MARKER {
                // Skipped like a keep-alive: the marker carries no frame,
                // and the outer read loop decides when the stream is over
                // (some providers never send it). Anything less would make
                // delivery depend on where read boundaries fall.
                continue;
            }

            match serde_json::from_str::<serde_json::Value>(payload) {
                Ok(frame) => {
                    if let Some(delta) = shape::delta_text(&frame) {
                        self.accumulated.push_str(delta);
                        sink(delta, &self.accumulated);
                    }
                }
                Err(err) => {
                    // One malformed frame must never abort the stream.
                    tracing::debug!(target: "llm", error = %err, "skipping malformed stream frame");
                }
            }
        }
        self.line_carry = rest;
    }

    /// Text accumulated so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// End of stream: a buffered partial line is unusable and is discarded.
    /// Returns the accumulated text.
    pub fn finish(self) -> String {
        self.accumulated
    }

    /// Decode as much of the carried + new bytes as form valid UTF-8,
    /// retaining a trailing incomplete code point for the next read.
    fn decode_utf8(&mut self, bytes: &[u8]) -> String {
        self.utf8_carry.extend_from_slice(bytes);

        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.utf8_carry) {
                Ok(text) => {
                    out.push_str(text);
                    self.utf8_carry.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.utf8_carry[..valid]));
                    match err.error_len() {
                        // Truly invalid bytes: replace and keep going.
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.utf8_carry.drain(..valid + len);
                        }
                        // Incomplete trailing code point: carry it over.
                        None => {
                            self.utf8_carry.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_pieces(pieces: &[&[u8]]) -> (Vec<String>, String) {
        let mut decoder = StreamDecoder::new();
        let mut deltas = Vec::new();
        for piece in pieces {
            decoder.push(piece, &mut |delta, _acc| deltas.push(delta.to_string()));
        }
        let final_text = decoder.finish();
        (deltas, final_text)
    }

    fn sse(deltas: &[&str]) -> String {
        let mut body = String::new();
        for delta in deltas {
            body.push_str(&format!(
                "data: {}\n",
                serde_json::json!({"message": {"content": delta}})
            ));
        }
        body.push_str("data: [DONE]\n");
        body
    }

    #[test]
    fn test_single_chunk_decoding() {
        let body = sse(&["Hello", " world"]);
        let (deltas, text) = decode_pieces(&[body.as_bytes()]);
        assert_eq!(deltas, vec!["Hello", " world"]);
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn test_arbitrary_splits_match_single_chunk() {
        let body = sse(&["xin", " chào", " thế giới", "!"]);
        let bytes = body.as_bytes();
        let (expected, expected_text) = decode_pieces(&[bytes]);

        // Every split point, including mid code point and mid line.
        for split in 1..bytes.len() {
            let (deltas, text) = decode_pieces(&[&bytes[..split], &bytes[split..]]);
            assert_eq!(deltas, expected, "split at byte {split}");
            assert_eq!(text, expected_text, "split at byte {split}");
        }

        // One-byte-at-a-time.
        let pieces: Vec<&[u8]> = bytes.chunks(1).collect();
        let (deltas, text) = decode_pieces(&pieces);
        assert_eq!(deltas, expected);
        assert_eq!(text, expected_text);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let body = ": keep-alive\n\nevent: ping\ndata: {\"message\":{\"content\":\"ok\"}}\n";
        let (deltas, text) = decode_pieces(&[body.as_bytes()]);
        assert_eq!(deltas, vec!["ok"]);
        assert_eq!(text, "ok");
    }

    #[test]
    fn test_malformed_frame_is_swallowed() {
        let body = "data: {broken json\ndata: {\"message\":{\"content\":\"still here\"}}\n";
        let (deltas, _) = decode_pieces(&[body.as_bytes()]);
        assert_eq!(deltas, vec!["still here"]);
    }

    #[test]
    fn test_done_marker_is_skipped_like_a_keep_alive() {
        let mut decoder = StreamDecoder::new();
        let mut deltas = Vec::new();
        let mut sink = |delta: &str, _: &str| deltas.push(delta.to_string());

        decoder.push(
            b"data: {\"message\":{\"content\":\"a\"}}\ndata: [DONE]\ndata: {\"message\":{\"content\":\"b\"}}\n",
            &mut sink,
        );
        decoder.push(b"data: {\"message\":{\"content\":\"c\"}}\n", &mut sink);
        assert_eq!(deltas, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_splits_around_done_marker_change_nothing() {
        let body = "data: {\"message\":{\"content\":\"chào \"}}\ndata: [DONE]\ndata: {\"message\":{\"content\":\"bạn\"}}\n";
        let bytes = body.as_bytes();
        let (expected, expected_text) = decode_pieces(&[bytes]);
        assert_eq!(expected, vec!["chào ", "bạn"]);

        for split in 1..bytes.len() {
            let (deltas, text) = decode_pieces(&[&bytes[..split], &bytes[split..]]);
            assert_eq!(deltas, expected, "split at byte {split}");
            assert_eq!(text, expected_text, "split at byte {split}");
        }
    }

    #[test]
    fn test_partial_trailing_line_discarded_on_finish() {
        let body = "data: {\"message\":{\"content\":\"whole\"}}\ndata: {\"message\":{\"content\":\"tr";
        let (deltas, text) = decode_pieces(&[body.as_bytes()]);
        assert_eq!(deltas, vec!["whole"]);
        assert_eq!(text, "whole");
    }

    #[test]
    fn test_code_point_split_across_reads() {
        // "chào" contains a multi-byte 'à'; split inside it.
        let body = sse(&["chào"]);
        let bytes = body.as_bytes();
        let split = body.find('\u{e0}').unwrap() + 1; // one byte into 'à'
        let (deltas, _) = decode_pieces(&[&bytes[..split], &bytes[split..]]);
        assert_eq!(deltas, vec!["chào"]);
    }

    #[test]
    fn test_sink_receives_running_accumulation_in_order() {
        let body = sse(&["a", "b", "c"]);
        let mut decoder = StreamDecoder::new();
        let mut seen = Vec::new();
        decoder.push(body.as_bytes(), &mut |delta, acc| {
            seen.push((delta.to_string(), acc.to_string()));
        });
        assert_eq!(
            seen,
            vec![
                ("a".into(), "a".into()),
                ("b".into(), "ab".into()),
                ("c".into(), "abc".into()),
            ]
        );
    }

    #[test]
    fn test_openai_delta_shape() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n";
        let (deltas, _) = decode_pieces(&[body.as_bytes()]);
        assert_eq!(deltas, vec!["hi"]);
    }
}
