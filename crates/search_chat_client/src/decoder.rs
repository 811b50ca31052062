//! Frame decoder for the streamed search response. Turns raw transport chunks
//! into blank-line-delimited frames (`event:` + `data:` lines), tolerating
//! arbitrary fragmentation across chunks.

use tracing::warn;

/// One decoded wire frame. The kind is the raw name from the `event:` line;
/// mapping to a known event is the dispatcher's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: String,
    pub data: String,
}

/// Stateful decoder with a carry-over buffer. One instance per stream; a
/// frame may span many chunks and one chunk may hold many frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transport chunk and drain every complete frame it unlocked.
    /// Incomplete trailing bytes stay buffered for the next call. Frames with
    /// a missing or unparsable event/data line are dropped, never an error.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = find_delimiter(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..pos + 2).take(pos).collect();
            match std::str::from_utf8(&raw) {
                Ok(text) => {
                    if let Some(frame) = parse_frame(text) {
                        frames.push(frame);
                    } else {
                        warn!(len = raw.len(), "dropping frame without event/data lines");
                    }
                }
                Err(error) => {
                    warn!(%error, "dropping frame with invalid UTF-8");
                }
            }
        }
        frames
    }

    /// Bytes still waiting for a delimiter. Discarded at end of stream; the
    /// backend always terminates frames with a blank line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Position of the next `\n\n` frame delimiter, if a full frame is buffered.
fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Parse one frame body. The event name is trimmed; the data payload is
/// everything after `data: `, untrimmed, so token whitespace survives.
/// Multiple data lines are joined with a newline.
fn parse_frame(text: &str) -> Option<Frame> {
    let mut kind: Option<&str> = None;
    let mut data: Option<String> = None;

    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if let Some(name) = line.strip_prefix("event: ") {
            kind = Some(name.trim());
        } else if let Some(payload) = line.strip_prefix("data: ") {
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(payload);
                }
                None => data = Some(payload.to_string()),
            }
        }
    }

    match (kind, data) {
        (Some(kind), Some(data)) => Some(Frame {
            kind: kind.to_string(),
            data,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_in_chunks(input: &str, chunk_len: usize) -> Vec<Frame> {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in input.as_bytes().chunks(chunk_len) {
            frames.extend(decoder.push(chunk));
        }
        frames
    }

    const STREAM: &str = "event: status\ndata: Searching...\n\n\
                          event: token\ndata: Hel\n\n\
                          event: token\ndata: lo\n\n\
                          event: done\ndata: {\"totalTimeMs\":42}\n\n";

    #[test]
    fn decodes_single_chunk() {
        let frames = decode_in_chunks(STREAM, STREAM.len());
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].kind, "status");
        assert_eq!(frames[0].data, "Searching...");
        assert_eq!(frames[1].data, "Hel");
        assert_eq!(frames[2].data, "lo");
        assert_eq!(frames[3].kind, "done");
        assert_eq!(frames[3].data, "{\"totalTimeMs\":42}");
    }

    #[test]
    fn fragmentation_does_not_change_decoded_frames() {
        let whole = decode_in_chunks(STREAM, STREAM.len());
        for chunk_len in [1, 2, 3, 5, 7, 11, 64] {
            assert_eq!(
                decode_in_chunks(STREAM, chunk_len),
                whole,
                "chunk_len {} changed the frame sequence",
                chunk_len
            );
        }
    }

    #[test]
    fn one_chunk_may_hold_many_frames() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"event: token\ndata: a\n\nevent: token\ndata: b\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "a");
        assert_eq!(frames[1].data, "b");
    }

    #[test]
    fn payload_whitespace_is_preserved() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"event: token\ndata:  spaced out \n\n");
        assert_eq!(frames[0].data, " spaced out ");
    }

    #[test]
    fn empty_payload_is_kept() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"event: token\ndata: \n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "");
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let input = "event: token\ndata: héllo\n\n";
        let bytes = input.as_bytes();
        // Split inside the two-byte 'é'.
        let split = input.find('é').unwrap() + 1;
        let mut decoder = FrameDecoder::new();
        let mut frames = decoder.push(&bytes[..split]);
        frames.extend(decoder.push(&bytes[split..]));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "héllo");
    }

    #[test]
    fn frame_missing_event_line_is_dropped() {
        let mut decoder = FrameDecoder::new();
        let frames =
            decoder.push(b"data: orphan\n\nevent: token\ndata: kept\n\nevent: token\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "kept");
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"event: status\r\ndata: ok\r\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, "status");
        assert_eq!(frames[0].data, "ok");
    }

    #[test]
    fn incomplete_frame_stays_buffered() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"event: token\ndata: partial").is_empty());
        assert!(decoder.pending() > 0);
        let frames = decoder.push(b"\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "partial");
    }

    #[test]
    fn event_name_is_trimmed() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"event: token \ndata: x\n\n");
        assert_eq!(frames[0].kind, "token");
    }
}
