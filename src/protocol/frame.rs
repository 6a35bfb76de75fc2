//! Incremental decoder for the run service's event-tagged text stream.
//!
//! Frames are separated by a blank line (`"\n\n"`). Inside a frame, an
//! `event:` line names the frame and every `data:` line contributes its
//! trimmed remainder to the payload. Other lines are ignored.
//!
//! Multiple `data:` lines are joined with no separator. A JSON payload spread
//! over several lines therefore loses its line breaks; the backend only ever
//! emits single-line payloads, and changing the join rule would change what
//! existing streams decode to.

/// Event name used when a frame carries no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

const FRAME_DELIMITER: &str = "\n\n";
const REPLACEMENT: char = '\u{FFFD}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: String,
}

/// Turns arbitrarily split byte chunks into complete frames.
///
/// Both the UTF-8 decoding state and the text of the unfinished frame survive
/// between calls to [`FrameDecoder::push`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    /// Decoded text not yet consumed as a frame.
    buffer: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the frames it completed, lazily.
    ///
    /// Frames not drained from the iterator stay buffered and are returned by
    /// the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.decode(chunk);
        Frames { decoder: self }
    }

    /// Pops the next complete frame, skipping frames without data.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let end = self.buffer.find(FRAME_DELIMITER)?;
            let rest = self.buffer.split_off(end + FRAME_DELIMITER.len());
            let raw = std::mem::replace(&mut self.buffer, rest);
            if let Some(frame) = parse_frame(&raw[..end]) {
                return Some(frame);
            }
        }
    }

    /// Text received but not yet terminated by a blank line.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Ends the stream. An unterminated trailing frame is never dispatched; its
    /// text is returned so the caller can log it.
    pub fn finish(mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.buffer.push(REPLACEMENT);
        }
        if self.buffer.trim().is_empty() {
            None
        } else {
            Some(self.buffer)
        }
    }

    fn decode(&mut self, chunk: &[u8]) {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(chunk);

        let mut start = 0;
        while start < input.len() {
            match std::str::from_utf8(&input[start..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    start = input.len();
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&input[start..valid_end]));
                    match err.error_len() {
                        Some(invalid) => {
                            self.buffer.push(REPLACEMENT);
                            start = valid_end + invalid;
                        }
                        // Sequence cut by the chunk boundary; wait for the rest.
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        input.drain(..start);
        self.pending = input;
    }
}

/// Iterator returned by [`FrameDecoder::push`].
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.decoder.next_frame()
    }
}

fn parse_frame(text: &str) -> Option<Frame> {
    let mut event = None;
    let mut data = String::new();
    for line in text.split('\n') {
        if let Some(name) = line.strip_prefix("event:") {
            event = Some(name.trim());
        }
        if let Some(value) = line.strip_prefix("data:") {
            data.push_str(value.trim());
        }
    }
    if data.is_empty() {
        return None;
    }
    Some(Frame {
        event: event.unwrap_or(DEFAULT_EVENT).to_string(),
        data,
    })
}
