//! Text handling for device output.
//!
//! Serial data arrives in arbitrary chunks, so a multi-byte UTF-8 character
//! can be split between two reads. [`Utf8StreamDecoder`] keeps the incomplete
//! suffix until the rest arrives instead of turning it into garbage.

/// Incremental UTF-8 decoder for chunked byte streams.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, holding back an incomplete trailing sequence.
    ///
    /// Each maximal invalid byte run becomes one `\u{fffd}`.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut held = 0;
        let mut chunks = self.pending.utf8_chunks().peekable();
        while let Some(piece) = chunks.next() {
            out.push_str(piece.valid());
            let invalid = piece.invalid();
            if invalid.is_empty() {
                continue;
            }
            if chunks.peek().is_none() && is_incomplete(invalid) {
                held = invalid.len();
            } else {
                out.push('\u{fffd}');
            }
        }

        let consumed = self.pending.len() - held;
        self.pending.drain(..consumed);
        out
    }

    /// Flush whatever is still buffered; an incomplete sequence becomes `\u{fffd}`.
    pub fn finish(&mut self) -> String {
        let mut out = self.decode(&[]);
        if !self.pending.is_empty() {
            out.push('\u{fffd}');
            self.pending.clear();
        }
        out
    }

    /// Number of bytes waiting for the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// A truncated but so far well-formed sequence at the end of the buffer.
fn is_incomplete(bytes: &[u8]) -> bool {
    matches!(std::str::from_utf8(bytes), Err(err) if err.error_len().is_none())
}

/// Make raw device output safe to print on one log line.
///
/// Printable ASCII, `\r`, `\n` and `\t` pass through; everything else becomes `�`.
pub fn sanitize_for_log(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '\r' | '\n' | '\t' | ' '..='~' => ch,
            _ => '\u{fffd}',
        })
        .collect()
}
