//! Incremental decoding of analyzer output
//!
//! Bytes arrive in arbitrary read-sized pieces. A multi-byte sequence or a
//! CR LF pair may straddle two reads, so both an incomplete sequence and a
//! trailing CR are held back until the next piece decides them.
//! Concatenating every fragment returned by [`LineDecoder::decode`] plus the
//! one from [`LineDecoder::finish`] equals a lossy single-pass decode of the
//! whole stream with `\r\n` and bare `\r` rewritten to `\n`.

use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};

/// Stateful decoder for one output stream, with line-ending normalization
pub struct LineDecoder {
    decoder: Decoder,
    /// Last decoded character was a CR whose successor is not known yet
    pending_cr: bool,
}

impl LineDecoder {
    /// UTF-8 decoder
    pub fn new() -> Self {
        Self::with_encoding(UTF_8)
    }

    /// Decoder for `encoding`; a byte order mark is not treated specially
    pub fn with_encoding(encoding: &'static Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder_without_bom_handling(),
            pending_cr: false,
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.decoder.encoding()
    }

    /// Decode the next piece of the stream. May return an empty string.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let text = self.decode_bytes(bytes, false);
        self.normalize(&text, false)
    }

    /// Flush held-back state at end of stream.
    ///
    /// A truncated multi-byte sequence becomes one replacement character and
    /// a held CR becomes a line break. Nothing may be decoded afterwards.
    pub fn finish(&mut self) -> String {
        let text = self.decode_bytes(&[], true);
        self.normalize(&text, true)
    }

    fn decode_bytes(&mut self, mut bytes: &[u8], last: bool) -> String {
        let mut out = String::new();
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(bytes.len())
                .unwrap_or(bytes.len().saturating_mul(3).saturating_add(16));
            out.reserve(needed);

            let (result, read, _replaced) = self.decoder.decode_to_string(bytes, &mut out, last);
            bytes = &bytes[read..];
            if result == CoderResult::InputEmpty {
                return out;
            }
        }
    }

    fn normalize(&mut self, text: &str, at_end: bool) -> String {
        let mut out = String::with_capacity(text.len() + 1);
        let mut chars = text.chars().peekable();

        if self.pending_cr && chars.peek().is_some() {
            self.pending_cr = false;
            out.push('\n');
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
        }

        while let Some(c) = chars.next() {
            if c != '\r' {
                out.push(c);
                continue;
            }
            match chars.peek() {
                Some('\n') => {
                    chars.next();
                    out.push('\n');
                }
                Some(_) => out.push('\n'),
                None => self.pending_cr = true,
            }
        }

        if at_end && self.pending_cr {
            self.pending_cr = false;
            out.push('\n');
        }
        out
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LineDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineDecoder")
            .field("encoding", &self.encoding().name())
            .field("pending_cr", &self.pending_cr)
            .finish_non_exhaustive()
    }
}
