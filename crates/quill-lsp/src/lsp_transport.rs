//! JSON-RPC/LSP framing.
//!
//! LSP messages are JSON values framed by HTTP-like headers:
//!
//! ```text
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of UTF-8 JSON>
//! ```
//!
//! Transports hand over bytes in arbitrary chunks, so decoding is incremental: feed bytes with
//! [`FrameDecoder::push`] and pull complete messages with [`FrameDecoder::next_message`].

use crate::error::{LspError, Result};
use serde_json::Value;
use std::io::Write;

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Encode a single LSP JSON-RPC message into its framed byte form.
pub fn encode_lsp_message(value: &Value) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(value)?;
    let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend_from_slice(&body);
    Ok(out)
}

/// Write a single LSP JSON-RPC message to `writer`.
pub fn write_lsp_message<W: Write>(writer: &mut W, value: &Value) -> Result<()> {
    writer.write_all(&encode_lsp_message(value)?)?;
    writer.flush()?;
    Ok(())
}

/// Incremental decoder for `Content-Length` framed messages.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete message.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A malformed frame is consumed and reported
    /// as an error, so calling again continues with whatever follows it.
    pub fn next_message(&mut self) -> Result<Option<Value>> {
        let Some(header_end) = find_subslice(&self.buf, HEADER_END) else {
            return Ok(None);
        };

        let header = String::from_utf8_lossy(&self.buf[..header_end]).into_owned();
        let body_start = header_end + HEADER_END.len();
        let content_length = match parse_content_length(&header) {
            Ok(len) => len,
            Err(err) => {
                self.buf.drain(..body_start);
                return Err(err);
            }
        };

        let Some(body_end) = body_start.checked_add(content_length) else {
            self.buf.drain(..body_start);
            return Err(LspError::Framing(format!(
                "Content-Length {content_length} is too large"
            )));
        };
        if self.buf.len() < body_end {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buf.drain(..body_end).collect();
        let value = serde_json::from_slice(&frame[body_start..])?;
        Ok(Some(value))
    }
}

fn parse_content_length(header: &str) -> Result<usize> {
    for line in header.split("\r\n") {
        // LSP uses `Content-Length` (case-insensitive in practice).
        if let Some((name, rest)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("Content-Length")
        {
            return rest
                .trim()
                .parse::<usize>()
                .map_err(|_| LspError::Framing(format!("bad Content-Length {:?}", rest.trim())));
        }
    }
    Err(LspError::Framing(format!(
        "missing Content-Length in header {header:?}"
    )))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_then_decode() {
        let value = json!({"jsonrpc": "2.0", "method": "exit"});
        let mut decoder = FrameDecoder::new();
        decoder.push(&encode_lsp_message(&value).unwrap());
        assert_eq!(decoder.next_message().unwrap(), Some(value));
        assert_eq!(decoder.next_message().unwrap(), None);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_header_name_is_case_insensitive() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"content-length: 2\r\nContent-Type: x\r\n\r\n{}");
        assert_eq!(decoder.next_message().unwrap(), Some(json!({})));
    }

    #[test]
    fn test_bad_frame_is_skipped() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"X-Nope: 1\r\n\r\n");
        decoder.push(&encode_lsp_message(&json!(1)).unwrap());

        assert!(matches!(
            decoder.next_message(),
            Err(LspError::Framing(_))
        ));
        assert_eq!(decoder.next_message().unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_huge_content_length_is_a_framing_error() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"Content-Length: 18446744073709551615\r\n\r\n");
        decoder.push(&encode_lsp_message(&json!(2)).unwrap());

        assert!(matches!(
            decoder.next_message(),
            Err(LspError::Framing(_))
        ));
        assert_eq!(decoder.next_message().unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_write_lsp_message() {
        let mut out = Vec::new();
        write_lsp_message(&mut out, &json!(null)).unwrap();
        assert_eq!(out, b"Content-Length: 4\r\n\r\nnull");
    }
}
