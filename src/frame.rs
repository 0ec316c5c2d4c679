//! Frame boundaries in the notification service's output
//!
//! The service writes a sequence of JSON objects, pretty-printed or not, with
//! no delimiter beyond structural balance. [`FrameDecoder`] tracks nesting
//! depth (ignoring braces inside string literals) and yields each top-level
//! object as soon as its closing brace arrives. Text outside any object is
//! cut at the next newline and yielded as-is so the caller can report it.

use std::mem;

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
    stray: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed received bytes, returning every frame they complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();

        for &byte in bytes {
            if self.stray {
                if byte == b'\n' {
                    self.stray = false;
                    frames.push(self.take());
                } else {
                    self.buf.push(byte);
                }
                continue;
            }

            if self.depth == 0 {
                match byte {
                    b'{' => {
                        self.depth = 1;
                        self.buf.push(byte);
                    }
                    b if b.is_ascii_whitespace() => {}
                    _ => {
                        self.stray = true;
                        self.buf.push(byte);
                    }
                }
                continue;
            }

            self.buf.push(byte);

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        frames.push(self.take());
                    }
                }
                _ => {}
            }
        }

        frames
    }

    /// Bytes of an incomplete frame, if any, once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        Some(self.take())
    }

    fn take(&mut self) -> String {
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
        String::from_utf8_lossy(&mem::take(&mut self.buf)).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use serde_json::{json, Value};

    const PRETTY: &str = r#"{
  "version": "2024.01.01",
  "subscribe": "ds",
  "clock": "c:1:2"
}
{
  "subscription": "ds",
  "files": [
    "static_upstream/widgets/src/a.js",
    "static_upstream/widgets/{odd}.js"
  ],
  "nested": {
    "deep": [{"x": "}"}]
  }
}
"#;

    #[test]
    fn test_pretty_printed_frames() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(PRETTY.as_bytes());

        assert_eq!(frames.len(), 2);
        let ack: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(ack["subscribe"], "ds");
        let files: Value = serde_json::from_str(&frames[1]).unwrap();
        assert_eq!(files["files"][1], "static_upstream/widgets/{odd}.js");
        assert_eq!(files["nested"]["deep"][0]["x"], "}");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_line_starting_with_brace_inside_frame() {
        // A nested object closing at column zero must not end the frame.
        let input = "{\"a\": {\n\"b\": 1\n}\n, \"c\": 2}\n";
        let frames = FrameDecoder::new().push(input.as_bytes());
        assert_eq!(frames.len(), 1);
        let value: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["c"], 2);
    }

    #[test]
    fn test_escaped_quotes_in_strings() {
        let input = r#"{"error": "bad \"}\" token"}{"subscribe":"ds"}"#;
        let frames = FrameDecoder::new().push(input.as_bytes());
        assert_eq!(frames.len(), 2);
        let value: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["error"], "bad \"}\" token");
    }

    #[test]
    fn test_stray_text_is_cut_at_newline() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"garbage here\n{\"subscribe\":\"ds\"}");
        assert_eq!(frames, vec!["garbage here".to_string(), "{\"subscribe\":\"ds\"}".to_string()]);
    }

    #[test]
    fn test_partial_frame_is_held_until_complete() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"{\"subscription\": \"ds\", \"fil").is_empty());
        assert!(decoder.push(b"es\": [\"a\"").is_empty());
        let frames = decoder.push(b"]}\n");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_finish_returns_truncated_frame() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"{\"files\": [").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("{\"files\": ["));
        assert!(decoder.finish().is_none());
    }

    #[quickcheck]
    fn prop_chunking_does_not_change_frames(names: Vec<String>, split: usize) -> bool {
        let stream: String = names
            .iter()
            .map(|name| {
                let frame = json!({"subscription": "ds", "files": [name, {"name": name}]});
                serde_json::to_string_pretty(&frame).unwrap() + "\n"
            })
            .collect();
        let bytes = stream.as_bytes();
        let split = if bytes.is_empty() { 0 } else { split % bytes.len() };

        let whole = FrameDecoder::new().push(bytes);

        let mut decoder = FrameDecoder::new();
        let mut chunked = decoder.push(&bytes[..split]);
        chunked.extend(decoder.push(&bytes[split..]));

        whole.len() == names.len() && whole == chunked
    }
}
