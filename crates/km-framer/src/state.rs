//! The brace-counting state machine itself, with no I/O.

/// Parses a byte stream into complete JSON-object message spans while
/// never losing, reordering, or mutating a byte — see §4.2.
///
/// Bytes that are not part of a balanced top-level JSON object (leading
/// whitespace, newlines, banner text) accumulate into the same span as
/// the message that follows them; they are never themselves reported as
/// a message.
#[derive(Debug)]
pub struct Framer {
    depth: u32,
    in_string: bool,
    escape_next: bool,
    buf: Vec<u8>,
    cap: usize,
    overflow_count: u64,
}

impl Framer {
    /// Create a framer with the given accumulation cap, in bytes.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            depth: 0,
            in_string: false,
            escape_next: false,
            buf: Vec::new(),
            cap,
            overflow_count: 0,
        }
    }

    /// How many times the accumulation cap has been hit and the in-flight
    /// buffer discarded.
    #[must_use]
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Feed one chunk of bytes (of any size, including single bytes).
    ///
    /// Returns the complete messages found in this chunk, in order. The
    /// caller is responsible for forwarding `chunk` to the paired sink
    /// verbatim — that happens independently of message detection, so a
    /// caller that never calls this method still gets byte transparency.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut messages = Vec::new();

        for &byte in chunk {
            self.buf.push(byte);

            if self.escape_next {
                self.escape_next = false;
            } else if self.in_string {
                match byte {
                    b'\\' => self.escape_next = true,
                    b'"' => self.in_string = false,
                    _ => {}
                }
            } else {
                match byte {
                    b'"' => self.in_string = true,
                    b'{' => self.depth += 1,
                    b'}' => {
                        if self.depth > 0 {
                            self.depth -= 1;
                            if self.depth == 0 {
                                messages.push(std::mem::take(&mut self.buf));
                                continue;
                            }
                        }
                        // Unbalanced closing brace outside any object: not
                        // part of a message, ignored rather than driving
                        // depth negative and wedging the parser.
                    }
                    _ => {}
                }
            }

            if self.buf.len() > self.cap {
                self.reset_overflow();
            }
        }

        messages
    }

    fn reset_overflow(&mut self) {
        self.buf.clear();
        self.depth = 0;
        self.in_string = false;
        self.escape_next = false;
        self.overflow_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_message_in_one_chunk() {
        let mut framer = Framer::new(1024);
        let msgs = framer.feed(br#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0], br#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#);
    }

    #[test]
    fn two_newline_delimited_messages() {
        let mut framer = Framer::new(1024);
        let msgs = framer.feed(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0], b"{\"a\":1}");
        assert_eq!(msgs[1], b"\n{\"b\":2}");
    }

    #[test]
    fn message_split_across_feed_calls() {
        let mut framer = Framer::new(1024);
        let mut msgs = framer.feed(br#"{"jsonrpc":"2.0","#);
        assert!(msgs.is_empty());
        msgs = framer.feed(br#""id":1}"#);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0], br#"{"jsonrpc":"2.0","id":1}"#);
    }

    #[test]
    fn message_split_byte_by_byte() {
        let mut framer = Framer::new(1024);
        let input = br#"{"id":1}"#;
        let mut found = Vec::new();
        for &b in input {
            found.extend(framer.feed(&[b]));
        }
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], input);
    }

    #[test]
    fn braces_inside_strings_do_not_affect_depth() {
        let mut framer = Framer::new(1024);
        let msgs = framer.feed(br#"{"text":"a{b}c"}"#);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0], br#"{"text":"a{b}c"}"#);
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        let mut framer = Framer::new(1024);
        let msgs = framer.feed(br#"{"text":"a\"}b"}"#);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0], br#"{"text":"a\"}b"}"#);
    }

    #[test]
    fn unbalanced_closing_brace_is_ignored_not_fatal() {
        let mut framer = Framer::new(1024);
        let msgs = framer.feed(b"}}}{\"a\":1}");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0], b"}}}{\"a\":1}");
    }

    #[test]
    fn overflow_resets_buffer_and_increments_counter() {
        let mut framer = Framer::new(8);
        let msgs = framer.feed(b"{\"aaaaaaaaaaaaaaaaaaaaaaaa\":1}");
        assert!(msgs.is_empty());
        assert_eq!(framer.overflow_count(), 1);
    }

    #[test]
    fn overflow_then_subsequent_message_still_completes() {
        let mut framer = Framer::new(8);
        framer.feed(b"{\"padpadpadpadpad\":");
        assert_eq!(framer.overflow_count(), 1);
        let msgs = framer.feed(b"{\"x\":1}");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0], b"{\"x\":1}");
    }

    #[test]
    fn adversarial_escaped_quotes_never_complete_a_message() {
        let mut framer = Framer::new(DEFAULT_CAP_FOR_TEST);
        let mut input = Vec::new();
        input.push(b'"');
        for _ in 0..(2 * DEFAULT_CAP_FOR_TEST) {
            input.push(b'\\');
        }
        let msgs = framer.feed(&input);
        assert!(msgs.is_empty());
        assert!(framer.overflow_count() >= 1);
    }

    const DEFAULT_CAP_FOR_TEST: usize = 1024;
}
