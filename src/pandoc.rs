use std::io::{self, Write};

/// Byte-level scanner over a pandoc JSON document.
///
/// This is not a JSON parser. It hops from quoted string to quoted
/// string looking for the shape `"t":"Math"` followed by `"c"` whose
/// array carries a `"t":"DisplayMath"` or `"t":"InlineMath"` tag and
/// then the payload string. Everything outside the payload strings is
/// echoed to the caller's sink byte for byte, which keeps the rest of
/// the document intact without understanding it.
pub struct Document<'de> {
    data: &'de [u8],
    pos: usize,
}

impl<'de> Document<'de> {
    pub fn new(data: &'de [u8]) -> Self {
        Document { data, pos: 0 }
    }

    /// Moves the cursor to the next opening quote, hopping over the
    /// string currently under it. False when the input is exhausted.
    fn next_string(&mut self) -> bool {
        let data = self.data;
        let mut at = self.pos;

        if at < data.len() && data[at] == b'"' {
            at += 1;
            while at < data.len() && data[at] != b'"' {
                if data[at] == b'\\' {
                    at += 1;
                }
                at += 1;
            }
            if at >= data.len() {
                self.pos = data.len();
                return false;
            }
            at += 1;
        }

        while at < data.len() && data[at] != b'"' {
            at += 1;
        }
        self.pos = at;
        at < data.len()
    }

    /// True if the string under the cursor spells exactly `key` and a
    /// colon follows it, i.e. it is an object key.
    fn key_equals(&self, key: &[u8]) -> bool {
        let at = self.pos + 1;
        self.data.get(at..at + key.len()) == Some(key)
            && self.data.get(at + key.len()) == Some(&b'"')
            && self.data.get(at + key.len() + 1) == Some(&b':')
    }

    fn string_starts_with(&self, prefix: &[u8]) -> bool {
        let at = self.pos + 1;
        self.data.get(at..at + prefix.len()) == Some(prefix)
    }

    /// Byte length of the quoted string under the cursor, escapes and
    /// both delimiters included.
    fn string_span(&self) -> usize {
        let data = self.data;
        let mut at = self.pos + 1;
        let mut length = 1;
        while at < data.len() && data[at] != b'"' {
            if data[at] == b'\\' {
                at += 1;
                length += 1;
            }
            at += 1;
            length += 1;
        }
        length + 1
    }

    /// Scans forward to the next math node, echoing every byte passed
    /// over to `sink` unchanged, and returns the node's decoded payload.
    /// The cursor is left just past the payload string, so the caller
    /// writes the replacement exactly where the original stood. `None`
    /// means the rest of the document has been echoed.
    pub fn next_math_block(&mut self, sink: &mut impl Write) -> io::Result<Option<String>> {
        let start = self.pos;
        let mut state = 0;
        let mut source = None;

        while state < 6 && self.next_string() {
            state = match state {
                0 | 3 if self.key_equals(b"t") => state + 1,
                1 if self.string_starts_with(b"Math") => 2,
                2 if self.key_equals(b"c") => 3,
                4 if self.string_starts_with(b"DisplayMath")
                    || self.string_starts_with(b"InlineMath") =>
                {
                    5
                }
                5 => {
                    source = Some(decode_payload(&self.data[self.pos..]));
                    6
                }
                _ => 0,
            };
        }

        sink.write_all(&self.data[start..self.pos])?;
        if state == 6 {
            self.pos += self.string_span();
            Ok(source)
        } else {
            Ok(None)
        }
    }
}

/// Decodes a JSON string starting at its opening quote: `\n` becomes a
/// newline and any other escaped byte stands for itself, which covers
/// the escapes pandoc emits for this payload.
fn decode_payload(payload: &[u8]) -> String {
    let mut bytes = Vec::new();
    let mut at = 1;
    while at < payload.len() && payload[at] != b'"' {
        let mut c = payload[at];
        if c == b'\\' {
            at += 1;
            match payload.get(at) {
                Some(b'n') => c = b'\n',
                Some(&escaped) => c = escaped,
                None => break,
            }
        }
        bytes.push(c);
        at += 1;
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// JSON-escapes `bytes` into `sink`: quotes and backslashes gain a
/// backslash, newlines become an escaped raw newline.
pub fn write_escaped(sink: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    for &b in bytes {
        match b {
            b'"' => sink.write_all(b"\\\"")?,
            b'\\' => sink.write_all(b"\\\\")?,
            b'\n' => sink.write_all(b"\\\n")?,
            _ => sink.write_all(&[b])?,
        }
    }
    Ok(())
}
