use std::fmt::Display;

/// A single token borrowed out of the source buffer.
///
/// `text` always covers the full spelling, delimiters included for string
/// and raw-string tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    pub text: &'de str,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Newline,
    Ident,
    Number,
    String,
    RawString,
    Var,
    Fn,
    Op,
    Opr,
    Opp,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Eof => write!(f, "EOF"),
            TokenKind::LeftParen => write!(f, "LPAREN"),
            TokenKind::RightParen => write!(f, "RPAREN"),
            TokenKind::LeftBracket => write!(f, "LBRACKET"),
            TokenKind::RightBracket => write!(f, "RBRACKET"),
            TokenKind::LeftBrace => write!(f, "LBRACE"),
            TokenKind::RightBrace => write!(f, "RBRACE"),
            TokenKind::Comma => write!(f, "COMMA"),
            TokenKind::Newline => write!(f, "NEWLINE"),
            TokenKind::Ident => write!(f, "IDENTIFIER"),
            TokenKind::Number => write!(f, "NUMBER"),
            TokenKind::String => write!(f, "STRING"),
            TokenKind::RawString => write!(f, "RAW_STRING"),
            TokenKind::Var => write!(f, "VAR"),
            TokenKind::Fn => write!(f, "FN"),
            TokenKind::Op => write!(f, "OP"),
            TokenKind::Opr => write!(f, "OPR"),
            TokenKind::Opp => write!(f, "OPP"),
        }
    }
}

fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic()
}

/// Bytes that terminate a symbolic identifier run: the nine structural
/// bytes plus the skipped whitespace bytes.
fn is_separator(c: u8) -> bool {
    matches!(
        c,
        b'(' | b')' | b'[' | b']' | b'{' | b'}' | b',' | b'\n' | b'"' | b'`' | b' ' | b'\t'
    )
}

pub struct Lexer<'de> {
    whole: &'de str,
    rest: &'de str,
    pub byte: usize,
}

impl<'de> Lexer<'de> {
    pub fn new(input: &'de str) -> Self {
        Lexer {
            whole: input,
            rest: input,
            byte: 0,
        }
    }

    pub fn whole(&self) -> &'de str {
        self.whole
    }

    /// Scans the next token. At end of input this keeps returning an EOF
    /// token, which lets the parser treat the lookahead uniformly.
    pub fn next_token(&mut self) -> Token<'de> {
        let bytes = self.rest.as_bytes();
        let mut skip = 0;
        while skip < bytes.len() && (bytes[skip] == b' ' || bytes[skip] == b'\t') {
            skip += 1;
        }
        self.rest = &self.rest[skip..];
        self.byte += skip;

        let offset = self.byte;
        let bytes = self.rest.as_bytes();
        let Some(&c) = bytes.first() else {
            return Token {
                kind: TokenKind::Eof,
                text: "",
                offset,
            };
        };

        let (kind, len) = match c {
            b'(' => (TokenKind::LeftParen, 1),
            b')' => (TokenKind::RightParen, 1),
            b'[' => (TokenKind::LeftBracket, 1),
            b']' => (TokenKind::RightBracket, 1),
            b'{' => (TokenKind::LeftBrace, 1),
            b'}' => (TokenKind::RightBrace, 1),
            b',' => (TokenKind::Comma, 1),
            b'\n' => (TokenKind::Newline, 1),
            b'"' => (TokenKind::String, self.quoted_length(b'"')),
            b'`' => (TokenKind::RawString, self.quoted_length(b'`')),
            c if is_digit(c) => {
                let mut len = 1;
                while len < bytes.len() && is_digit(bytes[len]) {
                    len += 1;
                }
                (TokenKind::Number, len)
            }
            c if is_alpha(c) || c == b'_' => {
                let mut len = 1;
                while len < bytes.len()
                    && (is_digit(bytes[len]) || is_alpha(bytes[len]) || bytes[len] == b'_')
                {
                    len += 1;
                }
                (TokenKind::Ident, len)
            }
            _ => {
                // A maximal run of symbol bytes. Anything that is not a
                // digit, letter, or separator joins the run, which is what
                // lets spellings like `<=` or a multi-byte `∘` become one
                // identifier usable as an operator name.
                let mut len = 1;
                while len < bytes.len()
                    && !is_digit(bytes[len])
                    && !is_alpha(bytes[len])
                    && !is_separator(bytes[len])
                {
                    len += 1;
                }
                (TokenKind::Ident, len)
            }
        };

        let text = &self.rest[..len];
        let kind = match text {
            "op" => TokenKind::Op,
            "fn" => TokenKind::Fn,
            "var" => TokenKind::Var,
            "opr" => TokenKind::Opr,
            "opp" => TokenKind::Opp,
            _ => kind,
        };

        self.rest = &self.rest[len..];
        self.byte += len;
        Token { kind, text, offset }
    }

    /// Length of a quoted token starting at the current position,
    /// including both delimiter bytes. An unterminated string runs to the
    /// end of the buffer.
    fn quoted_length(&self, quote: u8) -> usize {
        let bytes = self.rest.as_bytes();
        let mut len = 1;
        while len < bytes.len() && bytes[len] != quote {
            len += 1;
        }
        if len < bytes.len() { len + 1 } else { len }
    }
}

impl<'de> Iterator for Lexer<'de> {
    type Item = Token<'de>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            None
        } else {
            Some(token)
        }
    }
}
