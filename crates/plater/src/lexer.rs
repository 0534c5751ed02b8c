//! lexical scanner for template sources
//!
//! The [Lexer] knows nothing about template semantics. It splits a character stream into maximal runs of
//! characters of the same [TokenClass]:
//!
//! | class            | characters                                         |
//! |------------------|----------------------------------------------------|
//! | `Whitespace`     | unicode whitespace                                 |
//! | `OpenDelimiter`  | `{`                                                |
//! | `CloseDelimiter` | `}`                                                |
//! | `Identifier`     | anything else                                      |
//! | `End`            | end of stream (or a read error, see [Lexer::take_error]) |
//!
//! Runs are maximal, so `{{` is one token and `(.a!=.b)` is one identifier. Concatenating the literals of all
//! tokens up to [TokenClass::End] yields the input again.
use std::io::{self, BufRead, BufReader, Read};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    End,
    OpenDelimiter,
    CloseDelimiter,
    Whitespace,
    Identifier,
}

impl TokenClass {
    /// Classify a single character, `None` being the end of the stream
    pub fn of(ch: Option<char>) -> Self {
        match ch {
            None => TokenClass::End,
            Some(ch) if ch.is_whitespace() => TokenClass::Whitespace,
            Some('{') => TokenClass::OpenDelimiter,
            Some('}') => TokenClass::CloseDelimiter,
            Some(_) => TokenClass::Identifier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub class: TokenClass,
    pub literal: String,
}

impl Token {
    fn end() -> Self {
        Self {
            class: TokenClass::End,
            literal: String::new(),
        }
    }

    /// `{{` or `}}`, exactly two characters
    ///
    /// Single braces and longer runs are plain text.
    pub fn is_delimiter(&self) -> bool {
        matches!(
            self.class,
            TokenClass::OpenDelimiter | TokenClass::CloseDelimiter
        ) && self.literal.len() == 2
    }
}

pub struct Lexer<R> {
    reader: BufReader<R>,
    pushback: Option<char>,
    ended: bool,
    failure: Option<io::Error>,
}

impl<R: Read> Lexer<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
            pushback: None,
            ended: false,
            failure: None,
        }
    }

    /// Returns the next token
    ///
    /// Once [TokenClass::End] was returned every further call returns it again.
    pub fn scan(&mut self) -> Token {
        let Some(first) = self.read() else {
            return Token::end();
        };

        let class = TokenClass::of(Some(first));
        let mut literal = String::from(first);

        while let Some(next) = self.read() {
            if TokenClass::of(Some(next)) != class {
                self.unread(next);
                break;
            }
            literal.push(next);
        }

        Token { class, literal }
    }

    /// Returns the next token that is not whitespace
    pub fn scan_skipping_whitespace(&mut self) -> Token {
        let token = self.scan();
        if token.class == TokenClass::Whitespace {
            // whitespace runs are maximal, the next token can not be whitespace again
            return self.scan();
        }
        token
    }

    /// All remaining tokens up to, but not including, [TokenClass::End]
    pub fn tokens(mut self) -> impl Iterator<Item = Token> {
        std::iter::from_fn(move || {
            let token = self.scan();
            (token.class != TokenClass::End).then_some(token)
        })
    }

    /// The read error that ended the token stream early, if any
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.failure.take()
    }

    fn read(&mut self) -> Option<char> {
        if let Some(ch) = self.pushback.take() {
            return Some(ch);
        }

        if self.ended {
            return None;
        }

        let ch = self.decode();
        if ch.is_none() {
            self.ended = true;
        }
        ch
    }

    fn unread(&mut self, ch: char) {
        debug_assert!(self.pushback.is_none(), "only one character of pushback");
        self.pushback = Some(ch);
    }

    /// Decode one utf-8 encoded character from the underlying reader
    ///
    /// A byte that does not start a valid sequence decodes to [char::REPLACEMENT_CHARACTER], only the bytes that
    /// belong to the broken sequence are consumed.
    fn decode(&mut self) -> Option<char> {
        let lead = self.next_byte()?;
        let width = match lead {
            0x00..=0x7f => return Some(char::from(lead)),
            0xc2..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf4 => 4,
            _ => {
                tracing::debug!(byte = lead, "invalid utf-8 lead byte");
                return Some(char::REPLACEMENT_CHARACTER);
            }
        };

        let mut buf = [lead, 0, 0, 0];
        for slot in buf.iter_mut().take(width).skip(1) {
            match self.peek_byte() {
                Some(byte @ 0x80..=0xbf) => {
                    self.reader.consume(1);
                    *slot = byte;
                }
                _ => {
                    tracing::debug!(byte = lead, "truncated utf-8 sequence");
                    return Some(char::REPLACEMENT_CHARACTER);
                }
            }
        }

        let ch = std::str::from_utf8(&buf[..width])
            .ok()
            .and_then(|decoded| decoded.chars().next());
        Some(ch.unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn next_byte(&mut self) -> Option<u8> {
        let byte = self.peek_byte()?;
        self.reader.consume(1);
        Some(byte)
    }

    fn peek_byte(&mut self) -> Option<u8> {
        if self.failure.is_some() {
            return None;
        }

        loop {
            match self.reader.fill_buf() {
                Ok(buf) => return buf.first().copied(),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::debug!(%err, "unable to read template source");
                    self.failure = Some(err);
                    return None;
                }
            }
        }
    }
}
