// Character reader for the tagged text stream.
//
// The stream grammar is decided one character at a time, so the reader
// decodes UTF-8 incrementally from any `BufRead` and keeps a single character
// of lookahead. Nothing is buffered beyond that, which lets the decoder answer
// a NUL flush marker before the next segment has arrived.

use std::io::{BufRead, ErrorKind};

use crate::StreamError;

/// Character that opens a lexical unit.
pub const UNIT_OPEN: char = '^';
/// Character that separates the source reading from targets and targets from each other.
pub const READING_SEPARATOR: char = '/';
/// Character that closes a lexical unit.
pub const UNIT_CLOSE: char = '$';
/// Escape character: the next character is taken literally.
pub const ESCAPE: char = '\\';
/// Segment separator in null-flush mode.
pub const NULL_FLUSH: char = '\0';

/// UTF-8 character reader with one character of lookahead.
pub struct CharReader<R> {
    inner: R,
    peeked: Option<char>,
    offset: u64,
}

impl<R: BufRead> CharReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: None,
            offset: 0,
        }
    }

    /// Look at the next character without consuming it.
    pub fn peek(&mut self) -> Result<Option<char>, StreamError> {
        if self.peeked.is_none() {
            self.peeked = self.decode()?;
        }
        Ok(self.peeked)
    }

    /// Consume and return the next character, or `None` at end of input.
    pub fn next_char(&mut self) -> Result<Option<char>, StreamError> {
        match self.peeked.take() {
            Some(c) => Ok(Some(c)),
            None => self.decode(),
        }
    }

    /// True once every character has been consumed.
    pub fn is_eof(&mut self) -> Result<bool, StreamError> {
        Ok(self.peek()?.is_none())
    }

    /// Read the blank text preceding a lexical unit.
    ///
    /// Stops before `^` or NUL (neither is consumed). Escaped characters and
    /// bracketed `[...]` blanks are copied verbatim, so a `^` inside them does
    /// not open a unit.
    pub fn read_blank(&mut self) -> Result<String, StreamError> {
        let mut blank = String::new();
        while let Some(c) = self.peek()? {
            match c {
                UNIT_OPEN | NULL_FLUSH => break,
                ESCAPE => {
                    self.next_char()?;
                    blank.push(c);
                    if let Some(escaped) = self.next_char()? {
                        blank.push(escaped);
                    }
                }
                '[' => {
                    self.next_char()?;
                    blank.push(c);
                    self.read_until(']', &mut blank)?;
                }
                _ => {
                    self.next_char()?;
                    blank.push(c);
                }
            }
        }
        Ok(blank)
    }

    /// Read the body of a tag whose opening `<` has already been consumed.
    ///
    /// Returns the whole tag including both angle brackets. An unterminated
    /// tag runs to the end of input.
    pub fn read_tag(&mut self) -> Result<String, StreamError> {
        let mut tag = String::from('<');
        self.read_until('>', &mut tag)?;
        Ok(tag)
    }

    /// Copy characters into `buf` up to and including `close`, honouring escapes.
    fn read_until(&mut self, close: char, buf: &mut String) -> Result<(), StreamError> {
        while let Some(c) = self.next_char()? {
            buf.push(c);
            if c == ESCAPE {
                if let Some(escaped) = self.next_char()? {
                    buf.push(escaped);
                }
            } else if c == close {
                break;
            }
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, StreamError> {
        loop {
            match self.inner.fill_buf() {
                Ok([]) => return Ok(None),
                Ok(buf) => {
                    let b = buf[0];
                    self.inner.consume(1);
                    self.offset += 1;
                    return Ok(Some(b));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn decode(&mut self) -> Result<Option<char>, StreamError> {
        let start = self.offset;
        let Some(first) = self.read_byte()? else {
            return Ok(None);
        };
        let width = utf8_width(first);
        if width == 0 {
            return Err(StreamError::InvalidUtf8 { offset: start });
        }
        let mut bytes = [first, 0, 0, 0];
        for slot in bytes.iter_mut().take(width).skip(1) {
            *slot = self
                .read_byte()?
                .ok_or(StreamError::InvalidUtf8 { offset: start })?;
        }
        std::str::from_utf8(&bytes[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .map(Some)
            .ok_or(StreamError::InvalidUtf8 { offset: start })
    }
}

/// Encoded length of a UTF-8 sequence from its leading byte (0 if invalid).
fn utf8_width(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}
