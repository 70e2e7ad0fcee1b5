//! Low-level tokenization over a `RandomSource` (§4.2).
//!
//! This sits below `DictionaryParser`: it never builds an `Object`, only
//! recognises whitespace/comments, reads lines under any PDF line-ending
//! convention, and reads the small fixed-grammar tokens the xref walk needs
//! directly from the source (`n g obj` headers, xref subsection headers).
//! `DictionaryParser` instead works over an already-materialised byte slice
//! and is built on the nom combinators in `lexer`/`parser`.

use crate::error::{Error, Result};
use crate::source::RandomSource;

/// Low-level tokenizer bound to a `RandomSource`.
pub struct TokenReader<'a, S: RandomSource> {
    source: &'a mut S,
}

impl<'a, S: RandomSource> TokenReader<'a, S> {
    /// Wrap a source.
    pub fn new(source: &'a mut S) -> Self {
        Self { source }
    }

    /// PDF §7.2.2 whitespace characters.
    pub fn is_whitespace(b: u8) -> bool {
        matches!(b, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
    }

    /// Any end-of-line byte (the first byte of `\r`, `\n`, or `\r\n`).
    pub fn is_eol(b: u8) -> bool {
        matches!(b, b'\r' | b'\n')
    }

    /// ASCII digit.
    pub fn is_digit(b: u8) -> bool {
        b.is_ascii_digit()
    }

    /// PDF §7.3.5 name-terminating delimiters and whitespace.
    pub fn is_end_of_name(b: u8) -> bool {
        Self::is_whitespace(b) || matches!(b, b'/' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'%')
    }

    /// Consume whitespace and `% ... EOL` comments.
    pub fn skip_spaces(&mut self) -> Result<()> {
        loop {
            match self.source.peek()? {
                Some(b) if Self::is_whitespace(b) => {
                    self.source.read()?;
                },
                Some(b'%') => {
                    while let Some(b) = self.source.peek()? {
                        if Self::is_eol(b) {
                            break;
                        }
                        self.source.read()?;
                    }
                },
                _ => break,
            }
        }
        Ok(())
    }

    /// Read up to (but not including) the next EOL marker, consuming the
    /// marker itself (`\r`, `\n`, or `\r\n`) and leaving the source
    /// positioned right after it. Returns `None` at EOF with nothing read.
    pub fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let mut saw_any = false;
        loop {
            match self.source.read()? {
                None => {
                    return Ok(if saw_any || !line.is_empty() { Some(line) } else { None });
                },
                Some(b'\r') => {
                    saw_any = true;
                    if self.source.peek()? == Some(b'\n') {
                        self.source.read()?;
                    }
                    return Ok(Some(line));
                },
                Some(b'\n') => {
                    saw_any = true;
                    return Ok(Some(line));
                },
                Some(b) => {
                    saw_any = true;
                    line.push(b);
                },
            }
        }
    }

    /// Peek without consuming; true iff the next bytes equal `lit`.
    pub fn is_string(&mut self, lit: &[u8]) -> Result<bool> {
        let pos = self.source.position()?;
        let mut buf = vec![0u8; lit.len()];
        let ok = self.source.read_into(&mut buf).is_ok() && buf == lit;
        self.source.seek(pos)?;
        Ok(ok)
    }

    /// Consume `lit` if the next bytes match it, otherwise leave the
    /// position unchanged and return `false`.
    pub fn consume_string(&mut self, lit: &[u8]) -> Result<bool> {
        if self.is_string(lit)? {
            self.source.skip(lit.len() as u64)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn read_digits(&mut self, what: &'static str) -> Result<Vec<u8>> {
        let mut digits = Vec::new();
        while let Some(b) = self.source.peek()? {
            if Self::is_digit(b) {
                digits.push(b);
                self.source.read()?;
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(Error::Malformed {
                location: what.to_string(),
                detail: "expected at least one digit".to_string(),
            });
        }
        Ok(digits)
    }

    fn digits_to_u64(digits: &[u8], what: &'static str) -> Result<u64> {
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::Malformed {
                location: what.to_string(),
                detail: format!("not a valid unsigned integer: {:?}", String::from_utf8_lossy(digits)),
            })
    }

    /// Read an unsigned object number.
    pub fn read_object_number(&mut self) -> Result<u32> {
        self.skip_spaces()?;
        let digits = self.read_digits("object number")?;
        let v = Self::digits_to_u64(&digits, "object number")?;
        Ok(v as u32)
    }

    /// Read an unsigned 16-bit generation number.
    pub fn read_generation_number(&mut self) -> Result<u16> {
        self.skip_spaces()?;
        let digits = self.read_digits("generation number")?;
        let v = Self::digits_to_u64(&digits, "generation number")?;
        Ok(v as u16)
    }

    /// Consume the literal `obj` keyword, preceded by whitespace.
    pub fn read_object_marker(&mut self) -> Result<()> {
        self.skip_spaces()?;
        if self.consume_string(b"obj")? {
            Ok(())
        } else {
            Err(Error::Malformed {
                location: "object marker".to_string(),
                detail: "expected literal 'obj'".to_string(),
            })
        }
    }

    /// Read the `n g obj` triple at the current position.
    pub fn read_object_header(&mut self) -> Result<(u32, u16)> {
        let n = self.read_object_number()?;
        let g = self.read_generation_number()?;
        self.read_object_marker()?;
        Ok((n, g))
    }
}
