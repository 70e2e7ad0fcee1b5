//! `DocumentIndex`: the entry point collaborators open a document through (§4.9).
//!
//! Open sequence: header check → locate `startxref` → `XrefParser::parse_xref`
//! (which already drives validation and brute-force recovery internally) →
//! publish the resolved `Directory`. Afterwards every lookup flows
//! `DocumentIndex::lookup` → the published `xref` map → a direct byte read or
//! a recursive `objstm` resolve.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectKey};
use crate::objstm::parse_object_stream;
use crate::parser::DictionaryParser;
use crate::source::RandomSource;
use crate::token_reader::TokenReader;
use crate::xref::XrefEntry;
use crate::xref_parser::XrefParser;
use std::collections::HashMap;

/// Where an `ObjectKey` resolves to, as published by the xref map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedLocation {
    /// Direct byte offset into the source.
    Direct { offset: u64, generation: u16 },
    /// Packed inside an object stream.
    Compressed { containing_stream_object_number: u32, index_within_stream: u32 },
    /// A free slot, or a key absent from the xref map entirely.
    Free,
}

/// The flavour of document opened, driving the one header-literal and
/// catalog difference between PDF and FDF (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Fdf,
}

/// Resolved, immutable view over one document's object index.
///
/// Owns the `RandomSource` exclusively for the lifetime of the index; no
/// other component is allowed to seek it concurrently (§5).
pub struct DocumentIndex<S: RandomSource> {
    source: S,
    config: Config,
    kind: DocumentKind,
    version: (u8, u8),
    trailer: HashMap<String, Object>,
    xref: HashMap<ObjectKey, XrefEntry>,
    highest_object_number: u32,
}

impl<S: RandomSource> DocumentIndex<S> {
    /// Run the full open sequence: header check, `startxref` scan, directory
    /// resolution (with brute-force recovery already folded in by
    /// `XrefParser`).
    pub fn open(mut source: S, config: Config) -> Result<Self> {
        let (kind, version) = Self::check_header(&mut source)?;
        let start_offset = Self::find_startxref(&mut source, &config)?;

        let directory = {
            let mut parser = XrefParser::new(&mut source, config.clone());
            parser.parse_xref(start_offset)?
        };

        if directory.trailer.is_empty() {
            return Err(Error::MissingTrailer("no trailer resolved".to_string()));
        }

        Ok(Self {
            source,
            config,
            kind,
            version,
            trailer: directory.trailer,
            xref: directory.xref,
            highest_object_number: directory.highest_object_number,
        })
    }

    /// Check for `%PDF-M.m` or `%FDF-M.m` within the first 1024 bytes.
    fn check_header(source: &mut S) -> Result<(DocumentKind, (u8, u8))> {
        let len = source.length()?;
        let window = len.min(1024) as usize;
        source.seek(0)?;
        let mut buf = vec![0u8; window];
        source.read_into(&mut buf)?;

        let (kind, marker_pos) = if let Some(pos) = find_subslice(&buf, b"%PDF-") {
            (DocumentKind::Pdf, pos)
        } else if let Some(pos) = find_subslice(&buf, b"%FDF-") {
            (DocumentKind::Fdf, pos)
        } else {
            return Err(Error::MalformedHeader(
                String::from_utf8_lossy(&buf[..buf.len().min(8)]).to_string(),
            ));
        };

        let version_start = marker_pos + 5;
        let version_bytes = buf.get(version_start..version_start + 3).ok_or_else(|| {
            Error::MalformedHeader("header truncated before version digits".to_string())
        })?;
        let (major, dot, minor) = (version_bytes[0], version_bytes[1], version_bytes[2]);
        if dot != b'.' || !major.is_ascii_digit() || !minor.is_ascii_digit() {
            return Err(Error::MalformedHeader(format!(
                "expected 'M.m' version after header marker, found '{}'",
                String::from_utf8_lossy(version_bytes)
            )));
        }
        let major = major - b'0';
        let minor = minor - b'0';
        if major > 2 || (major == 0 && minor == 0) {
            return Err(Error::UnsupportedVersion(format!("{}.{}", major, minor)));
        }

        Ok((kind, (major, minor)))
    }

    /// Scan backward from EOF, within `config.eof_lookup_range` bytes, for
    /// the `startxref` keyword and the integer offset that follows it.
    fn find_startxref(source: &mut S, config: &Config) -> Result<u64> {
        let len = source.length()?;
        let window = (config.eof_lookup_range as u64).min(len);
        let start = len - window;
        source.seek(start)?;
        let mut buf = vec![0u8; window as usize];
        source.read_into(&mut buf)?;

        let marker_pos = find_subslice_last(&buf, b"startxref").ok_or_else(|| {
            Error::CorruptXref {
                reason: "'startxref' not found within eof_lookup_range".to_string(),
                offset: start,
            }
        })?;

        let mut rest = &buf[marker_pos + b"startxref".len()..];
        while let Some(&b) = rest.first() {
            if b.is_ascii_whitespace() {
                rest = &rest[1..];
            } else {
                break;
            }
        }
        let digit_end = rest.iter().position(|b| !b.is_ascii_digit()).unwrap_or(rest.len());
        let digits = &rest[..digit_end];
        if digits.is_empty() {
            return Err(Error::CorruptXref {
                reason: "no integer offset following 'startxref'".to_string(),
                offset: start + marker_pos as u64,
            });
        }
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::CorruptXref {
                reason: "malformed 'startxref' offset".to_string(),
                offset: start + marker_pos as u64,
            })
    }

    /// Where `key` resolves to, without reading or decoding anything.
    pub fn lookup(&self, key: ObjectKey) -> ResolvedLocation {
        match self.xref.get(&key) {
            Some(XrefEntry::InUse { offset_in_file, generation }) => {
                ResolvedLocation::Direct { offset: *offset_in_file, generation: *generation }
            },
            Some(XrefEntry::Compressed { containing_stream_object_number, index_within_stream }) => {
                ResolvedLocation::Compressed {
                    containing_stream_object_number: *containing_stream_object_number,
                    index_within_stream: *index_within_stream,
                }
            },
            Some(XrefEntry::Free { .. }) | None => ResolvedLocation::Free,
        }
    }

    /// Read and fully parse the object at `key`. `Null` for a free slot or a
    /// key absent from the index, matching how missing indirect references
    /// behave elsewhere in the object model.
    pub fn read_object(&mut self, key: ObjectKey) -> Result<Object> {
        match self.lookup(key) {
            ResolvedLocation::Direct { offset, .. } => self.read_direct_object(offset),
            ResolvedLocation::Compressed { containing_stream_object_number, .. } => {
                self.read_compressed_object(containing_stream_object_number, key.number)
            },
            ResolvedLocation::Free => Ok(Object::Null),
        }
    }

    fn read_direct_object(&mut self, offset: u64) -> Result<Object> {
        self.source.seek(offset)?;
        {
            let mut tr = TokenReader::new(&mut self.source);
            tr.read_object_header()?;
        }
        let header_end = self.source.position()?;

        let total_len = self.source.length()?;
        let window = total_len.saturating_sub(header_end);
        self.source.seek(header_end)?;
        let mut buf = vec![0u8; window as usize];
        self.source.read_into(&mut buf)?;

        let (obj, _rest) = DictionaryParser::parse_direct(&buf)?;
        Ok(obj)
    }

    fn read_compressed_object(
        &mut self,
        containing_stream_object_number: u32,
        object_number: u32,
    ) -> Result<Object> {
        let container_key = self
            .xref
            .keys()
            .find(|k| k.number == containing_stream_object_number)
            .copied()
            .ok_or(Error::ObjectNotFound(containing_stream_object_number, 0))?;

        let stream_obj = self.read_object(container_key)?;
        let mut objects = parse_object_stream(&stream_obj)?;

        // ObjStm entries are looked up by object number, not stream index;
        // the index is only needed by incremental-save collaborators that
        // must rewrite the /First-relative pair table, out of scope here.
        objects
            .remove(&object_number)
            .ok_or(Error::ObjectNotFound(object_number, 0))
    }

    /// The resolved trailer dictionary.
    pub fn trailer(&self) -> &HashMap<String, Object> {
        &self.trailer
    }

    /// The `/Root` key, if present and a valid reference.
    pub fn root_key(&self) -> Option<ObjectKey> {
        self.trailer.get("Root").and_then(|o| o.as_reference()).map(ObjectKey::from)
    }

    /// The `/Info` key, if present.
    pub fn info_key(&self) -> Option<ObjectKey> {
        self.trailer.get("Info").and_then(|o| o.as_reference()).map(ObjectKey::from)
    }

    /// The `/Encrypt` key, if present.
    pub fn encrypt_key(&self) -> Option<ObjectKey> {
        self.trailer.get("Encrypt").and_then(|o| o.as_reference()).map(ObjectKey::from)
    }

    /// The `/ID` array, if present.
    pub fn id(&self) -> Option<&Object> {
        self.trailer.get("ID")
    }

    /// Highest object number seen across the resolved directory.
    pub fn highest_object_number(&self) -> u32 {
        self.highest_object_number
    }

    /// `Pdf` or `Fdf`, as determined from the header marker.
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// The `(major, minor)` version from the header.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Release the backing source's resources (temp files, file handles).
    pub fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}

impl<S: RandomSource> Drop for DocumentIndex<S> {
    fn drop(&mut self) {
        let _ = self.source.close();
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn find_subslice_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
