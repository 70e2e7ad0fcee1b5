//! Finds `startxref`, walks the `/Prev` chain, and validates the offsets it
//! collects (§4.5).
//!
//! This is the component that ties `TokenReader`, `DictionaryParser`,
//! `XrefStreamCodec`, `XrefTrailerResolver` and `BruteForceIndexer`
//! together into the single pipeline `DocumentIndex::open` drives.

use crate::brute_force::{self, BruteForceIndexer};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectKey};
use crate::parser::DictionaryParser;
use crate::source::RandomSource;
use crate::token_reader::TokenReader;
use crate::xref::{Directory, XrefEntry, XrefKind, XrefTrailerResolver};
use crate::xref_stream::XrefStreamCodec;
use std::collections::HashMap;

/// Locates, parses, and validates the cross-reference chain of one document.
pub struct XrefParser<'a, S: RandomSource> {
    source: &'a mut S,
    config: Config,
}

impl<'a, S: RandomSource> XrefParser<'a, S> {
    pub fn new(source: &'a mut S, config: Config) -> Self {
        Self { source, config }
    }

    /// Read the whole backing source into memory, bounded by
    /// `config.max_brute_force_bytes` (0 means no cap). `BruteForceIndexer`
    /// and the trailer-dictionary fallback both need a full-file byte view
    /// rather than a seek-and-tokenize one.
    fn read_all(&mut self) -> Result<Vec<u8>> {
        self.source.seek(0)?;
        let len = self.source.length()?;
        let cap = if self.config.max_brute_force_bytes == 0 {
            len
        } else {
            len.min(self.config.max_brute_force_bytes as u64)
        };
        let mut buf = vec![0u8; cap as usize];
        self.source.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Run the full pipeline starting from `start_offset` (the value read
    /// from `startxref`), returning the published `Directory`.
    pub fn parse_xref(&mut self, start_offset: u64) -> Result<Directory> {
        let mut resolver = XrefTrailerResolver::new();
        let mut start = self.check_xref_offset(start_offset)?;
        let mut visited = std::collections::HashSet::new();
        visited.insert(start);
        let mut has_hybrid_xref = false;

        loop {
            self.source.seek(start)?;
            let mut tr = TokenReader::new(self.source);
            tr.skip_spaces()?;
            let next = self.source.peek()?;

            let prev = match next {
                Some(b'x') => {
                    let trailer_dict = self.parse_xref_table_section(start, &mut resolver)?;
                    if let Some(xrefstm_offset) =
                        trailer_dict.get("XRefStm").and_then(|o| o.as_integer())
                    {
                        let xrefstm_offset = xrefstm_offset.max(0) as u64;
                        if let Ok(fixed) = self.check_xref_stream_offset(xrefstm_offset) {
                            self.parse_xref_obj_stream(fixed, start, &mut resolver)?;
                            has_hybrid_xref = true;
                        }
                    }
                    trailer_dict.get("Prev").and_then(|o| o.as_integer())
                },
                _ => {
                    let trailer_dict = self.parse_xref_obj_stream(start, start, &mut resolver)?;
                    trailer_dict.get("Prev").and_then(|o| o.as_integer())
                },
            };

            match prev {
                Some(p) => {
                    let p = p.max(0) as u64;
                    let fixed = self.check_xref_offset(p).unwrap_or(p);
                    if visited.contains(&fixed) {
                        log::warn!("/Prev loop at offset {} while walking xref chain", fixed);
                        return Err(Error::LoopDetected { offset: fixed });
                    }
                    if visited.len() >= self.config.max_prev_chain_len {
                        log::warn!("/Prev chain exceeded configured maximum; stopping");
                        break;
                    }
                    visited.insert(fixed);
                    start = fixed;
                },
                None => break,
            }
        }

        resolver.set_startxref(start_offset);
        let mut directory = resolver.into_resolved().unwrap_or_else(|| Directory {
            trailer: HashMap::new(),
            xref: HashMap::new(),
            startxref: start_offset,
            highest_object_number: 0,
            is_xref_stream: false,
            has_hybrid_xref: false,
        });
        directory.has_hybrid_xref = has_hybrid_xref;

        self.validate_xref_offsets(&mut directory)?;
        directory.recompute_highest_object_number();
        Ok(directory)
    }

    /// Confirm `offset` actually begins a classic `xref` table. If not, try
    /// treating it as an xref stream header instead. If neither holds and
    /// `offset > 0`, fall back to a brute-force scan for the nearest `xref`
    /// marker.
    pub fn check_xref_offset(&mut self, offset: u64) -> Result<u64> {
        if self.source.length()? == 0 {
            return Err(Error::CorruptXref { reason: "empty source".to_string(), offset });
        }
        if self.looks_like_xref_table(offset)? || self.check_xref_stream_offset(offset).is_ok() {
            return Ok(offset);
        }
        if offset > 0 {
            let data = self.read_all()?;
            let indexer = BruteForceIndexer::new(&data);
            if let Some(fixed) = indexer.bf_search_for_xref(offset) {
                log::warn!("startxref {} did not resolve; using brute-force match {}", offset, fixed);
                return Ok(fixed);
            }
        }
        Ok(0)
    }

    fn looks_like_xref_table(&mut self, offset: u64) -> Result<bool> {
        if self.source.seek(offset).is_err() {
            return Ok(false);
        }
        let mut tr = TokenReader::new(self.source);
        if tr.skip_spaces().is_err() {
            return Ok(false);
        }
        tr.is_string(b"xref")
    }

    /// Confirm `offset` begins an xref **stream**: an `n g obj` header whose
    /// dictionary carries `/Type /XRef`.
    pub fn check_xref_stream_offset(&mut self, offset: u64) -> Result<u64> {
        self.source.seek(offset)?;
        let mut tr = TokenReader::new(self.source);
        let (_n, _g) = tr.read_object_header()?;
        tr.skip_spaces()?;
        if !tr.is_string(b"<<")? {
            return Err(Error::CorruptXref {
                reason: "expected dictionary after object header".to_string(),
                offset,
            });
        }
        let rest = self.slice_object_bytes(offset)?;
        let (obj, _) = DictionaryParser::parse_direct(&rest)?;
        match &obj {
            Object::Dictionary(d) | Object::Stream { dict: d, .. } => {
                match d.get("Type").and_then(|o| o.as_name()) {
                    Some("XRef") => Ok(offset),
                    _ => Err(Error::CorruptXref {
                        reason: "not an xref stream".to_string(),
                        offset,
                    }),
                }
            },
            _ => Err(Error::CorruptXref { reason: "not a dictionary".to_string(), offset }),
        }
    }

    /// Read every remaining byte starting at `offset`. Streams carry their
    /// own `/Length`, so `DictionaryParser`/`parse_object` only ever consume
    /// as much of this as the dictionary (plus, for a stream, its declared
    /// data) actually needs.
    fn slice_object_bytes(&mut self, offset: u64) -> Result<Vec<u8>> {
        let total_len = self.source.length()?;
        let window = total_len.saturating_sub(offset);
        self.source.seek(offset)?;
        let mut buf = vec![0u8; window as usize];
        self.source.read_into(&mut buf)?;
        Ok(buf)
    }

    fn parse_xref_table_section(
        &mut self,
        start: u64,
        resolver: &mut XrefTrailerResolver,
    ) -> Result<HashMap<String, Object>> {
        self.source.seek(start)?;
        let mut tr = TokenReader::new(self.source);
        tr.skip_spaces()?;
        if !tr.consume_string(b"xref")? {
            return Err(Error::CorruptXref { reason: "missing 'xref' keyword".to_string(), offset: start });
        }

        let mut handle = resolver.next_xref_section(start, XrefKind::Table);
        loop {
            let mut tr = TokenReader::new(self.source);
            tr.skip_spaces()?;
            if tr.is_string(b"trailer")? {
                break;
            }
            if self.source.peek()?.is_none() {
                break;
            }

            let subsection_start = self.source.position()?;
            if self.try_parse_xref_subsection(&mut handle).is_err() {
                // RegisSTAR quirk (§4.2): some generators leave stray
                // digit lines between the last real entry and `trailer`.
                // Rewind past whatever we half-consumed and skip forward
                // line-by-line until `trailer` actually surfaces.
                self.source.seek(subsection_start)?;
                self.skip_lines_until_trailer()?;
                break;
            }
        }

        let trailer_dict = self.parse_trailer_dict()?;
        if let Object::Dictionary(d) = &trailer_dict {
            handle.set_trailer(Object::Dictionary(d.clone()));
            Ok(d.clone())
        } else {
            Err(Error::MissingTrailer("trailer is not a dictionary".to_string()))
        }
    }

    /// Parse one `<first> <count>` subsection and its `count` entry lines,
    /// feeding each into `handle`. Returns an error at the first sign the
    /// bytes don't actually form a subsection, which the caller treats as
    /// the RegisSTAR-quirk signal to stop trusting this region of the file.
    fn try_parse_xref_subsection(&mut self, handle: &mut crate::xref::SectionHandle<'_>) -> Result<()> {
        let first_obj_num = {
            let mut tr = TokenReader::new(self.source);
            tr.read_object_number()?
        };
        let count = {
            let mut tr = TokenReader::new(self.source);
            tr.read_object_number()?
        };

        for i in 0..count {
            // Classic xref lines are fixed-width (10-digit offset,
            // 5-digit generation), but malformed files sometimes use a
            // looser single-space layout; reading integer tokens
            // tolerates both.
            let offset = {
                let mut tr = TokenReader::new(self.source);
                tr.read_object_number()? as u64
            };
            let generation = {
                let mut tr = TokenReader::new(self.source);
                tr.read_generation_number()?
            };
            {
                let mut tr = TokenReader::new(self.source);
                tr.skip_spaces()?;
            }
            let mut marker = self.source.read()?;

            // Known corruption: an extra numeric field wedged between the
            // generation and the n/f marker ("XXXX XXX XX n"). Consume the
            // stray digit run and re-read the real marker rather than
            // rejecting the line outright.
            if matches!(marker, Some(b) if b.is_ascii_digit()) {
                while matches!(self.source.peek()?, Some(b) if b.is_ascii_digit()) {
                    self.source.read()?;
                }
                let mut tr = TokenReader::new(self.source);
                tr.skip_spaces()?;
                marker = self.source.read()?;
            }

            let key = ObjectKey::new(first_obj_num + i, generation);
            match marker {
                Some(b'n') => {
                    handle.set_xref(key, XrefEntry::InUse { offset_in_file: offset, generation })
                },
                Some(b'f') => handle.set_xref(
                    key,
                    XrefEntry::Free { next_free_number: offset as u32, next_generation: generation },
                ),
                _ => {
                    return Err(Error::Malformed {
                        location: "xref table entry".to_string(),
                        detail: "expected 'n' or 'f'".to_string(),
                    })
                },
            }
        }
        Ok(())
    }

    /// §4.2's RegisSTAR-quirk recovery: read and discard whole lines until
    /// one starts with the literal `trailer` keyword.
    fn skip_lines_until_trailer(&mut self) -> Result<()> {
        loop {
            let mut tr = TokenReader::new(self.source);
            tr.skip_spaces()?;
            if tr.is_string(b"trailer")? {
                return Ok(());
            }
            if self.source.peek()?.is_none() {
                return Err(Error::MissingTrailer(
                    "no 'trailer' keyword found after xref entries".to_string(),
                ));
            }
            let mut tr = TokenReader::new(self.source);
            tr.read_line()?;
        }
    }

    fn parse_trailer_dict(&mut self) -> Result<Object> {
        let mut tr = TokenReader::new(self.source);
        tr.skip_spaces()?;
        if !tr.consume_string(b"trailer")? {
            return Err(Error::MissingTrailer("expected 'trailer' keyword".to_string()));
        }
        tr.skip_spaces()?;
        let pos = self.source.position()?;
        let bytes = self.slice_object_bytes(pos)?;
        let (obj, rest) = DictionaryParser::parse_direct(&bytes)?;
        let consumed = bytes.len() - rest.len();
        self.source.seek(pos + consumed as u64)?;
        Ok(obj)
    }

    /// Parse an xref stream at `start`: reads the `n g obj` header, the
    /// stream dictionary and data, decodes it via `XrefStreamCodec`, and
    /// feeds the resulting entries to the resolver under `section_key`.
    ///
    /// For a standalone xref stream, `section_key == start`: the stream is
    /// its own section, discoverable by its own byte offset during the
    /// `/Prev` walk. For a hybrid file's `/XRefStm`, `section_key` is the
    /// *table's* start offset instead — its entries merge into the table's
    /// own section so `SectionHandle::set_xref`'s insert-only-if-absent
    /// rule makes the table win key-for-key, while keys the table never
    /// mentioned still come through from the stream (§4.5, §8 scenario 3).
    fn parse_xref_obj_stream(
        &mut self,
        start: u64,
        section_key: u64,
        resolver: &mut XrefTrailerResolver,
    ) -> Result<HashMap<String, Object>> {
        let bytes = self.slice_object_bytes(start)?;
        self.source.seek(start)?;
        {
            let mut tr = TokenReader::new(self.source);
            tr.read_object_header()?;
        }
        let header_consumed = (self.source.position()? - start) as usize;

        let (obj, _rest) = DictionaryParser::parse_direct(&bytes[header_consumed..])?;
        let (dict, raw_data) = match obj {
            Object::Stream { dict, data } => (dict, data),
            _ => {
                return Err(Error::CorruptXref {
                    reason: "xref stream object has no stream data".to_string(),
                    offset: start,
                })
            },
        };

        let entries = XrefStreamCodec::decode(&dict, &raw_data)?;
        let mut handle = resolver.next_xref_section(section_key, XrefKind::Stream);
        for (key, entry) in entries {
            handle.set_xref(key, entry);
        }
        if section_key == start {
            handle.set_trailer(Object::Dictionary(dict.clone()));
        }
        Ok(dict)
    }

    /// For every `InUse` entry, seek to its claimed offset and confirm the
    /// `n g obj` header there matches (§4.5 step 5). Three outcomes, applied
    /// per entry before any whole-table fallback is considered:
    ///
    /// - object number and generation agree (generation possibly needing a
    ///   rewrite to a larger observed value): the entry stands;
    /// - object number disagrees: the entry is individually corrected to
    ///   point the *observed* key at the claimed offset, unless a 10-byte
    ///   reverse scan finds another header crowding the same bytes, in
    ///   which case the entry is dropped as ambiguous rather than guessed
    ///   at, and unless the observed key already resolves validly
    ///   elsewhere in the table (the existing valid entry wins);
    /// - the offset cannot be read as an object header at all: only this
    ///   case marks the whole table untrustworthy, and the entire `xref`
    ///   map is replaced by a `BruteForceIndexer` reconstruction. A
    ///   single bad direct offset must not discard otherwise-valid
    ///   `Compressed` entries, which a brute-force scan could never
    ///   rediscover on its own (invariant 5, §3).
    fn validate_xref_offsets(&mut self, directory: &mut Directory) -> Result<()> {
        let mut rewrites: Vec<(ObjectKey, ObjectKey)> = Vec::new();
        let mut drops: Vec<ObjectKey> = Vec::new();
        let mut corrections: Vec<(ObjectKey, ObjectKey, u64)> = Vec::new();
        let mut any_invalid = false;
        let mut data_cache: Option<Vec<u8>> = None;

        let keys: Vec<ObjectKey> = directory
            .xref
            .iter()
            .filter_map(|(k, e)| matches!(e, XrefEntry::InUse { .. }).then_some(*k))
            .collect();

        for key in keys {
            let XrefEntry::InUse { offset_in_file, .. } = directory.xref[&key] else { continue };
            match self.read_object_header_at(offset_in_file) {
                Ok((number, generation)) if number == key.number => {
                    if generation > key.generation {
                        rewrites.push((key, ObjectKey::new(number, generation)));
                    }
                },
                Ok((number, generation)) => {
                    if data_cache.is_none() {
                        data_cache = Some(self.read_all()?);
                    }
                    let data = data_cache.as_ref().expect("just populated above");
                    if brute_force::has_object_header_within(data, offset_in_file, 10) {
                        log::warn!(
                            "dropping ambiguous xref entry {:?} at offset {}: another object header is within 10 bytes",
                            key, offset_in_file
                        );
                        drops.push(key);
                    } else {
                        log::warn!(
                            "xref entry {:?} at offset {} actually holds {} {} obj; correcting key",
                            key, offset_in_file, number, generation
                        );
                        corrections.push((key, ObjectKey::new(number, generation), offset_in_file));
                    }
                },
                Err(_) => any_invalid = true,
            }
        }

        for (old_key, new_key) in rewrites {
            if let Some(entry) = directory.xref.remove(&old_key) {
                directory.xref.insert(new_key, entry);
            }
        }

        for key in drops {
            directory.xref.remove(&key);
        }

        for (old_key, corrected_key, offset) in corrections {
            directory.xref.remove(&old_key);
            let already_valid = directory
                .xref
                .get(&corrected_key)
                .map(|e| matches!(e, XrefEntry::InUse { .. }))
                .unwrap_or(false);
            if !already_valid {
                directory.xref.insert(
                    corrected_key,
                    XrefEntry::InUse { offset_in_file: offset, generation: corrected_key.generation },
                );
            }
        }

        if any_invalid {
            log::warn!("one or more xref entries could not be read at all; falling back to brute force");
            let data = self.read_all()?;
            let indexer = BruteForceIndexer::new(&data);
            let recovered = indexer.reconstruct()?;
            directory.xref = recovered.xref;
            for (k, v) in recovered.trailer {
                directory.trailer.entry(k).or_insert(v);
            }
        }

        Ok(())
    }

    fn read_object_header_at(&mut self, offset: u64) -> Result<(u32, u16)> {
        self.source.seek(offset)?;
        let mut tr = TokenReader::new(self.source);
        tr.read_object_header()
    }
}
