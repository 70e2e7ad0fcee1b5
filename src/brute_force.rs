//! Last-resort reconstruction for xref sections that can't be trusted (§4.8).
//!
//! A linear scan over the whole file for `N G obj` headers, `trailer`
//! dictionaries, and `xref` markers. `XrefParser` reaches for this only
//! after every cheaper strategy — adjusted offset, `/XRefStm` fallback —
//! has failed; results are computed once per `BruteForceIndexer` and held
//! for the lifetime of the open() call that needed them.

use crate::error::{Error, Result};
use crate::object::{Object, ObjectKey};
use crate::parser::parse_object;
use crate::xref::{Directory, XrefEntry};
use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    static ref RE_OBJ_PATTERN: regex::bytes::Regex =
        regex::bytes::Regex::new(r"(\d+)\s+(\d+)\s+obj").unwrap();
    static ref RE_TRAILER: regex::bytes::Regex = regex::bytes::Regex::new(r"trailer\s*<<").unwrap();
    static ref RE_XREF_KEYWORD: regex::bytes::Regex = regex::bytes::Regex::new(r"\bxref\b").unwrap();
}

fn looks_like_object_start(b: u8) -> bool {
    matches!(b, b'<' | b'[' | b'(' | b'/' | b't' | b'f' | b'n' | b'-') || b.is_ascii_digit()
}

/// §4.5 step 5's 10-byte reverse-scan ambiguity check: true if the
/// `lookback` bytes immediately preceding `offset` contain another
/// complete `N G obj` header. When they do, the claimed offset and the
/// nearby header can't both be right, so the caller should drop the
/// entry rather than guess which one is real.
pub(crate) fn has_object_header_within(data: &[u8], offset: u64, lookback: u64) -> bool {
    let offset = offset as usize;
    let window_start = offset.saturating_sub(lookback as usize);
    let Some(window) = data.get(window_start..offset) else { return false };
    RE_OBJ_PATTERN.is_match(window)
}

/// Scans a whole document for `N G obj` headers, `trailer` dictionaries
/// and `xref` markers, independent of any directory already parsed.
pub struct BruteForceIndexer<'a> {
    data: &'a [u8],
    object_offsets: HashMap<ObjectKey, u64>,
    xref_markers: Vec<u64>,
}

impl<'a> BruteForceIndexer<'a> {
    /// Scan `data` once, caching discovered object headers and xref markers.
    pub fn new(data: &'a [u8]) -> Self {
        let object_offsets = Self::scan_object_keys(data);
        let xref_markers = RE_XREF_KEYWORD.find_iter(data).map(|m| m.start() as u64).collect();
        Self { data, object_offsets, xref_markers }
    }

    fn scan_object_keys(data: &[u8]) -> HashMap<ObjectKey, u64> {
        let mut found = HashMap::new();
        for capture in RE_OBJ_PATTERN.captures_iter(data) {
            let full_match = capture.get(0).unwrap();
            let obj_num_bytes = capture.get(1).unwrap().as_bytes();
            let gen_num_bytes = capture.get(2).unwrap().as_bytes();

            let Some(obj_num) =
                std::str::from_utf8(obj_num_bytes).ok().and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };
            let Some(gen_num) =
                std::str::from_utf8(gen_num_bytes).ok().and_then(|s| s.parse::<u16>().ok())
            else {
                continue;
            };

            let offset = full_match.start() as u64;
            let validation_start = full_match.end();
            if let Some(&next_byte) = data[validation_start..]
                .iter()
                .find(|&&b| !b.is_ascii_whitespace())
            {
                if !looks_like_object_start(next_byte) {
                    log::debug!("brute force: skipping false-positive object header at {}", offset);
                    continue;
                }
            }

            found.insert(ObjectKey::new(obj_num, gen_num), offset);
        }
        found
    }

    /// Every `(ObjectKey, absolute_offset)` discovered for an `N G obj` header.
    pub fn bf_search_for_object_keys(&self) -> &HashMap<ObjectKey, u64> {
        &self.object_offsets
    }

    /// The last well-formed trailer dictionary found by a linear scan. Since
    /// the scan is linear, "last by byte position" and "last by scan order"
    /// are the same notion here — later revisions' trailers are expected to
    /// dominate earlier ones.
    pub fn bf_search_for_trailer(&self) -> Option<HashMap<String, Object>> {
        let mut last = None;
        for mat in RE_TRAILER.find_iter(self.data) {
            let dict_start = mat.end() - 2; // rewind onto the `<<`
            if let Ok((obj, _rest)) = parse_object(&self.data[dict_start..]) {
                if let Object::Dictionary(d) = obj {
                    last = Some(d);
                }
            }
        }
        last
    }

    /// The `xref` keyword occurrence closest to `target_offset`.
    pub fn bf_search_for_xref(&self, target_offset: u64) -> Option<u64> {
        self.xref_markers
            .iter()
            .copied()
            .min_by_key(|&pos| pos.abs_diff(target_offset))
    }

    /// Reconstruct a full `Directory` from scratch: every discovered object
    /// becomes an `InUse` entry, and the trailer is whatever
    /// `bf_search_for_trailer` finds (falling back to a minimal trailer built
    /// around the first object whose dictionary carries `/Type /Catalog`).
    pub fn reconstruct(&self) -> Result<Directory> {
        if self.object_offsets.is_empty() {
            return Err(Error::InvalidPdf("no objects found during brute-force scan".to_string()));
        }

        let mut xref = HashMap::new();
        for (key, offset) in &self.object_offsets {
            xref.insert(*key, XrefEntry::InUse { offset_in_file: *offset, generation: key.generation });
        }

        let trailer = match self.bf_search_for_trailer() {
            Some(d) => d,
            None => self.reconstruct_minimal_trailer()?,
        };

        let highest_object_number = xref.keys().map(|k| k.number).max().unwrap_or(0);
        Ok(Directory {
            trailer,
            xref,
            startxref: 0,
            highest_object_number,
            is_xref_stream: false,
            has_hybrid_xref: false,
        })
    }

    fn reconstruct_minimal_trailer(&self) -> Result<HashMap<String, Object>> {
        let mut keys: Vec<&ObjectKey> = self.object_offsets.keys().collect();
        keys.sort_by_key(|k| k.number);

        for key in keys.into_iter().take(200) {
            let offset = self.object_offsets[key];
            if let Some(obj) = self.load_object_at(offset) {
                if is_catalog(&obj) {
                    let mut trailer = HashMap::new();
                    trailer.insert(
                        "Root".to_string(),
                        Object::Reference(crate::object::ObjectRef::new(key.number, key.generation)),
                    );
                    trailer.insert(
                        "Size".to_string(),
                        Object::Integer(self.object_offsets.len() as i64),
                    );
                    return Ok(trailer);
                }
            }
        }

        Err(Error::InvalidPdf("could not find catalog while reconstructing trailer".to_string()))
    }

    fn load_object_at(&self, offset: u64) -> Option<Object> {
        use crate::lexer::token;

        let input = self.data.get(offset as usize..)?;
        let (rest, _) = token(input).ok()?;
        let (rest, _) = token(rest).ok()?;
        let (rest, _) = token(rest).ok()?;
        let (_, obj) = parse_object(rest).ok()?;
        Some(obj)
    }
}

fn is_catalog(obj: &Object) -> bool {
    obj.as_dict()
        .and_then(|d| d.get("Type"))
        .and_then(|t| t.as_name())
        .map(|n| n == "Catalog")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"%PDF-1.4\n\
        1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
        2 0 obj\n<< /Type /Pages /Count 0 /Kids [] >>\nendobj\n\
        trailer\n<< /Root 1 0 R /Size 3 >>\n\
        startxref\n0\n%%EOF";

    #[test]
    fn test_bf_search_for_object_keys_finds_both_objects() {
        let indexer = BruteForceIndexer::new(SAMPLE);
        let found = indexer.bf_search_for_object_keys();
        assert!(found.contains_key(&ObjectKey::new(1, 0)));
        assert!(found.contains_key(&ObjectKey::new(2, 0)));
    }

    #[test]
    fn test_bf_search_for_trailer_finds_dict() {
        let indexer = BruteForceIndexer::new(SAMPLE);
        let trailer = indexer.bf_search_for_trailer().unwrap();
        assert!(trailer.contains_key("Root"));
        assert_eq!(trailer.get("Size").unwrap().as_integer(), Some(3));
    }

    #[test]
    fn test_bf_search_for_xref_finds_closest() {
        let data = b"xref at 0, then more bytes, then xref again far later";
        let indexer = BruteForceIndexer::new(data);
        let pos = indexer.bf_search_for_xref(40).unwrap();
        // Closer of the two "xref" occurrences to offset 40.
        assert!(pos > 0);
    }

    #[test]
    fn test_reconstruct_builds_directory_with_both_objects() {
        let indexer = BruteForceIndexer::new(SAMPLE);
        let dir = indexer.reconstruct().unwrap();
        assert_eq!(dir.xref.len(), 2);
        assert!(dir.trailer.contains_key("Root"));
        assert_eq!(dir.highest_object_number, 2);
    }

    #[test]
    fn test_reconstruct_errors_when_no_objects_found() {
        let indexer = BruteForceIndexer::new(b"not a pdf at all");
        assert!(indexer.reconstruct().is_err());
    }

    #[test]
    fn test_false_positive_object_header_inside_string_is_skipped() {
        // "5 0 obj" followed by something that is not a valid object start
        // (a bare letter) should be rejected.
        let data = b"blah 5 0 obj zzz more text without a real object here";
        let indexer = BruteForceIndexer::new(data);
        assert!(!indexer.bf_search_for_object_keys().contains_key(&ObjectKey::new(5, 0)));
    }

    #[test]
    fn test_has_object_header_within_detects_nearby_header() {
        let data = b"9 0 obj\n<< >>";
        let offset = data.windows(2).position(|w| w == b"<<").unwrap() as u64;
        assert!(has_object_header_within(data, offset, 10));
    }

    #[test]
    fn test_has_object_header_within_false_when_far_away() {
        let data = b"9 0 obj\n                    << >>";
        let offset = data.windows(2).position(|w| w == b"<<").unwrap() as u64;
        assert!(!has_object_header_within(data, offset, 10));
    }
}
