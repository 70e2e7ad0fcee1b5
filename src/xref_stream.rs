//! PDF 1.5 cross-reference **stream** codec (§4.6).
//!
//! An xref stream packs the same three-field records a classic table does
//! (type, offset-or-container, generation-or-index) as fixed-width
//! big-endian integers, described by `/W`, sliced into `/Index` subranges,
//! and compressed with `/FlateDecode` (optionally predictor-filtered). The
//! stream dictionary doubles as the section's trailer.
//!
//! Decoding is used by `XrefParser`; encoding exists for writer
//! collaborators doing incremental save and is exercised by the round-trip
//! property tests below.

use crate::decoders::{decode_stream_with_params, DecodeParams};
use crate::error::{Error, Result};
use crate::object::{Object, ObjectKey};
use crate::xref::XrefEntry;
use std::collections::HashMap;

/// One `(first, count)` run from `/Index` (or the `[0 Size]` default).
type IndexRun = (u32, u32);

fn read_field(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

fn write_field(out: &mut Vec<u8>, value: u64, width: usize) {
    for i in (0..width).rev() {
        out.push(((value >> (8 * i)) & 0xFF) as u8);
    }
}

fn index_runs(dict: &HashMap<String, Object>, size: u32) -> Result<Vec<IndexRun>> {
    let Some(index_obj) = dict.get("Index") else {
        return Ok(vec![(0, size)]);
    };
    let arr = index_obj
        .as_array()
        .ok_or_else(|| Error::InvalidPdf("/Index is not an array".to_string()))?;
    if arr.len() % 2 != 0 {
        return Err(Error::InvalidPdf("/Index must have an even number of elements".to_string()));
    }
    let mut runs = Vec::with_capacity(arr.len() / 2);
    for pair in arr.chunks_exact(2) {
        let first = pair[0]
            .as_integer()
            .ok_or_else(|| Error::InvalidPdf("/Index entry is not an integer".to_string()))?;
        let count = pair[1]
            .as_integer()
            .ok_or_else(|| Error::InvalidPdf("/Index entry is not an integer".to_string()))?;
        runs.push((first.max(0) as u32, count.max(0) as u32));
    }
    Ok(runs)
}

fn extract_decode_params(dict: &HashMap<String, Object>, row_width: usize) -> Option<DecodeParams> {
    let params_dict = match dict.get("DecodeParms") {
        Some(Object::Dictionary(d)) => d,
        Some(Object::Array(arr)) => match arr.first() {
            Some(Object::Dictionary(d)) => d,
            _ => return None,
        },
        _ => return None,
    };
    let predictor = params_dict.get("Predictor").and_then(|o| o.as_integer()).unwrap_or(1);
    let columns =
        params_dict.get("Columns").and_then(|o| o.as_integer()).unwrap_or(row_width as i64) as usize;
    Some(DecodeParams {
        predictor,
        columns,
        colors: 1,
        bits_per_component: 8,
    })
}

/// Decode/encode PDF 1.5 xref streams (§4.6).
pub struct XrefStreamCodec;

impl XrefStreamCodec {
    /// Decode a stream `Object` (already confirmed `/Type /XRef`) into its
    /// entries. The stream dictionary itself is the section trailer —
    /// callers pass it straight to `SectionHandle::set_trailer`.
    pub fn decode(dict: &HashMap<String, Object>, raw_data: &[u8]) -> Result<Vec<(ObjectKey, XrefEntry)>> {
        let w_array = dict
            .get("W")
            .and_then(|o| o.as_array())
            .ok_or_else(|| Error::InvalidPdf("xref stream missing /W".to_string()))?;
        if w_array.len() != 3 {
            return Err(Error::InvalidPdf("/W must have exactly 3 entries".to_string()));
        }
        let widths: Vec<usize> = w_array
            .iter()
            .map(|o| o.as_integer().map(|i| i.max(0) as usize))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::InvalidPdf("/W entries must be integers".to_string()))?;
        let (w0, w1, w2) = (widths[0], widths[1], widths[2]);
        let row_width = w0 + w1 + w2;
        if row_width == 0 {
            return Err(Error::InvalidPdf("/W entries are all zero".to_string()));
        }

        let size = dict
            .get("Size")
            .and_then(|o| o.as_integer())
            .ok_or_else(|| Error::InvalidPdf("xref stream missing /Size".to_string()))?
            .max(0) as u32;

        let runs = index_runs(dict, size)?;

        let filters: Vec<String> = match dict.get("Filter") {
            None => Vec::new(),
            Some(Object::Name(n)) => vec![n.clone()],
            Some(Object::Array(arr)) => {
                arr.iter().filter_map(|o| o.as_name().map(|s| s.to_string())).collect()
            },
            Some(_) => return Err(Error::InvalidPdf("invalid /Filter on xref stream".to_string())),
        };
        for f in &filters {
            if f != "FlateDecode" {
                return Err(Error::Unsupported(format!("xref stream filter /{}", f)));
            }
        }

        let params = extract_decode_params(dict, row_width);
        let data = decode_stream_with_params(raw_data, &filters, params.as_ref())?;

        let mut entries = Vec::new();
        let mut pos = 0usize;
        for (first, count) in runs {
            for i in 0..count {
                if pos + row_width > data.len() {
                    return Err(Error::CorruptXref {
                        reason: "truncated xref stream data".to_string(),
                        offset: pos as u64,
                    });
                }
                let row = &data[pos..pos + row_width];
                pos += row_width;

                let field_type = if w0 > 0 { read_field(&row[0..w0]) } else { 1 };
                let f1 = read_field(&row[w0..w0 + w1]);
                let f2 = read_field(&row[w0 + w1..w0 + w1 + w2]);

                let key = ObjectKey::new(first + i, 0);
                let entry = match field_type {
                    0 => XrefEntry::Free { next_free_number: f1 as u32, next_generation: f2 as u16 },
                    1 => XrefEntry::InUse { offset_in_file: f1, generation: f2 as u16 },
                    2 => XrefEntry::Compressed {
                        containing_stream_object_number: f1 as u32,
                        index_within_stream: f2 as u32,
                    },
                    other => return Err(Error::Unsupported(format!("xref entry type {}", other))),
                };
                entries.push((key, entry));
            }
        }

        Ok(entries)
    }

    /// Compute the minimal byte width needed to represent `max_value`.
    fn minimal_width(max_value: u64) -> usize {
        if max_value == 0 {
            return 1;
        }
        let mut width = 0;
        let mut v = max_value;
        while v > 0 {
            width += 1;
            v >>= 8;
        }
        width
    }

    /// Encode `entries` into a `/Type /XRef` stream dictionary + raw
    /// (uncompressed) row data, symmetric with `decode`. Column widths are
    /// the minimal widths covering the observed maxima; `/Index` is packed
    /// into minimal contiguous runs over the object numbers present.
    pub fn encode(entries: &[(ObjectKey, XrefEntry)]) -> (HashMap<String, Object>, Vec<u8>) {
        let mut sorted: Vec<(ObjectKey, XrefEntry)> = entries.to_vec();
        sorted.sort_by_key(|(k, _)| k.number);

        let (mut max_f1, mut max_f2) = (0u64, 0u64);
        for (_, e) in &sorted {
            let (f1, f2) = match e {
                XrefEntry::Free { next_free_number, next_generation } => {
                    (*next_free_number as u64, *next_generation as u64)
                },
                XrefEntry::InUse { offset_in_file, generation } => (*offset_in_file, *generation as u64),
                XrefEntry::Compressed { containing_stream_object_number, index_within_stream } => {
                    (*containing_stream_object_number as u64, *index_within_stream as u64)
                },
            };
            max_f1 = max_f1.max(f1);
            max_f2 = max_f2.max(f2);
        }
        let w0 = 1usize; // type field always fits in one byte (0, 1, 2)
        let w1 = Self::minimal_width(max_f1);
        let w2 = Self::minimal_width(max_f2);

        let mut data = Vec::new();
        let mut runs: Vec<IndexRun> = Vec::new();
        for (key, entry) in &sorted {
            match runs.last_mut() {
                Some((first, count)) if *first + *count == key.number => *count += 1,
                _ => runs.push((key.number, 1)),
            }

            let (t, f1, f2) = match entry {
                XrefEntry::Free { next_free_number, next_generation } => {
                    (0u64, *next_free_number as u64, *next_generation as u64)
                },
                XrefEntry::InUse { offset_in_file, generation } => (1, *offset_in_file, *generation as u64),
                XrefEntry::Compressed { containing_stream_object_number, index_within_stream } => {
                    (2, *containing_stream_object_number as u64, *index_within_stream as u64)
                },
            };
            write_field(&mut data, t, w0);
            write_field(&mut data, f1, w1);
            write_field(&mut data, f2, w2);
        }

        let index_array: Vec<Object> = runs
            .into_iter()
            .flat_map(|(first, count)| [Object::Integer(first as i64), Object::Integer(count as i64)])
            .collect();

        let mut dict = HashMap::new();
        dict.insert("Type".to_string(), Object::Name("XRef".to_string()));
        dict.insert(
            "Size".to_string(),
            Object::Integer(sorted.iter().map(|(k, _)| k.number as i64 + 1).max().unwrap_or(0)),
        );
        dict.insert(
            "W".to_string(),
            Object::Array(vec![
                Object::Integer(w0 as i64),
                Object::Integer(w1 as i64),
                Object::Integer(w2 as i64),
            ]),
        );
        dict.insert("Index".to_string(), Object::Array(index_array));
        dict.insert("Filter".to_string(), Object::Name("FlateDecode".to_string()));

        (dict, data)
    }
}
