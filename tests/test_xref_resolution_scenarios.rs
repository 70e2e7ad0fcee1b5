//! End-to-end xref resolution scenarios, opened through `DocumentIndex`
//! exactly as a collaborator would.

use pdf_xref_index::config::Config;
use pdf_xref_index::document_index::{DocumentIndex, DocumentKind, ResolvedLocation};
use pdf_xref_index::object::ObjectKey;
use pdf_xref_index::source::MemorySource;

fn open(data: &[u8]) -> DocumentIndex<MemorySource> {
    let source = MemorySource::new(data.to_vec());
    DocumentIndex::open(source, Config::default()).expect("document should open")
}

// Scenario 1: minimal valid PDF.
#[test]
fn minimal_valid_pdf_resolves_directly() {
    let data = b"%PDF-1.4\n1 0 obj<<>>endobj\nxref\n0 2\n0000000000 65535 f \n0000000009 00000 n \ntrailer<</Size 2/Root 1 0 R>>\nstartxref\n28\n%%EOF";
    let index = open(data);

    assert_eq!(
        index.lookup(ObjectKey::new(1, 0)),
        ResolvedLocation::Direct { offset: 9, generation: 0 }
    );
    assert_eq!(index.trailer().get("Size").and_then(|o| o.as_integer()), Some(2));
    assert_eq!(index.root_key(), Some(ObjectKey::new(1, 0)));
    assert_eq!(index.highest_object_number(), 1);
    assert_eq!(index.kind(), DocumentKind::Pdf);
}

// Scenario 2: startxref value is off (pointing a few bytes past the real
// `xref` keyword); the parser must recover the real offset by brute-force
// scan and publish the same directory as scenario 1.
#[test]
fn wrong_startxref_is_recovered_via_brute_force_scan() {
    let body = b"%PDF-1.4\n1 0 obj<<>>endobj\nxref\n0 2\n0000000000 65535 f \n0000000009 00000 n \ntrailer<</Size 2/Root 1 0 R>>\n";
    let xref_pos = body.windows(4).position(|w| w == b"xref").unwrap();
    let wrong = xref_pos as u64 + 7;
    let mut data = body.to_vec();
    data.extend_from_slice(format!("startxref\n{}\n%%EOF", wrong).as_bytes());

    let index = open(&data);
    assert_eq!(
        index.lookup(ObjectKey::new(1, 0)),
        ResolvedLocation::Direct { offset: 9, generation: 0 }
    );
}

// Scenario 3: a classic table and, via the trailer's `/XRefStm`, a hybrid
// xref stream both describe the same object; the classic table's entry
// must win (PDFBOX-3506 precedence).
#[test]
fn hybrid_table_entry_wins_over_xrefstm_entry() {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut doc = Vec::new();
    doc.extend_from_slice(b"%PDF-1.5\n");

    let obj7_offset = doc.len() as u64;
    doc.extend_from_slice(b"7 0 obj\n<< /Type /Test >>\nendobj\n");

    // Xref stream claiming object 7 lives at a bogus offset (1000); if the
    // resolver ever let this win, the lookup below would report 1000.
    let mut raw = Vec::new();
    raw.push(1u8); // type 1: in use
    raw.extend_from_slice(&1000u32.to_be_bytes());
    raw.push(0u8); // generation
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&raw).unwrap();
    let compressed = enc.finish().unwrap();

    let stream_obj_offset = doc.len() as u64;
    doc.extend_from_slice(
        format!(
            "9 0 obj\n<< /Type /XRef /Size 8 /W [1 4 1] /Index [7 1] /Filter /FlateDecode /Length {} >>\nstream\n",
            compressed.len()
        )
        .as_bytes(),
    );
    doc.extend_from_slice(&compressed);
    doc.extend_from_slice(b"\nendstream\nendobj\n");

    let table_start = doc.len() as u64;
    doc.extend_from_slice(b"xref\n0 8\n");
    for i in 0u32..8 {
        if i == 7 {
            doc.extend_from_slice(format!("{:010} {:05} n \n", obj7_offset, 0).as_bytes());
        } else {
            doc.extend_from_slice(
                format!("{:010} {:05} f \n", 0, if i == 0 { 65535 } else { 0 }).as_bytes(),
            );
        }
    }
    doc.extend_from_slice(
        format!(
            "trailer\n<< /Size 8 /Root 7 0 R /XRefStm {} >>\nstartxref\n{}\n%%EOF",
            stream_obj_offset, table_start
        )
        .as_bytes(),
    );

    let index = open(&doc);
    match index.lookup(ObjectKey::new(7, 0)) {
        ResolvedLocation::Direct { offset, .. } => {
            assert_eq!(offset, obj7_offset, "classic table entry must win over /XRefStm's");
        },
        other => panic!("expected a direct entry from the classic table, got {:?}", other),
    }
}

// Scenario 4: two xref sections whose `/Prev` pointers form a 2-cycle must
// not hang `DocumentIndex::open` — it must return (successfully or with an
// error) rather than looping forever.
#[test]
fn prev_loop_terminates_instead_of_hanging() {
    let mut doc = Vec::new();
    doc.extend_from_slice(b"%PDF-1.4\n1 0 obj<<>>endobj\n");

    // We need each section's `/Prev` to name the other's start offset, so
    // lay out section B first with a placeholder, patch it once section A's
    // real offset is known, then rebuild section A pointing at B.
    let section_a_start = doc.len() as u64;
    // Reserve a fixed-width decimal field for `/Prev` so patching in place
    // doesn't shift any byte offsets computed below.
    const PREV_WIDTH: usize = 10;
    doc.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n0000000009 00000 n \n");
    doc.extend_from_slice(b"trailer<</Size 2/Root 1 0 R/Prev ");
    let a_prev_field_pos = doc.len();
    doc.extend_from_slice(format!("{:0width$}", 0, width = PREV_WIDTH).as_bytes());
    doc.extend_from_slice(b">>\n");

    let section_b_start = doc.len() as u64;
    doc.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n0000000009 00000 n \n");
    doc.extend_from_slice(b"trailer<</Size 2/Root 1 0 R/Prev ");
    doc.extend_from_slice(format!("{:0width$}", section_a_start, width = PREV_WIDTH).as_bytes());
    doc.extend_from_slice(b">>\n");

    let patch = format!("{:0width$}", section_b_start, width = PREV_WIDTH);
    doc[a_prev_field_pos..a_prev_field_pos + PREV_WIDTH].copy_from_slice(patch.as_bytes());

    doc.extend_from_slice(format!("startxref\n{}\n%%EOF", section_b_start).as_bytes());

    // Must return promptly (no infinite loop) and fail with `LoopDetected`,
    // per spec §4.5 step 3 and §8 scenario 4.
    let source = MemorySource::new(doc);
    let err = DocumentIndex::open(source, Config::default())
        .expect_err("a /Prev 2-cycle must be reported, not silently resolved");
    assert!(
        matches!(err, pdf_xref_index::error::Error::LoopDetected { .. }),
        "expected LoopDetected, got {:?}",
        err
    );
}

// Scenario 5: an xref entry pointing into a compressed object stream that
// packs more than one object; the right one must come back by object
// number, not by position.
#[test]
fn compressed_entry_resolves_through_object_stream() {
    let obj5 = b"<< /Kind /Five >>";
    let obj6 = b"<< /Kind /Six >>";
    let mut body = Vec::new();
    let off5 = body.len();
    body.extend_from_slice(obj5);
    let off6 = body.len();
    body.extend_from_slice(obj6);

    let header = format!("5 {} 6 {} ", off5, off6);
    let first = header.len() as i64;
    let mut stream_data = header.into_bytes();
    stream_data.extend_from_slice(&body);

    let mut doc = Vec::new();
    doc.extend_from_slice(b"%PDF-1.5\n");
    let objstm_offset = doc.len() as u64;
    doc.extend_from_slice(
        format!(
            "10 0 obj\n<< /Type /ObjStm /N 2 /First {} /Length {} >>\nstream\n",
            first,
            stream_data.len()
        )
        .as_bytes(),
    );
    doc.extend_from_slice(&stream_data);
    doc.extend_from_slice(b"\nendstream\nendobj\n");

    // Xref stream with /Index [5 2 10 1]: records must be laid out in that
    // order — objects 5, 6 (both compressed inside object 10) first, then
    // object 10's own in-use record.
    let mut raw = Vec::new();
    // record width w0=1 w1=4 w2=2
    raw.push(2u8);
    raw.extend_from_slice(&10u32.to_be_bytes());
    raw.extend_from_slice(&0u16.to_be_bytes());
    raw.push(2u8);
    raw.extend_from_slice(&10u32.to_be_bytes());
    raw.extend_from_slice(&1u16.to_be_bytes());
    raw.push(1u8);
    raw.extend_from_slice(&(objstm_offset as u32).to_be_bytes());
    raw.extend_from_slice(&0u16.to_be_bytes());

    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&raw).unwrap();
    let compressed = enc.finish().unwrap();

    let xref_offset = doc.len() as u64;
    doc.extend_from_slice(
        format!(
            "11 0 obj\n<< /Type /XRef /Size 12 /Root 10 0 R /W [1 4 2] /Index [5 2 10 1] /Filter /FlateDecode /Length {} >>\nstream\n",
            compressed.len()
        )
        .as_bytes(),
    );
    doc.extend_from_slice(&compressed);
    doc.extend_from_slice(b"\nendstream\nendobj\n");
    doc.extend_from_slice(format!("startxref\n{}\n%%EOF", xref_offset).as_bytes());

    let mut index = open(&doc);

    match index.lookup(ObjectKey::new(5, 0)) {
        ResolvedLocation::Compressed { containing_stream_object_number, .. } => {
            assert_eq!(containing_stream_object_number, 10);
        },
        other => panic!("expected a compressed entry, got {:?}", other),
    }

    let parsed5 = index.read_object(ObjectKey::new(5, 0)).unwrap();
    assert_eq!(parsed5.as_dict().unwrap().get("Kind").and_then(|o| o.as_name()), Some("Five"));

    let parsed6 = index.read_object(ObjectKey::new(6, 0)).unwrap();
    assert_eq!(parsed6.as_dict().unwrap().get("Kind").and_then(|o| o.as_name()), Some("Six"));
}

// Scenario 6: the xref table claims a stale generation; validation must
// rewrite the key to the generation actually found at the offset, and the
// stale key must no longer resolve.
#[test]
fn stale_generation_is_rewritten_on_validation() {
    let data = b"%PDF-1.4\n3 2 obj<<>>endobj\nxref\n0 4\n0000000000 65535 f \n0000000000 00000 n \n0000000000 00000 n \n0000000009 00000 n \ntrailer<</Size 4/Root 1 0 R>>\nstartxref\n28\n%%EOF";
    let index = open(data);
    assert_eq!(
        index.lookup(ObjectKey::new(3, 2)),
        ResolvedLocation::Direct { offset: 9, generation: 2 }
    );
    assert_eq!(index.lookup(ObjectKey::new(3, 0)), ResolvedLocation::Free);
}
