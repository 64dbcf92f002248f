//! Block engine: composes header parsing, the predictor bank + HCOMP
//! VM, the arithmetic coder, the post-processor, and segment framing
//! into one independently decodable unit.

pub mod header;
pub mod postproc;
pub mod segment;

use tracing::instrument;

pub use header::{BlockHeader, LOCATOR_TAG};
pub use segment::SegmentMeta;

use crate::error::{ArchiveError, FormatError, IntegrityError};

/// One parsed block: its header plus every segment's metadata and fully
/// post-processed (decompressed) bytes.
#[derive(Debug, Clone)]
pub struct Block {
    pub header: BlockHeader,
    pub segments: Vec<(SegmentMeta, Vec<u8>)>,
}

/// Serialize a full block (optionally prefixed by the locator tag) from
/// a header and a list of `(metadata, pcomp program, post-processed
/// bytes)` segments. One [`segment::SegmentCodec`] is shared across all
/// segments so the predictor bank and HCOMP VM carry their state
/// forward; each segment still starts its own arithmetic coder.
#[instrument(skip_all)]
pub fn write_block(
    header: &BlockHeader,
    segments: &[(SegmentMeta, Option<&[u8]>, &[u8])],
    with_locator_tag: bool,
) -> Result<Vec<u8>, FormatError> {
    let mut out = Vec::new();
    if with_locator_tag {
        out.extend_from_slice(&LOCATOR_TAG);
    }
    out.extend_from_slice(&header.write());
    let mut codec = segment::SegmentCodec::new(header)?;
    for (meta, pcomp, data) in segments {
        let plain = postproc::join_selector(*pcomp, data);
        let payload = codec.encode_segment(&plain);
        let mut meta = meta.clone();
        if meta.sha1.is_none() {
            meta.sha1 = Some(segment::sha1_of(data));
        }
        segment::write_segment(&mut out, &meta, &payload);
    }
    out.push(0xFF);
    Ok(out)
}

/// Find the next candidate block start at or after `from`: either the
/// 13-byte locator tag, or (lacking one) the literal `"zPQ"` prelude
/// bytes the real per-block rolling-hash signature is constructed to
/// make immediately follow it. A block with no valid signature before
/// EOF is the caller's cue to stop scanning, not an error.
pub fn find_block_start(data: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i < data.len() {
        if data[i..].starts_with(&LOCATOR_TAG) {
            return Some(i + LOCATOR_TAG.len());
        }
        if data[i..].starts_with(b"zPQ") {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Parse one block starting at `data[at]` (pointing at `'z'`, after any
/// locator tag has already been skipped by the caller). Returns the
/// block and the offset just past its `0xFF` terminator.
#[instrument(skip_all)]
pub fn read_block(data: &[u8], at: usize) -> Result<(Block, usize), ArchiveError> {
    let (header, header_len) = BlockHeader::parse(&data[at..])?;
    let mut pos = at + header_len;
    let mut segments = Vec::new();
    let mut codec = segment::SegmentCodec::new(&header)?;

    loop {
        match data.get(pos) {
            Some(0xFF) => {
                pos += 1;
                break;
            }
            Some(0x01) => {
                let (meta, plain, consumed) = segment::read_segment(&data[pos..], &mut codec)?;
                let (pcomp, rest) = postproc::split_selector(&plain)?;
                let final_bytes = match pcomp {
                    None => rest.to_vec(),
                    Some(prog) => postproc::run_postprocessor(&prog, header.ph, header.pm, rest)
                        .map_err(ArchiveError::from)?,
                };
                if let Some(expected) = meta.sha1 {
                    let actual = segment::sha1_of(&final_bytes);
                    if actual != expected {
                        return Err(IntegrityError::SegmentHashMismatch { expected, actual }.into());
                    }
                }
                segments.push((meta, final_bytes));
                pos += consumed;
            }
            _ => return Err(FormatError::MissingBlockTerminator.into()),
        }
    }

    Ok((Block { header, segments }, pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::components::ComponentSpec;

    fn simple_header() -> BlockHeader {
        BlockHeader {
            level: 1,
            vm_type: 1,
            hh: 2,
            hm: 2,
            ph: 0,
            pm: 0,
            components: vec![ComponentSpec::Icm { s: 6 }],
            hcomp: vec![0x00],
        }
    }

    #[test]
    fn writes_and_reads_back_a_single_segment_block() {
        let header = simple_header();
        let data = b"hello, block!".to_vec();
        let segs = [(SegmentMeta { filename: Some("a".into()), comment: None, sha1: None }, None, data.as_slice())];
        let bytes = write_block(&header, &segs, true).unwrap();

        let start = find_block_start(&bytes, 0).unwrap();
        let (block, end) = read_block(&bytes, start).unwrap();
        assert_eq!(end, bytes.len());
        assert_eq!(block.segments.len(), 1);
        assert_eq!(block.segments[0].1, data);
    }

    #[test]
    fn multi_segment_block_preserves_append_order() {
        let header = simple_header();
        let a = b"first".to_vec();
        let b = b"second".to_vec();
        let segs = [
            (SegmentMeta::default(), None, a.as_slice()),
            (SegmentMeta::default(), None, b.as_slice()),
        ];
        let bytes = write_block(&header, &segs, false).unwrap();
        let (block, _) = read_block(&bytes, 0).unwrap();
        assert_eq!(block.segments[0].1, a);
        assert_eq!(block.segments[1].1, b);
    }

    #[test]
    fn scanner_skips_garbage_before_the_signature() {
        let header = simple_header();
        let data = b"payload".to_vec();
        let segs = [(SegmentMeta::default(), None, data.as_slice())];
        let mut bytes = vec![0xAA; 37];
        bytes.extend(write_block(&header, &segs, false).unwrap());
        let start = find_block_start(&bytes, 0).unwrap();
        assert_eq!(start, 37);
        let (block, _) = read_block(&bytes, start).unwrap();
        assert_eq!(block.segments[0].1, data);
    }

    #[test]
    fn no_signature_before_eof_returns_none() {
        let bytes = vec![1u8, 2, 3, 4, 5];
        assert_eq!(find_block_start(&bytes, 0), None);
    }
}
