//! Block header parsing/writing: the fixed 7-byte prelude, the five
//! sizing parameters, the component descriptor list, and the HCOMP
//! bytecode, with the "declared sections sum to the declared header
//! length" invariant enforced on both read and write.

use crate::error::FormatError;
use crate::predictor::components::ComponentSpec;

pub const LOCATOR_TAG: [u8; 13] = [
    0x37, 0x6B, 0x53, 0x74, 0xA0, 0x31, 0x83, 0xD3, 0x8C, 0xB2, 0x28, 0xB0, 0xD3,
];

#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub level: u8,
    pub vm_type: u8,
    pub hh: u8,
    pub hm: u8,
    pub ph: u8,
    pub pm: u8,
    pub components: Vec<ComponentSpec>,
    pub hcomp: Vec<u8>,
}

fn component_descriptor_len(spec: &ComponentSpec) -> usize {
    1 + spec.param_len()
}

fn write_component(buf: &mut Vec<u8>, spec: &ComponentSpec) {
    buf.push(spec.type_byte());
    match *spec {
        ComponentSpec::Const { c } => buf.push(c),
        ComponentSpec::Cm { s, limit } => buf.extend_from_slice(&[s, limit]),
        ComponentSpec::Icm { s } => buf.push(s),
        ComponentSpec::Match { s, b } => buf.extend_from_slice(&[s, b]),
        ComponentSpec::Avg { j, k, wt } => buf.extend_from_slice(&[j, k, wt]),
        ComponentSpec::Mix2 { s, j, k, rate, mask } => buf.extend_from_slice(&[s, j, k, rate, mask]),
        ComponentSpec::Mix { s, j, m, rate, mask } => buf.extend_from_slice(&[s, j, m, rate, mask]),
        ComponentSpec::Isse { s, j } => buf.extend_from_slice(&[s, j]),
        ComponentSpec::Sse { s, j, start, limit } => buf.extend_from_slice(&[s, j, start, limit]),
    }
}

fn parse_component(type_byte: u8, bytes: &[u8]) -> Result<ComponentSpec, FormatError> {
    let get = |i: usize| -> u8 { bytes.get(i).copied().unwrap_or(0) };
    Ok(match type_byte {
        0 => ComponentSpec::Const { c: get(0) },
        1 => ComponentSpec::Cm { s: get(0), limit: get(1) },
        2 => ComponentSpec::Icm { s: get(0) },
        3 => ComponentSpec::Match { s: get(0), b: get(1) },
        4 => ComponentSpec::Avg { j: get(0), k: get(1), wt: get(2) },
        5 => ComponentSpec::Mix2 { s: get(0), j: get(1), k: get(2), rate: get(3), mask: get(4) },
        6 => ComponentSpec::Mix { s: get(0), j: get(1), m: get(2), rate: get(3), mask: get(4) },
        7 => ComponentSpec::Isse { s: get(0), j: get(1) },
        8 => ComponentSpec::Sse { s: get(0), j: get(1), start: get(2), limit: get(3) },
        other => return Err(FormatError::UnknownComponent(other)),
    })
}

impl BlockHeader {
    /// Serialize the prelude (`'z','P','Q',level,vmType`) plus everything
    /// through the HCOMP-end terminator. Does not include the locator tag
    /// or any segments.
    pub fn write(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(self.hh);
        body.push(self.hm);
        body.push(self.ph);
        body.push(self.pm);
        body.push(self.components.len() as u8);
        for spec in &self.components {
            write_component(&mut body, spec);
        }
        body.push(0x00); // COMP end
        body.extend_from_slice(&self.hcomp);
        body.push(0x00); // HCOMP end

        let hsize = body.len() as u16;
        let mut out = Vec::with_capacity(body.len() + 7);
        out.extend_from_slice(b"zPQ");
        out.push(self.level);
        out.push(self.vm_type);
        out.extend_from_slice(&hsize.to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Parse a header from `data` starting right at `'z'`. Returns the
    /// header and the number of bytes consumed (prelude + hsize field +
    /// body), i.e. the offset of the first segment's `0x01` byte.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), FormatError> {
        if data.len() < 7 || &data[0..3] != b"zPQ" {
            return Err(FormatError::UnsupportedLevel(0));
        }
        let level = data[3];
        if level != 1 && level != 2 {
            return Err(FormatError::UnsupportedLevel(level));
        }
        let vm_type = data[4];
        let hsize = u16::from_le_bytes([data[5], data[6]]) as usize;
        let body = data
            .get(7..7 + hsize)
            .ok_or(FormatError::HeaderSizeMismatch { declared: hsize, actual: data.len().saturating_sub(7) })?;

        let hh = body[0];
        let hm = body[1];
        let ph = body[2];
        let pm = body[3];
        let n = body[4] as usize;

        let mut pos = 5usize;
        let mut components = Vec::with_capacity(n);
        for i in 0..n {
            let type_byte = *body
                .get(pos)
                .ok_or(FormatError::HeaderSizeMismatch { declared: hsize, actual: pos })?;
            pos += 1;
            let spec = parse_component(type_byte, &body[pos..])?;
            let plen = component_descriptor_len(&spec) - 1;
            for j in spec.inputs() {
                if j as usize >= i {
                    return Err(FormatError::BadComponentReference { index: i, target: j as usize });
                }
            }
            pos += plen;
            components.push(spec);
        }

        if body.get(pos) != Some(&0x00) {
            return Err(FormatError::HeaderSizeMismatch { declared: hsize, actual: pos });
        }
        pos += 1;

        if hsize < pos + 1 {
            return Err(FormatError::HeaderSizeMismatch { declared: hsize, actual: pos });
        }
        let hcomp_len = hsize - pos - 1;
        let hcomp = body
            .get(pos..pos + hcomp_len)
            .ok_or(FormatError::HeaderSizeMismatch { declared: hsize, actual: pos + hcomp_len })?
            .to_vec();
        pos += hcomp_len;

        if body.get(pos) != Some(&0x00) {
            return Err(FormatError::MissingBlockTerminator);
        }

        Ok((
            Self { level, vm_type, hh, hm, ph, pm, components, hcomp },
            7 + hsize,
        ))
    }
}
