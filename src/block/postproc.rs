//! The post-processor selector: the first decompressed byte of a block
//! chooses pass-through or a second ZPAQL program (PCOMP) run once per
//! decompressed byte, terminated by an `EOS` call.

use crate::error::FormatError;
use crate::vm::{Role, Vm};

const EOS: u32 = 0xFFFF_FFFF;

/// Split a decompressed plaintext into its selector and the bytes that
/// follow it. Returns `(pcomp_program, rest)`, where
/// `pcomp_program` is `None` for pass-through (selector 0).
pub fn split_selector(plain: &[u8]) -> Result<(Option<Vec<u8>>, &[u8]), FormatError> {
    let selector = *plain.first().ok_or(FormatError::BadPostprocessorSelector(0))?;
    match selector {
        0 => Ok((None, &plain[1..])),
        1 => {
            if plain.len() < 3 {
                return Err(FormatError::BadPostprocessorSelector(1));
            }
            let l = u16::from_le_bytes([plain[1], plain[2]]) as usize;
            let prog_start = 3;
            let prog_end = prog_start
                .checked_add(l)
                .filter(|&e| e <= plain.len())
                .ok_or(FormatError::BadPostprocessorSelector(1))?;
            Ok((Some(plain[prog_start..prog_end].to_vec()), &plain[prog_end..]))
        }
        other => Err(FormatError::BadPostprocessorSelector(other)),
    }
}

/// Build the selector-prefixed plaintext a segment's arithmetic payload
/// actually encodes, given the raw post-processed bytes and an optional
/// PCOMP program.
pub fn join_selector(pcomp: Option<&[u8]>, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 4);
    match pcomp {
        None => {
            out.push(0);
            out.extend_from_slice(data);
        }
        Some(prog) => {
            out.push(1);
            out.extend_from_slice(&(prog.len() as u16).to_le_bytes());
            out.extend_from_slice(prog);
            out.extend_from_slice(data);
        }
    }
    out
}

/// Run `prog` over `raw` one byte at a time (plus a terminal `EOS` call),
/// collecting `OUT`-emitted bytes as the final decompressed output.
pub fn run_postprocessor(prog: &[u8], ph: u8, pm: u8, raw: &[u8]) -> Result<Vec<u8>, crate::error::IntegrityError> {
    let mut vm = Vm::new(Role::Pcomp, ph, pm);
    let mut out = Vec::with_capacity(raw.len());
    for &b in raw {
        vm.run(prog, 0, b as u32, &mut out).map_err(map_vm_err)?;
    }
    vm.run(prog, 0, EOS, &mut out).map_err(map_vm_err)?;
    Ok(out)
}

fn map_vm_err(e: crate::vm::VmError) -> crate::error::IntegrityError {
    use crate::error::IntegrityError as IE;
    use crate::vm::VmError as VE;
    match e {
        VE::JumpOutOfBounds { target, len } => IE::VmJumpOutOfBounds { target, len },
        VE::Error(_) | VE::RanOff | VE::UnknownOpcode(..) => IE::VmError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_through_selector_round_trips() {
        let plain = join_selector(None, b"hello world");
        let (pcomp, rest) = split_selector(&plain).unwrap();
        assert!(pcomp.is_none());
        assert_eq!(rest, b"hello world");
    }

    #[test]
    fn pcomp_selector_round_trips() {
        let prog = vec![0x02, 0x00]; // OUT; HALT (op::OUT=0x02, op::HALT=0x00)
        let plain = join_selector(Some(&prog), b"xy");
        let (got_prog, rest) = split_selector(&plain).unwrap();
        assert_eq!(got_prog.unwrap(), prog);
        assert_eq!(rest, b"xy");
    }

    #[test]
    fn bad_selector_byte_is_fatal() {
        let plain = [7u8, 0, 0];
        assert!(split_selector(&plain).is_err());
    }

    #[test]
    fn identity_pcomp_program_passes_bytes_through() {
        // Also emits one trailing byte for the terminal EOS call.
        let prog = vec![0x02, 0x00];
        let out = run_postprocessor(&prog, 2, 2, b"ab").unwrap();
        assert_eq!(&out[..2], b"ab");
    }
}
