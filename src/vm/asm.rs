//! Writer-side textual ZPAQL assembler.
//!
//! Accepts a small structured dialect — `IF/ELSE/ENDIF`, `DO/WHILE/UNTIL
//! /FOREVER`, and the long variants `IFL/IFNOTL/ELSEL` — and expands it to
//! the linear bytecode [`super::Vm`] executes. This crate only ever
//! assembles its own built-in context-model programs (see
//! `archive::journal_block_header`), so the grammar below is intentionally
//! minimal rather than a full ZPAQL-compatible front end.

use thiserror::Error;

use super::{op, Src};

#[derive(Error, Debug)]
pub enum AsmError {
    #[error("unknown mnemonic {0:?} on line {1}")]
    UnknownMnemonic(String, usize),
    #[error("{0} without matching opener on line {1}")]
    UnmatchedCloser(&'static str, usize),
    #[error("unclosed {0} opened on line {1}")]
    Unclosed(&'static str, usize),
    #[error("short jump on line {0} is out of i8 range ({1}); use the L (long) variant")]
    JumpTooFar(usize, isize),
    #[error("bad operand {0:?} on line {1}")]
    BadOperand(String, usize),
}

enum Ctrl {
    If { jf_at: usize, long: bool, else_seen: bool, jmp_at: Option<usize> },
    Do { start: usize },
}

/// Assembles `src` into a flat bytecode vector.
pub fn assemble(src: &str) -> Result<Vec<u8>, AsmError> {
    let mut out = Vec::new();
    let mut stack: Vec<Ctrl> = Vec::new();

    for (lineno, raw) in src.lines().enumerate() {
        let line = raw.split(';').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let lineno = lineno + 1;
        let mut tokens = line.split_whitespace();
        let head = tokens.next().unwrap();
        let rest: Vec<&str> = tokens.collect();

        match head.to_ascii_uppercase().as_str() {
            "HALT" => out.push(op::HALT),
            "ERROR" => out.push(op::ERROR),
            "OUT" => out.push(op::OUT),
            "HASH" => out.push(op::HASH),
            "HASHD" => out.push(op::HASHD),
            "A=0" => out.push(op::A_EQ_0),
            "A=B" => out.push(op::A_EQ_B),
            "A=C" => out.push(op::A_EQ_C),
            "A=D" => out.push(op::A_EQ_D),
            "A=*B" => out.push(op::A_EQ_MB),
            "A=*C" => out.push(op::A_EQ_MC),
            "A=*D" => out.push(op::A_EQ_MD),
            "B=A" => out.push(op::B_EQ_A),
            "C=A" => out.push(op::C_EQ_A),
            "D=A" => out.push(op::D_EQ_A),
            "*B=A" => out.push(op::MB_EQ_A),
            "*C=A" => out.push(op::MC_EQ_A),
            "*D=A" => out.push(op::MD_EQ_A),
            "SWAP" | "A<>B" => out.push(op::SWAP_B),
            "A<>C" => out.push(op::SWAP_C),
            "A++" => out.push(op::INC_A),
            "A--" => out.push(op::DEC_A),
            "A!" => out.push(op::NOT_A),
            "A=R" => {
                out.push(op::A_EQ_R);
                out.push(parse_u8(&rest, lineno)?);
            }
            "R=A" => {
                out.push(op::R_EQ_A);
                out.push(parse_u8(&rest, lineno)?);
            }
            "A==" | "A<" | "A>" => {
                out.push(match head {
                    "A==" => op::CMP_EQ,
                    "A<" => op::CMP_LT,
                    _ => op::CMP_GT,
                });
                push_src_operand(&mut out, &rest, lineno)?;
            }
            "A+=" | "A-=" | "A*=" | "A/=" | "A%=" | "A&=" | "A&~" | "A|=" | "A^=" | "A<<=" | "A>>=" => {
                out.push(match head {
                    "A+=" => op::ADD,
                    "A-=" => op::SUB,
                    "A*=" => op::MUL,
                    "A/=" => op::DIV,
                    "A%=" => op::MOD,
                    "A&=" => op::AND,
                    "A&~" => op::ANDNOT,
                    "A|=" => op::OR,
                    "A^=" => op::XOR,
                    "A<<=" => op::SHL,
                    _ => op::SHR,
                });
                push_src_operand(&mut out, &rest, lineno)?;
            }
            "IF" => {
                out.push(op::JF);
                let jf_at = out.len();
                out.push(0);
                stack.push(Ctrl::If { jf_at, long: false, else_seen: false, jmp_at: None });
            }
            "IFNOT" => {
                out.push(op::JT);
                let jf_at = out.len();
                out.push(0);
                stack.push(Ctrl::If { jf_at, long: false, else_seen: false, jmp_at: None });
            }
            "IFL" => {
                out.push(op::JF);
                out.push(3); // skip the 3-byte LJ that follows
                out.push(op::LJ);
                let jf_at = out.len();
                out.extend_from_slice(&[0, 0]);
                stack.push(Ctrl::If { jf_at, long: true, else_seen: false, jmp_at: None });
            }
            "IFNOTL" => {
                out.push(op::JT);
                out.push(3);
                out.push(op::LJ);
                let jf_at = out.len();
                out.extend_from_slice(&[0, 0]);
                stack.push(Ctrl::If { jf_at, long: true, else_seen: false, jmp_at: None });
            }
            "ELSE" | "ELSEL" => {
                let long = head == "ELSEL";
                match stack.last_mut() {
                    Some(Ctrl::If { jf_at, long: was_long, else_seen, jmp_at }) => {
                        if long {
                            out.push(op::LJ);
                            *jmp_at = Some(out.len());
                            out.extend_from_slice(&[0, 0]);
                        } else {
                            out.push(op::JMP);
                            *jmp_at = Some(out.len());
                            out.push(0);
                        }
                        patch_jump(&mut out, *jf_at, *was_long, lineno)?;
                        *else_seen = true;
                    }
                    _ => return Err(AsmError::UnmatchedCloser("ELSE", lineno)),
                }
            }
            "ENDIF" => match stack.pop() {
                Some(Ctrl::If { jf_at, long, else_seen, jmp_at }) => {
                    if !else_seen {
                        patch_jump(&mut out, jf_at, long, lineno)?;
                    } else if let Some(at) = jmp_at {
                        patch_jump(&mut out, at, long, lineno)?;
                    }
                }
                _ => return Err(AsmError::UnmatchedCloser("ENDIF", lineno)),
            },
            "DO" => stack.push(Ctrl::Do { start: out.len() }),
            "WHILE" | "UNTIL" | "FOREVER" => match stack.pop() {
                Some(Ctrl::Do { start }) => {
                    let rel = start as isize - (out.len() as isize + 2);
                    match head {
                        "WHILE" => out.push(op::JT),
                        "UNTIL" => out.push(op::JF),
                        _ => out.push(op::JMP),
                    }
                    if !(-128..=127).contains(&rel) {
                        return Err(AsmError::JumpTooFar(lineno, rel));
                    }
                    out.push(rel as i8 as u8);
                }
                _ => return Err(AsmError::UnmatchedCloser("WHILE/UNTIL/FOREVER", lineno)),
            },
            other => return Err(AsmError::UnknownMnemonic(other.to_string(), lineno)),
        }
    }

    if let Some(unclosed) = stack.first() {
        let kind = match unclosed {
            Ctrl::If { .. } => "IF",
            Ctrl::Do { .. } => "DO",
        };
        return Err(AsmError::Unclosed(kind, 0));
    }

    Ok(out)
}

fn patch_jump(out: &mut [u8], at: usize, long: bool, lineno: usize) -> Result<(), AsmError> {
    if long {
        let target = out.len() as u16;
        let bytes = target.to_le_bytes();
        out[at] = bytes[0];
        out[at + 1] = bytes[1];
    } else {
        let rel = out.len() as isize - (at as isize + 1);
        if !(-128..=127).contains(&rel) {
            return Err(AsmError::JumpTooFar(lineno, rel));
        }
        out[at] = rel as i8 as u8;
    }
    Ok(())
}

fn parse_u8(rest: &[&str], lineno: usize) -> Result<u8, AsmError> {
    rest.first()
        .and_then(|s| s.parse::<u8>().ok())
        .ok_or_else(|| AsmError::BadOperand(rest.join(" "), lineno))
}

fn push_src_operand(out: &mut Vec<u8>, rest: &[&str], lineno: usize) -> Result<(), AsmError> {
    let tok = rest.first().ok_or_else(|| AsmError::BadOperand(String::new(), lineno))?;
    let src = match *tok {
        "a" | "A" => Src::A,
        "b" | "B" => Src::B,
        "c" | "C" => Src::C,
        "d" | "D" => Src::D,
        "*b" | "*B" => Src::MB,
        "*c" | "*C" => Src::MC,
        "*d" | "*D" => Src::MD,
        imm => {
            let n: u8 = imm
                .parse()
                .map_err(|_| AsmError::BadOperand(imm.to_string(), lineno))?;
            out.push(Src::Imm as u8);
            out.push(n);
            return Ok(());
        }
    };
    out.push(src as u8);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{Role, Vm};

    #[test]
    fn straight_line_program_assembles() {
        let prog = assemble("d=a\nhashd\nhalt\n").unwrap();
        assert_eq!(prog, vec![op::D_EQ_A, op::HASHD, op::HALT]);
    }

    #[test]
    fn if_endif_round_trips_through_the_vm() {
        // a==0 ; if (true) a=5 endif ; halt
        let src = "a== 0\nif\n  a+= 5\nendif\nhalt\n";
        let prog = assemble(src).unwrap();
        let mut vm = Vm::new(Role::Hcomp, 2, 2);
        let mut out = Vec::new();
        vm.run(&prog, 0, 0, &mut out).unwrap();
        assert_eq!(vm.a, 5);
    }

    #[test]
    fn if_else_picks_the_false_branch() {
        let src = "a== 1\nif\n  a+= 5\nelse\n  a+= 9\nendif\nhalt\n";
        let prog = assemble(src).unwrap();
        let mut vm = Vm::new(Role::Hcomp, 2, 2);
        let mut out = Vec::new();
        vm.run(&prog, 0, 0, &mut out).unwrap();
        assert_eq!(vm.a, 9);
    }

    #[test]
    fn do_while_loops_the_right_number_of_times() {
        // b=a(0); do { b+=1; a+=1; a==5 } while (not equal) ; halt
        let src = "b=a\ndo\n  b+= 1\n  a+= 1\n  a== 5\nuntil\nhalt\n";
        let prog = assemble(src).unwrap();
        let mut vm = Vm::new(Role::Hcomp, 2, 2);
        let mut out = Vec::new();
        vm.run(&prog, 0, 0, &mut out).unwrap();
        assert_eq!(vm.a, 5);
        assert_eq!(vm.b, 5);
    }

    #[test]
    fn unmatched_endif_is_an_error() {
        assert!(matches!(assemble("endif\n"), Err(AsmError::UnmatchedCloser("ENDIF", _))));
    }
}
