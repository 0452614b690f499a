use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, SobError};

use super::opcode::{OpcodeInfo, OpcodeSet, OperandKind};

/// What to do with a byte that is not an opcode of the active set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownOpcodePolicy {
    /// Emit a one-byte opaque instruction and carry on.
    #[default]
    Continue,
    /// Abort with [`SobError::UnknownOpcode`].
    Fail,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    pub opcode_set: OpcodeSet,
    pub on_unknown: UnknownOpcodePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Byte(u8),
    Int32(i32),
    Float32(f32),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Byte(v) => write!(f, "{v}"),
            Operand::Int32(v) => write!(f, "{v}"),
            Operand::Float32(v) => write!(f, "{v:.6}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub offset: u32,
    pub opcode: u8,
    /// `None` for an opcode the active set does not know.
    pub info: Option<&'static OpcodeInfo>,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn is_unknown(&self) -> bool {
        self.info.is_none()
    }

    pub fn mnemonic(&self) -> &'static str {
        self.info.map_or(".byte", |i| i.mnemonic)
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.info.map_or(1, |i| i.encoded_len())
    }

    /// The operand annotations are keyed on.
    pub fn last_int(&self) -> Option<i32> {
        self.operands.iter().rev().find_map(|op| match op {
            Operand::Int32(v) => Some(*v),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownOpcode {
    pub offset: u32,
    pub opcode: u8,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub instructions: Vec<Instruction>,
    pub unknown: Vec<UnknownOpcode>,
}

impl Decoded {
    /// Index of the instruction starting exactly at `offset`.
    pub fn position(&self, offset: u32) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |i| i.offset)
            .ok()
    }
}

/// Linear sweep over a bytecode blob.
pub fn decode(bytecode: &[u8], opts: &DecodeOptions) -> Result<Decoded> {
    let mut out = Decoded::default();
    let mut pos = 0usize;

    while pos < bytecode.len() {
        let offset = pos as u32;
        let opcode = bytecode[pos];
        pos += 1;

        let Some(info) = opts.opcode_set.lookup(opcode) else {
            log::warn!("unknown opcode 0x{opcode:02x} at 0x{offset:04x}");
            if opts.on_unknown == UnknownOpcodePolicy::Fail {
                return Err(SobError::UnknownOpcode { offset, opcode });
            }
            out.unknown.push(UnknownOpcode { offset, opcode });
            out.instructions.push(Instruction {
                offset,
                opcode,
                info: None,
                operands: Vec::new(),
            });
            continue;
        };

        if pos + info.encoded_len() - 1 > bytecode.len() {
            return Err(SobError::TruncatedInstruction {
                offset,
                opcode,
                mnemonic: info.mnemonic,
            });
        }

        let mut operands = Vec::with_capacity(info.operands.len());
        for kind in info.operands {
            let op = match kind {
                OperandKind::Byte => Operand::Byte(bytecode[pos]),
                OperandKind::Int32 => Operand::Int32(LittleEndian::read_i32(&bytecode[pos..])),
                OperandKind::Float32 => Operand::Float32(LittleEndian::read_f32(&bytecode[pos..])),
            };
            pos += kind.size();
            operands.push(op);
        }

        out.instructions.push(Instruction {
            offset,
            opcode,
            info: Some(info),
            operands,
        });
    }

    Ok(out)
}
