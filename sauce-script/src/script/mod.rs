//! Bytecode decoding and disassembly.

mod decode;
mod disasm;
mod opcode;
mod symbols;

pub use decode::{
    decode, DecodeOptions, Decoded, Instruction, Operand, UnknownOpcode, UnknownOpcodePolicy,
};
pub use disasm::{Formatter, Function, Inst, Listing, UnitStats};
pub use opcode::{
    Annotate, OpcodeInfo, OpcodeSet, OperandKind, OPCODES_V0, OPCODES_V1, OPCODES_V2,
};
pub use symbols::{ClassTypeInfo, Resolution, SymbolTable, SyscallNames};
