//! Opcode tables.
//!
//! The instruction set grew over time: later games added opcodes (and in one
//! case changed an operand shape) on top of the base set. Each revision is a
//! table; an [`OpcodeSet`] picks which tables are consulted, newest first.

use lazy_static::lazy_static;

/// Shape of one immediate operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// 1 byte
    Byte,
    /// 4 bytes, little-endian, signed
    Int32,
    /// 4 bytes, little-endian IEEE 754
    Float32,
}

impl OperandKind {
    pub const fn size(self) -> usize {
        match self {
            OperandKind::Byte => 1,
            OperandKind::Int32 | OperandKind::Float32 => 4,
        }
    }
}

/// How the formatter annotates an instruction's last Int32 operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotate {
    None,
    /// Index into the string table.
    String,
    /// 1-based index into the reference table.
    Reference,
    /// Syscall id.
    Syscall,
}

#[derive(Debug, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub operands: &'static [OperandKind],
    pub annotate: Annotate,
}

impl OpcodeInfo {
    pub fn encoded_len(&self) -> usize {
        1 + self.operands.iter().map(|k| k.size()).sum::<usize>()
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum OpcodeSet {
    /// Base set only.
    #[strum(serialize = "v0")]
    V0,
    /// Base set plus the first extension.
    #[strum(serialize = "v1")]
    V1,
    /// Every known opcode.
    #[default]
    #[strum(serialize = "v2")]
    V2,
}

use Annotate as A;
use OperandKind::{Byte as B, Float32 as F, Int32 as I};

macro_rules! op {
    ($code:expr, $name:expr) => {
        OpcodeInfo { opcode: $code, mnemonic: $name, operands: &[], annotate: A::None }
    };
    ($code:expr, $name:expr, [$($k:ident),*]) => {
        OpcodeInfo { opcode: $code, mnemonic: $name, operands: &[$($k),*], annotate: A::None }
    };
    ($code:expr, $name:expr, [$($k:ident),*], $ann:ident) => {
        OpcodeInfo { opcode: $code, mnemonic: $name, operands: &[$($k),*], annotate: A::$ann }
    };
}

pub const OPCODES_V0: &[OpcodeInfo] = &[
    op!(0x00, "nop"),
    op!(0x01, "breakhere"),
    op!(0x02, "jump", [I]),
    op!(0x03, "debugprint"),
    op!(0x04, "end"),
    op!(0x05, "return"),
    op!(0x06, "push_int8", [B]),
    op!(0x07, "push_int32", [I]),
    op!(0x08, "push_local", [I]),
    op!(0x09, "push_me", [I]),
    op!(0x0a, "push_member", [I]),
    op!(0x0b, "push_static_me", [I]),
    op!(0x0c, "push_static", [I]),
    op!(0x0d, "pop"),
    op!(0x0e, "pop_local", [I]),
    op!(0x0f, "pop_me", [I]),
    op!(0x10, "pop_member", [I]),
    op!(0x11, "pop_static_me", [I]),
    op!(0x12, "pop_static", [I]),
    op!(0x13, "call_me", [I], Reference),
    op!(0x14, "call_method", [I], Reference),
    op!(0x15, "call_static", [I], Reference),
    op!(0x17, "new", [I], Reference),
    op!(0x18, "add_int"),
    op!(0x19, "sub_int"),
    op!(0x1a, "mul_int"),
    op!(0x1b, "div_int"),
    op!(0x1c, "neg_int"),
    op!(0x1e, "start_method", [B, I], Reference),
    op!(0x20, "start_static", [B, I], Reference),
    op!(0x21, "start_me", [B, I], Reference),
    op!(0x28, "if_eq", [I]),
    op!(0x29, "if_neq", [I]),
    op!(0x2a, "and"),
    op!(0x2b, "or"),
    op!(0x2c, "eq_int"),
    op!(0x2d, "neq_int"),
    op!(0x2e, "leq_int"),
    op!(0x2f, "geq_int"),
    op!(0x30, "lt_int"),
    op!(0x31, "gt_int"),
    op!(0x32, "push_local[]", [I]),
    op!(0x33, "push_me1", [I]),
    op!(0x34, "push_member[]", [I]),
    op!(0x35, "push_static_me[]", [I]),
    op!(0x36, "push_static[]", [I]),
    op!(0x37, "pop_local[]", [I]),
    op!(0x38, "pop_me[]", [I]),
    op!(0x39, "pop_member[]", [I]),
    op!(0x3a, "pop_static_me[]", [I]),
    op!(0x3b, "pop_static[]", [I]),
    op!(0x3c, "push_string", [I], String),
    op!(0x3d, "add_str"),
    op!(0x3e, "syscall", [I], Syscall),
    op!(0x3f, "fsyscall", [I], Syscall),
    op!(0x40, "dim[]"),
    op!(0x41, "quit"),
    op!(0x42, "col_lower"),
    op!(0x43, "col_upper"),
    op!(0x44, "col_size"),
    op!(0x45, "mod"),
    op!(0x46, "rand_int"),
    op!(0x47, "strlen"),
    op!(0x48, "not_int"),
    op!(0x49, "debug"),
    op!(0x4a, "copy1"),
    op!(0x4b, "range1"),
    op!(0x4c, "swap"),
    op!(0x4d, "dim[,]"),
    op!(0x50, "push_local[,]", [I]),
    op!(0x51, "push_me[,]", [I]),
    op!(0x52, "push_member[,]", [I]),
    op!(0x53, "push_static_me[,]", [I]),
    op!(0x54, "push_static[,]", [I]),
    op!(0x55, "pop_local[,]", [I]),
    op!(0x56, "pop_me[,]", [I]),
    op!(0x57, "pop_member[,]", [I]),
    op!(0x58, "pop_static_me[,]", [I]),
    op!(0x59, "pop_static[,]", [I]),
    op!(0x5b, "row_lower"),
    op!(0x5c, "row_upper"),
    op!(0x5d, "row_size"),
    op!(0x5e, "range2"),
    op!(0x60, "in_array"),
    op!(0x61, "poppush_array"),
    op!(0x62, "band"),
    op!(0x63, "bor"),
    op!(0x64, "stop"),
    op!(0x65, "stop_me"),
    op!(0x66, "running"),
    op!(0x67, "threadid"),
    op!(0x68, "min_int"),
    op!(0x69, "max_int"),
    op!(0x6a, "abs_int"),
    op!(0x6b, "thread"),
    op!(0x6c, "dup"),
    op!(0x6d, "streq"),
    op!(0x6e, "add_chr"),
    op!(0x6f, "insert_lower"),
    op!(0x70, "insert_upper"),
    op!(0x71, "delete_lower"),
    op!(0x72, "delete_upper"),
    op!(0x73, "class_handle", [I], Reference),
    op!(0x74, "class_name"),
    op!(0x75, "class_type"),
    op!(0x76, "delete"),
    op!(0x77, "itof"),
    op!(0x78, "ftoi"),
    op!(0x79, "itos"),
    op!(0x7a, "stoi"),
    op!(0x7b, "ftos"),
    op!(0x7c, "stof"),
    op!(0x7d, "add_float"),
    op!(0x7e, "sub_float"),
    op!(0x7f, "mul_float"),
    op!(0x80, "div_float"),
    op!(0x81, "neg_float"),
    op!(0x83, "min_float"),
    op!(0x84, "max_float2"),
    op!(0x85, "abs_float"),
    op!(0x86, "eq_float"),
    op!(0x87, "neq_float"),
    op!(0x88, "leq_float"),
    op!(0x89, "geq_float"),
    op!(0x8a, "lt_float"),
    op!(0x8b, "gt_float"),
    op!(0x8c, "push_float", [F]),
    op!(0x8d, "rand_float"),
    op!(0x8e, "start_callback"),
    op!(0x8f, "call_parent", [I], Reference),
    op!(0x90, "start_parent", [B, I], Reference),
    op!(0x91, "new_expr"),
    op!(0x92, "array_find"),
    op!(0x93, "breakmany"),
    op!(0x94, "breaktime"),
    op!(0x95, "setthreadid"),
    op!(0x96, "setthreadorder"),
    op!(0x97, "call_callback"),
    op!(0x98, "paste1"),
    op!(0x99, "paste2"),
    op!(0x9a, "push_local[\"\"]", [I]),
    op!(0x9b, "push_me_map", [I]),
    op!(0x9c, "push_member[\"\"]", [I]),
    op!(0x9d, "push_static_me[\"\"]", [I]),
    op!(0x9e, "push_static[\"\"]", [I]),
    op!(0x9f, "pop_local[\"\"]", [I]),
    op!(0xa0, "pop_me[\"\"]", [I]),
    op!(0xa1, "pop_member[\"\"]", [I]),
    op!(0xa2, "pop_static_me[\"\"]", [I]),
    op!(0xa3, "pop_static[\"\"]", [I]),
    op!(0xa4, "map_index"),
    op!(0xa5, "delete_index"),
    op!(0xa6, "insert_after"),
    op!(0xa7, "insert_before"),
    op!(0xa8, "array_first"),
    op!(0xa9, "array_last"),
    op!(0xaa, "array_assignref"),
    op!(0xab, "check_index"),
    op!(0xac, "check_index2"),
    op!(0xad, "delete_array"),
    op!(0xae, "strcat"),
    op!(0xaf, "assert"),
    op!(0xb0, "gotothread", [I]),
    op!(0xb1, "gotothread", [I]),
    op!(0xb2, "dim[int]"),
    op!(0xb3, "array_assignoob"),
    op!(0xb4, "bnot"),
    op!(0xb5, "array_rand"),
    op!(0xb6, "fast_syscall", [I], Syscall),
    op!(0xb7, "fast_fsyscall", [I], Syscall),
    op!(0xb8, "push_raw_local[]", [I]),
    op!(0xb9, "classname_handle"),
    op!(0xba, "format_string"),
    op!(0xbb, "is_from"),
    op!(0xbc, "iftop_eq", [I]),
    op!(0xbd, "iftop_neq", [I]),
];

pub const OPCODES_V1: &[OpcodeInfo] = &[
    op!(0x61, "poppush_array", [I]),
    op!(0xbe, "eq_struct", [B]),
    op!(0xbf, "neq_struct", [B]),
    op!(0xc0, "suspend_thread"),
    op!(0xc1, "resume_thread"),
    op!(0xc2, "lshf_int"),
    op!(0xc3, "rshf_int"),
    op!(0xc4, "between_float"),
    op!(0xc5, "between_int"),
    op!(0xc6, "regeq"),
    op!(0xc7, "regmatch"),
];

pub const OPCODES_V2: &[OpcodeInfo] = &[
    op!(0xc8, "push_const_string", [I]),
    op!(0xcb, "push_string_handle", [I]),
    op!(0xcc, "delete[*]"),
    op!(0xcd, "format_string2"),
    op!(0xce, "sin"),
    op!(0xcf, "cos"),
    op!(0xd0, "tan"),
];

type Dispatch = [Option<&'static OpcodeInfo>; 256];

/// Flatten a chain (newest first) into a direct lookup table.
fn build_dispatch(chain: &[&'static [OpcodeInfo]]) -> Dispatch {
    let mut table: Dispatch = [None; 256];
    for tbl in chain.iter().rev() {
        for info in tbl.iter() {
            table[info.opcode as usize] = Some(info);
        }
    }
    table
}

static CHAIN_V0: [&[OpcodeInfo]; 1] = [OPCODES_V0];
static CHAIN_V1: [&[OpcodeInfo]; 2] = [OPCODES_V1, OPCODES_V0];
static CHAIN_V2: [&[OpcodeInfo]; 3] = [OPCODES_V2, OPCODES_V1, OPCODES_V0];

lazy_static! {
    static ref DISPATCH_V0: Dispatch = build_dispatch(&CHAIN_V0);
    static ref DISPATCH_V1: Dispatch = build_dispatch(&CHAIN_V1);
    static ref DISPATCH_V2: Dispatch = build_dispatch(&CHAIN_V2);
}

impl OpcodeSet {
    /// Tables consulted for this set, newest first.
    pub fn chain(self) -> &'static [&'static [OpcodeInfo]] {
        match self {
            OpcodeSet::V0 => &CHAIN_V0,
            OpcodeSet::V1 => &CHAIN_V1,
            OpcodeSet::V2 => &CHAIN_V2,
        }
    }

    pub fn lookup(self, opcode: u8) -> Option<&'static OpcodeInfo> {
        let table = match self {
            OpcodeSet::V0 => &*DISPATCH_V0,
            OpcodeSet::V1 => &*DISPATCH_V1,
            OpcodeSet::V2 => &*DISPATCH_V2,
        };
        table[opcode as usize]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn tables_have_no_duplicates() {
        for tbl in [OPCODES_V0, OPCODES_V1, OPCODES_V2] {
            let mut seen = HashSet::new();
            for info in tbl {
                assert!(seen.insert(info.opcode), "duplicate opcode 0x{:02x}", info.opcode);
            }
        }
    }

    #[test]
    fn newer_table_wins() {
        let v0 = OpcodeSet::V0.lookup(0x61).unwrap();
        assert!(v0.operands.is_empty());
        let v1 = OpcodeSet::V1.lookup(0x61).unwrap();
        assert_eq!(v1.operands, &[OperandKind::Int32]);
        assert_eq!(v1.encoded_len(), 5);
    }

    #[test]
    fn extensions_are_gated() {
        assert!(OpcodeSet::V0.lookup(0xc2).is_none());
        assert_eq!(OpcodeSet::V1.lookup(0xc2).unwrap().mnemonic, "lshf_int");
        assert!(OpcodeSet::V1.lookup(0xce).is_none());
        assert_eq!(OpcodeSet::V2.lookup(0xce).unwrap().mnemonic, "sin");
    }

    #[test]
    fn holes_stay_unknown() {
        for set in OpcodeSet::iter() {
            for hole in [0x16u8, 0x1d, 0x1f, 0x4e, 0x82, 0xc9, 0xff] {
                assert!(set.lookup(hole).is_none(), "{set} 0x{hole:02x}");
            }
        }
    }

    #[test]
    fn chains_are_newest_first() {
        let chain = OpcodeSet::V2.chain();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0], OPCODES_V2);
        assert_eq!(chain[2], OPCODES_V0);
        assert_eq!(OpcodeSet::V0.chain(), &[OPCODES_V0]);
        // dispatch agrees with the first table in the chain that knows the opcode
        for set in OpcodeSet::iter() {
            for code in 0..=255u8 {
                let expect = set
                    .chain()
                    .iter()
                    .find_map(|tbl| tbl.iter().find(|i| i.opcode == code));
                assert_eq!(set.lookup(code), expect);
            }
        }
    }

    #[test]
    fn parse_set_names() {
        assert_eq!("v1".parse::<OpcodeSet>().unwrap(), OpcodeSet::V1);
        assert_eq!("V2".parse::<OpcodeSet>().unwrap(), OpcodeSet::V2);
        assert_eq!(OpcodeSet::default(), OpcodeSet::V2);
    }
}
