use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Qualifier bits of a variable type tag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VarFlags: u32 {
        const TWO_DIM   = 0x0000_0100;
        const LIST      = 0x0001_0000;
        const QUALIFIER = 0x0020_0000;
    }
}

/// Primitive kind held in the low bits of a type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum PrimitiveKind {
    None,
    Int1,
    Int2,
    Int4,
    Byte,
    Char,
    Int16,
    Int32,
    Float,
    Object,
    Struct,
    #[strum(serialize = "UNK")]
    Unknown,
}

impl PrimitiveKind {
    fn from_raw(v: u32) -> Self {
        match v {
            0 => PrimitiveKind::None,
            1 => PrimitiveKind::Int1,
            2 => PrimitiveKind::Int2,
            3 => PrimitiveKind::Int4,
            4 => PrimitiveKind::Byte,
            5 => PrimitiveKind::Char,
            6 => PrimitiveKind::Int16,
            7 => PrimitiveKind::Int32,
            8 => PrimitiveKind::Float,
            9 => PrimitiveKind::Object,
            10 => PrimitiveKind::Struct,
            _ => PrimitiveKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Scalar,
    List,
    List2,
}

/// Decoded member/static variable type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarType {
    pub raw: u32,
    pub kind: PrimitiveKind,
    pub dimension: Dimension,
    pub qualified: bool,
}

impl VarType {
    pub fn decode(raw: u32) -> Self {
        let mut rest = raw;
        let mut dimension = Dimension::Scalar;
        if rest & VarFlags::LIST.bits() != 0 {
            rest &= !VarFlags::LIST.bits();
            if rest & VarFlags::TWO_DIM.bits() != 0 {
                rest &= !VarFlags::TWO_DIM.bits();
                dimension = Dimension::List2;
            } else {
                dimension = Dimension::List;
            }
        }
        let qualified = rest & VarFlags::QUALIFIER.bits() != 0;
        rest &= !VarFlags::QUALIFIER.bits();

        Self {
            raw,
            kind: PrimitiveKind::from_raw(rest),
            dimension,
            qualified,
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.kind.into();
        let suffix = match self.dimension {
            Dimension::Scalar => "",
            Dimension::List => "[]",
            Dimension::List2 => "[,]",
        };
        write!(f, "{name}{suffix}")
    }
}
