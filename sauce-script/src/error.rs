use std::fmt;

/// Why a unit could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    /// A section did not start with the separator marker.
    BadSeparator { section: &'static str, found: u32 },
    /// More than one parent class was declared.
    InvalidParentCount(u32),
    /// A count or size ran past the end of the buffer.
    SectionOverrun { section: &'static str, needed: usize, available: usize },
    /// The value after the bytecode was neither the separator nor the source sentinel.
    BadTerminator(u32),
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::BadSeparator { section, found } => {
                write!(f, "expected separator before {section}, found 0x{found:08X}")
            }
            MalformedReason::InvalidParentCount(n) => {
                write!(f, "parent class count must be 0 or 1, found {n}")
            }
            MalformedReason::SectionOverrun { section, needed, available } => write!(
                f,
                "{section} needs {needed} bytes but only {available} remain"
            ),
            MalformedReason::BadTerminator(v) => {
                write!(f, "unexpected unit terminator 0x{v:08X}")
            }
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SobError {
    #[error("unit #{unit}: malformed container at 0x{offset:X}: {reason}")]
    Malformed {
        unit: usize,
        offset: usize,
        reason: MalformedReason,
    },

    #[error("unknown opcode 0x{opcode:02X} at 0x{offset:04X}")]
    UnknownOpcode { offset: u32, opcode: u8 },

    #[error("`{mnemonic}` (0x{opcode:02X}) at 0x{offset:04X} runs past the end of the bytecode")]
    TruncatedInstruction {
        offset: u32,
        opcode: u8,
        mnemonic: &'static str,
    },

    #[error("unit #{unit}: embedded source stream truncated at 0x{offset:X}")]
    CipherStreamTruncated { unit: usize, offset: usize },
}

impl SobError {
    /// Conditions that abort the current unit.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, SobError::UnknownOpcode { .. })
    }
}

pub type Result<T, E = SobError> = std::result::Result<T, E>;
