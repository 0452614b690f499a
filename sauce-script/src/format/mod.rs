//! `.sob` container parsing.

mod cursor;
mod sob;
pub mod source;
mod vartype;

pub use cursor::ByteCursor;
pub use sob::{read_unit, CodeEntry, RefKind, Reference, SobUnit, SobUnits, Variable};
pub use source::{decrypt_line, encrypt_line, EmbeddedSource, SourceFile, SOURCE_SENTINEL};
pub use vartype::{Dimension, PrimitiveKind, VarFlags, VarType};

/// Marker in front of every section of a unit.
pub const SEPARATOR: u32 = 0xABCD_ABCD;
