//! sauce-script
//!
//! Reader and disassembler for compiled Sauce units (`.sob`).
//!
//! A `.sob` buffer holds one or more back-to-back units. Each unit is a fixed
//! sequence of separator-delimited sections (variables, code entries,
//! references, strings, bytecode), optionally followed by the original source
//! text, obfuscated with a position-dependent cipher.
//!
//! The pipeline is:
//! - [`format::SobUnits`] slices the buffer into [`format::SobUnit`]s,
//! - [`script::SymbolTable`] resolves the reference and string tables,
//! - [`script::decode`] walks the bytecode through an [`script::OpcodeSet`],
//! - [`script::Formatter`] renders annotated text or a serializable listing.

pub mod error;
pub mod format;
pub mod nls;
pub mod script;

/// Helpers for building synthetic units (kept as a module so integration tests can reuse it).
pub mod test;

pub use error::{MalformedReason, Result, SobError};
pub use format::{SobUnit, SobUnits};
pub use nls::Nls;
