//! Symbol resolution.
//!
//! A unit carries no symbol names in its bytecode. Operands index either the
//! string table or the reference table, and each reference names its owning
//! class by another (1-based) reference number. [`SymbolTable`] folds the
//! reference table into per-class name maps once, then answers lookups.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::format::{RefKind, Reference, SobUnit};
use crate::nls::Nls;

/// Names collected for one class index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassTypeInfo {
    pub name: Option<String>,
    /// `data_index` -> method name
    pub methods: BTreeMap<u32, String>,
    /// `data_index` -> member, static or enum name
    pub members: BTreeMap<u32, String>,
}

/// Outcome of looking up an operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    /// Index did not point at anything; the text is a placeholder.
    Unresolved(String),
}

impl Resolution {
    pub fn text(&self) -> &str {
        match self {
            Resolution::Resolved(s) | Resolution::Unresolved(s) => s,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    strings: Vec<String>,
    references: Vec<Reference>,
    classes: BTreeMap<u32, ClassTypeInfo>,
    parent: Option<u32>,
}

impl SymbolTable {
    pub fn from_unit(unit: &SobUnit<'_>, nls: Nls) -> Self {
        let strings = unit
            .string_offsets
            .iter()
            .enumerate()
            .map(|(i, &off)| match unit.string_data.get(off as usize..) {
                Some(rest) => nls.decode_cstr(rest).into_owned(),
                None => {
                    log::warn!(
                        "unit #{}: string #{} starts at 0x{off:X}, past the {} byte string data",
                        unit.index,
                        i + 1,
                        unit.string_data.len()
                    );
                    String::new()
                }
            })
            .collect();

        let mut table = Self {
            strings,
            references: unit.references.clone(),
            classes: BTreeMap::new(),
            parent: unit.parent,
        };
        table.collect_classes();
        table
    }

    fn collect_classes(&mut self) {
        for r in &self.references {
            let name = self.string(r.name_index).unwrap_or_default().to_owned();
            let info = self.classes.entry(r.class_index).or_default();
            match r.kind {
                RefKind::Class => info.name = Some(name),
                RefKind::Method => {
                    info.methods.insert(r.data_index, name);
                }
                RefKind::Member | RefKind::Static | RefKind::Enum => {
                    info.members.insert(r.data_index, name);
                }
                RefKind::Unknown(_) => {}
            }
        }
    }

    /// 1-based string lookup. Index 0 is the reserved empty string.
    pub fn string(&self, index: u32) -> Option<&str> {
        match index {
            0 => Some(""),
            n => self.strings.get(n as usize - 1).map(String::as_str),
        }
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// 1-based reference lookup.
    pub fn reference(&self, index: u32) -> Option<&Reference> {
        index
            .checked_sub(1)
            .and_then(|i| self.references.get(i as usize))
    }

    pub fn class(&self, index: u32) -> Option<&ClassTypeInfo> {
        self.classes.get(&index)
    }

    pub fn classes(&self) -> &BTreeMap<u32, ClassTypeInfo> {
        &self.classes
    }

    pub fn parent(&self) -> Option<u32> {
        self.parent
    }

    /// Class name, or `class#N` when no `Class` reference named it.
    pub fn class_label(&self, index: u32) -> String {
        self.class(index)
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| format!("class#{index}"))
    }

    /// Name of method `ordinal` of the unit's own class.
    pub fn own_method(&self, ordinal: u32) -> Option<&str> {
        self.class(1)?.methods.get(&ordinal).map(String::as_str)
    }

    pub fn resolve_string(&self, index: i32) -> Resolution {
        match u32::try_from(index).ok().and_then(|i| self.string(i)) {
            Some(s) => Resolution::Resolved(s.to_owned()),
            None => Resolution::Unresolved(format!("<string {index}>")),
        }
    }

    pub fn resolve_reference(&self, index: i32) -> Resolution {
        let placeholder = || Resolution::Unresolved(format!("<ref {index}>"));
        let Some(r) = u32::try_from(index).ok().and_then(|i| self.reference(i)) else {
            return placeholder();
        };
        let own_name = || self.string(r.name_index).unwrap_or_default().to_owned();
        let owner = self.class(r.class_index);

        match r.kind {
            RefKind::Class => Resolution::Resolved(self.class_label(r.class_index)),
            RefKind::Method => {
                let method = owner
                    .and_then(|c| c.methods.get(&r.data_index).cloned())
                    .unwrap_or_else(own_name);
                Resolution::Resolved(format!("{}:{method}", self.class_label(r.class_index)))
            }
            RefKind::Member | RefKind::Static | RefKind::Enum => {
                let member = owner
                    .and_then(|c| c.members.get(&r.data_index).cloned())
                    .unwrap_or_else(own_name);
                Resolution::Resolved(format!("{}.{member}", self.class_label(r.class_index)))
            }
            RefKind::Unknown(_) => placeholder(),
        }
    }
}

/// Syscall id -> name table, loaded from YAML by the CLI.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SyscallNames(BTreeMap<i32, String>);

impl SyscallNames {
    /// Exact id first, then the id rounded down to its group of 10000.
    pub fn lookup(&self, id: i32) -> Option<&str> {
        self.0
            .get(&id)
            .or_else(|| self.0.get(&((id / 10000) * 10000)))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(i32, String)> for SyscallNames {
    fn from_iter<T: IntoIterator<Item = (i32, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
