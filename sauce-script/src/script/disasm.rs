use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::format::SobUnit;

use super::decode::{Decoded, Instruction};
use super::opcode::Annotate;
use super::symbols::{Resolution, SymbolTable, SyscallNames};

/// Counters reported once per unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnitStats {
    pub instructions: usize,
    pub unknown_opcodes: usize,
    pub unresolved_symbols: usize,
    /// Code entries that do not start on an instruction boundary.
    pub orphan_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inst {
    pub offset: u32,
    pub opcode: u8,
    pub mnemonic: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operands: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub name: String,
    pub flags: u32,
    pub offset: u32,
    pub insts: Vec<Inst>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    pub unit: usize,
    pub class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub methods: Vec<Function>,
    pub stats: UnitStats,
}

/// Label for a code entry, in declaration order.
struct Label {
    method: String,
    flags: u32,
}

/// Renders decoded instructions of one unit.
pub struct Formatter<'a> {
    symbols: &'a SymbolTable,
    syscalls: Option<&'a SyscallNames>,
    stats: UnitStats,
}

impl<'a> Formatter<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            symbols,
            syscalls: None,
            stats: UnitStats::default(),
        }
    }

    pub fn with_syscalls(mut self, syscalls: &'a SyscallNames) -> Self {
        self.syscalls = Some(syscalls);
        self
    }

    pub fn stats(&self) -> UnitStats {
        self.stats
    }

    fn own_class(&self) -> String {
        self.symbols.class_label(1)
    }

    /// Group code entries by offset; entries off any instruction boundary are
    /// counted and logged.
    fn labels(&mut self, unit: &SobUnit<'_>, decoded: &Decoded) -> BTreeMap<u32, Vec<Label>> {
        let mut labels: BTreeMap<u32, Vec<Label>> = BTreeMap::new();
        for (i, entry) in unit.code_entries.iter().enumerate() {
            if decoded.position(entry.offset).is_none() {
                log::warn!(
                    "unit #{}: code entry #{i} at 0x{:04x} is not on an instruction boundary",
                    unit.index,
                    entry.offset
                );
                self.stats.orphan_entries += 1;
                continue;
            }
            let method = self
                .symbols
                .own_method(i as u32 + 1)
                .unwrap_or_default()
                .to_owned();
            labels.entry(entry.offset).or_default().push(Label {
                method,
                flags: entry.flags,
            });
        }
        labels
    }

    fn resolved(&mut self, r: Resolution) -> String {
        if !r.is_resolved() {
            self.stats.unresolved_symbols += 1;
        }
        match r {
            Resolution::Resolved(s) | Resolution::Unresolved(s) => s,
        }
    }

    /// Text that goes between `/* */`, if the instruction is annotated.
    pub fn comment(&mut self, inst: &Instruction) -> Option<String> {
        let info = inst.info?;
        let value = inst.last_int()?;
        match info.annotate {
            Annotate::None => None,
            Annotate::String => {
                let r = self.symbols.resolve_string(value);
                Some(self.resolved(r))
            }
            Annotate::Reference => {
                let r = self.symbols.resolve_reference(value);
                Some(self.resolved(r))
            }
            Annotate::Syscall => self
                .syscalls
                .and_then(|names| names.lookup(value))
                .map(str::to_owned),
        }
    }

    fn count(&mut self, decoded: &Decoded) {
        self.stats.instructions += decoded.instructions.len();
        self.stats.unknown_opcodes += decoded.unknown.len();
    }

    pub fn format_instruction(&mut self, inst: &Instruction) -> String {
        let mut line = format!("[{:04x}] ({:02x}) ", inst.offset, inst.opcode);
        if inst.is_unknown() {
            let _ = write!(line, ".byte 0x{:02x}", inst.opcode);
            return line;
        }
        line.push_str(inst.mnemonic());
        for op in &inst.operands {
            let _ = write!(line, " {op}");
        }
        if let Some(c) = self.comment(inst) {
            let _ = write!(line, " /* {c} */");
        }
        line
    }

    /// Class, tables and strings of the unit as `//` comment lines.
    pub fn render_header(&self, unit: &SobUnit<'_>) -> String {
        let s = self.symbols;
        let mut out = String::new();
        let _ = writeln!(out, "// unit #{} at 0x{:X}..0x{:X}", unit.index, unit.start, unit.end);
        let _ = writeln!(out, "// class {}", self.own_class());
        if let Some(p) = unit.parent {
            let _ = writeln!(out, "// parent {}", s.class_label(p));
        }
        let h = unit.header;
        let _ = writeln!(out, "// header {} {} {} {} {}", h[0], h[1], h[2], h[3], h[4]);
        if !unit.autoload.is_empty() {
            let list: Vec<_> = unit.autoload.iter().map(u32::to_string).collect();
            let _ = writeln!(out, "// autoload {}", list.join(" "));
        }
        for (i, m) in unit.members.iter().enumerate() {
            let _ = writeln!(out, "// member #{i} {}", m.var_type());
        }
        for (i, m) in unit.statics.iter().enumerate() {
            let _ = writeln!(out, "// static #{i} {}", m.var_type());
        }
        for (i, e) in unit.code_entries.iter().enumerate() {
            let _ = writeln!(out, "// code #{i} offset:0x{:04x} flags:0x{:x}", e.offset, e.flags);
        }
        if !unit.local_data.is_empty() {
            let _ = writeln!(out, "// local data {} bytes", unit.local_data.len());
        }
        for (i, r) in unit.references.iter().enumerate() {
            let _ = writeln!(
                out,
                "// Ref #{} {} flags:0x{:x} class_index:{} data_index:{} name:{}",
                i + 1,
                r.kind,
                r.flags,
                r.class_index,
                r.data_index,
                s.string(r.name_index).unwrap_or_default()
            );
        }
        for (i, text) in s.strings().iter().enumerate() {
            let _ = writeln!(out, "// str #{} \"{}\"", i + 1, text.escape_debug());
        }
        out
    }

    /// Plain listing: method labels and one line per instruction.
    pub fn render_text(&mut self, unit: &SobUnit<'_>, decoded: &Decoded) -> String {
        let labels = self.labels(unit, decoded);
        let owner = self.own_class();
        self.count(decoded);

        let mut out = String::new();
        for inst in &decoded.instructions {
            for label in labels.get(&inst.offset).into_iter().flatten() {
                let _ = writeln!(out, "// {owner}:{} flags:0x{:x}", label.method, label.flags);
            }
            let line = self.format_instruction(inst);
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// One-line summary of the counters.
    pub fn render_summary(&self, unit: &SobUnit<'_>) -> String {
        format!(
            "// unit #{}: {} instructions, {} unknown opcodes, {} unresolved symbols\n",
            unit.index,
            self.stats.instructions,
            self.stats.unknown_opcodes,
            self.stats.unresolved_symbols
        )
    }

    /// Structured listing. Instructions before the first labelled offset go
    /// into a `<prologue>` function.
    pub fn listing(&mut self, unit: &SobUnit<'_>, decoded: &Decoded) -> Listing {
        let labels = self.labels(unit, decoded);
        let owner = self.own_class();
        self.count(decoded);

        let mut methods: Vec<Function> = Vec::new();
        for inst in &decoded.instructions {
            if let Some(group) = labels.get(&inst.offset) {
                for label in group {
                    methods.push(Function {
                        name: format!("{owner}:{}", label.method),
                        flags: label.flags,
                        offset: inst.offset,
                        insts: Vec::new(),
                    });
                }
            }
            if methods.is_empty() {
                methods.push(Function {
                    name: "<prologue>".to_owned(),
                    flags: 0,
                    offset: inst.offset,
                    insts: Vec::new(),
                });
            }

            let comment = self.comment(inst);
            let item = Inst {
                offset: inst.offset,
                opcode: inst.opcode,
                mnemonic: inst.mnemonic().to_owned(),
                operands: inst.operands.iter().map(ToString::to_string).collect(),
                comment,
            };
            if let Some(f) = methods.last_mut() {
                f.insts.push(item);
            }
        }

        Listing {
            unit: unit.index,
            class: owner,
            parent: unit.parent.map(|p| self.symbols.class_label(p)),
            methods,
            stats: self.stats,
        }
    }
}
