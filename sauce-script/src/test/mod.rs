//! Developer-facing utilities for the `.sob` reader.
//!
//! This is a module (not `src/bin/...`) so unit tests, integration tests and
//! the CLI crate can all build synthetic units with it.

use std::{fs, path::Path};

use anyhow::{Context, Result};

use crate::{
    format::{encrypt_line, SobUnits, SEPARATOR, SOURCE_SENTINEL},
    nls::Nls,
    script::{decode, DecodeOptions, Formatter, SymbolTable},
};

const KIND_CLASS: u32 = 2;
const KIND_METHOD: u32 = 3;

/// Encoder for a single unit.
///
/// A new builder already holds the unit's own class: string 1 is the class
/// name and reference 1 is its `Class` entry. Every [`UnitBuilder::method`]
/// appends a code entry, a `Method` reference on class 1 and the method body.
#[derive(Debug, Clone)]
pub struct UnitBuilder {
    header: [u32; 5],
    parent: Option<u32>,
    autoload: Vec<u32>,
    members: Vec<(u32, u32)>,
    statics: Vec<(u32, u32)>,
    entries: Vec<(u32, u32)>,
    local_data: Vec<u8>,
    references: Vec<[u32; 7]>,
    strings: Vec<Vec<u8>>,
    bytecode: Vec<u8>,
    source: Option<Vec<Vec<u8>>>,
    methods: u32,
    class_ref_last: bool,
}

impl UnitBuilder {
    pub fn new(class_name: &str) -> Self {
        let mut b = Self {
            header: [0, 0, 1, 0, 0],
            parent: None,
            autoload: Vec::new(),
            members: Vec::new(),
            statics: Vec::new(),
            entries: Vec::new(),
            local_data: Vec::new(),
            references: Vec::new(),
            strings: Vec::new(),
            bytecode: Vec::new(),
            source: None,
            methods: 0,
            class_ref_last: false,
        };
        let name = b.intern(class_name.as_bytes());
        b.references.push([KIND_CLASS, 0, 1, name, 0, 0, 0]);
        b
    }

    /// 1-based index of `s` in the string table, adding it when missing.
    fn intern(&mut self, s: &[u8]) -> u32 {
        let at = match self.strings.iter().position(|x| x == s) {
            Some(i) => i,
            None => {
                self.strings.push(s.to_vec());
                self.strings.len() - 1
            }
        };
        at as u32 + 1
    }

    pub fn string_index(&self, s: &str) -> Option<u32> {
        self.strings
            .iter()
            .position(|x| x == s.as_bytes())
            .map(|i| i as u32 + 1)
    }

    /// Number the next [`UnitBuilder::reference`] or method will get.
    pub fn next_reference(&self) -> u32 {
        if self.class_ref_last {
            self.references.len() as u32
        } else {
            self.references.len() as u32 + 1
        }
    }

    /// Emit the own `Class` reference after every other reference instead of
    /// as reference 1. Its `class_index` stays 1.
    pub fn class_ref_last(mut self) -> Self {
        self.class_ref_last = true;
        self
    }

    pub fn header(mut self, words: [u32; 5]) -> Self {
        self.header = words;
        self
    }

    pub fn parent(mut self, class: u32) -> Self {
        self.parent = Some(class);
        self
    }

    pub fn autoload(mut self, values: &[u32]) -> Self {
        self.autoload.extend_from_slice(values);
        self
    }

    pub fn member(mut self, type_tag: u32) -> Self {
        self.members.push((type_tag, 0));
        self
    }

    pub fn static_var(mut self, type_tag: u32) -> Self {
        self.statics.push((type_tag, 0));
        self
    }

    pub fn local_data(mut self, bytes: &[u8]) -> Self {
        self.local_data.extend_from_slice(bytes);
        self
    }

    pub fn string(mut self, s: &str) -> Self {
        self.intern(s.as_bytes());
        self
    }

    /// String in some encoding other than UTF-8.
    pub fn raw_string(mut self, s: &[u8]) -> Self {
        self.intern(s);
        self
    }

    /// Method of the unit's own class whose body starts at the current end of
    /// the bytecode.
    pub fn method(mut self, name: &str, code: &[u8], flags: u32) -> Self {
        self.methods += 1;
        let name = self.intern(name.as_bytes());
        self.references
            .push([KIND_METHOD, 0, 1, name, 0, self.methods, 0]);
        self.entries.push((self.bytecode.len() as u32, flags));
        self.bytecode.extend_from_slice(code);
        self
    }

    /// Arbitrary reference record.
    pub fn reference(mut self, kind: u32, class_index: u32, name: &str, data_index: u32) -> Self {
        let name = self.intern(name.as_bytes());
        self.references
            .push([kind, 0, class_index, name, 0, data_index, 0]);
        self
    }

    /// Raw reference record, for indices that need not point anywhere.
    pub fn raw_reference(mut self, record: [u32; 7]) -> Self {
        self.references.push(record);
        self
    }

    /// Bytecode without a code entry.
    pub fn code(mut self, code: &[u8]) -> Self {
        self.bytecode.extend_from_slice(code);
        self
    }

    pub fn entry(mut self, offset: u32, flags: u32) -> Self {
        self.entries.push((offset, flags));
        self
    }

    /// Embedded source lines, written in plaintext and encrypted on build.
    pub fn source(mut self, lines: &[&str]) -> Self {
        self.source = Some(lines.iter().map(|l| l.as_bytes().to_vec()).collect());
        self
    }

    fn encode(&self) -> (Vec<u8>, usize) {
        fn put(out: &mut Vec<u8>, v: u32) {
            out.extend_from_slice(&v.to_le_bytes());
        }

        let mut out = Vec::new();

        put(&mut out, SEPARATOR);
        for w in self.header {
            put(&mut out, w);
        }
        match self.parent {
            Some(p) => {
                put(&mut out, 1);
                put(&mut out, p);
            }
            None => put(&mut out, 0),
        }

        put(&mut out, SEPARATOR);
        put(&mut out, self.autoload.len() as u32);
        for &v in &self.autoload {
            put(&mut out, v);
        }

        for vars in [&self.members, &self.statics, &self.entries] {
            put(&mut out, SEPARATOR);
            put(&mut out, vars.len() as u32);
            for &(a, b) in vars.iter() {
                put(&mut out, a);
                put(&mut out, b);
            }
        }

        put(&mut out, SEPARATOR);
        put(&mut out, self.local_data.len() as u32);
        out.extend_from_slice(&self.local_data);

        put(&mut out, SEPARATOR);
        put(&mut out, self.references.len() as u32);
        let (class, rest) = self.references.split_at(1);
        let ordered: Vec<&[u32; 7]> = if self.class_ref_last {
            rest.iter().chain(class).collect()
        } else {
            class.iter().chain(rest).collect()
        };
        for r in ordered {
            for &w in r {
                put(&mut out, w);
            }
        }

        let mut data = Vec::new();
        let mut offsets = Vec::new();
        for s in &self.strings {
            offsets.push(data.len() as u32);
            data.extend_from_slice(s);
            data.push(0);
        }
        put(&mut out, SEPARATOR);
        put(&mut out, offsets.len() as u32);
        for o in offsets {
            put(&mut out, o);
        }
        put(&mut out, SEPARATOR);
        put(&mut out, data.len() as u32);
        out.extend_from_slice(&data);

        put(&mut out, SEPARATOR);
        let size_at = out.len();
        put(&mut out, self.bytecode.len() as u32);
        out.extend_from_slice(&self.bytecode);

        match &self.source {
            Some(lines) => {
                put(&mut out, SOURCE_SENTINEL);
                for (n, l) in lines.iter().enumerate() {
                    out.extend(encrypt_line(l, n));
                    out.push(b'\n');
                }
                put(&mut out, SEPARATOR);
            }
            None => {
                put(&mut out, SEPARATOR);
                put(&mut out, SEPARATOR);
            }
        }
        (out, size_at)
    }

    pub fn build(&self) -> Vec<u8> {
        self.encode().0
    }

    /// Byte offset of the bytecode size word in [`UnitBuilder::build`]'s output.
    pub fn bytecode_size_offset(&self) -> usize {
        self.encode().1
    }
}

/// Disassemble every unit of a buffer to text with default options.
pub fn disassemble_bytes(bytes: &[u8], nls: Nls) -> Result<String> {
    let mut out = String::new();
    for unit in SobUnits::new(bytes) {
        let unit = unit?;
        let symbols = SymbolTable::from_unit(&unit, nls);
        let decoded = decode(unit.bytecode, &DecodeOptions::default())
            .with_context(|| format!("unit #{}", unit.index))?;
        let mut fmt = Formatter::new(&symbols);
        out.push_str(&fmt.render_text(&unit, &decoded));
    }
    Ok(out)
}

/// Load a `.sob` file and disassemble it.
pub fn disassemble_file(path: impl AsRef<Path>, nls: Nls) -> Result<String> {
    let bytes = fs::read(&path).with_context(|| format!("read {:?}", path.as_ref()))?;
    disassemble_bytes(&bytes, nls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_layout() {
        let b = UnitBuilder::new("Main").method("run", &[0x04], 0);
        assert_eq!(b.string_index("Main"), Some(1));
        assert_eq!(b.string_index("run"), Some(2));
        assert_eq!(b.next_reference(), 3);
        let bytes = b.build();
        let at = b.bytecode_size_offset();
        assert_eq!(&bytes[at..at + 4], &1u32.to_le_bytes());
        assert_eq!(bytes[at + 4], 0x04);
        // SEP SEP trailer
        assert_eq!(&bytes[bytes.len() - 8..bytes.len() - 4], &SEPARATOR.to_le_bytes());
    }

    #[test]
    fn class_reference_can_go_last() {
        let b = UnitBuilder::new("Foo").class_ref_last().method("bar", &[], 0);
        assert_eq!(b.next_reference(), 2);
        let bytes = b.build();
        let unit = SobUnits::new(&bytes).next().unwrap().unwrap();
        assert_eq!(unit.references[0].kind, crate::format::RefKind::Method);
        assert_eq!(unit.references[1].kind, crate::format::RefKind::Class);
        assert_eq!(unit.references[1].class_index, 1);
    }

    #[test]
    fn smoke_no_file_ok() {
        let p = Path::new("testcase/test.sob");
        if !p.exists() {
            return;
        }
        assert!(disassemble_file(p, Nls::Latin1).is_ok());
    }
}
