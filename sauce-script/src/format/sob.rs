use crate::error::{MalformedReason, Result, SobError};

use super::cursor::ByteCursor;
use super::source::{decode_embedded_source, EmbeddedSource, SOURCE_SENTINEL};
use super::vartype::VarType;
use super::SEPARATOR;

/// Start of one method body inside the bytecode blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeEntry {
    pub offset: u32,
    pub flags: u32,
}

/// Member or static variable descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    pub type_tag: u32,
    pub value: u32,
}

impl Variable {
    pub fn var_type(&self) -> VarType {
        VarType::decode(self.type_tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum RefKind {
    Class,
    Method,
    Member,
    Static,
    Enum,
    #[strum(to_string = "Unknown({0})")]
    Unknown(u32),
}

impl From<u32> for RefKind {
    fn from(v: u32) -> Self {
        match v {
            2 => RefKind::Class,
            3 => RefKind::Method,
            4 => RefKind::Member,
            5 => RefKind::Static,
            6 => RefKind::Enum,
            other => RefKind::Unknown(other),
        }
    }
}

/// One entry of the reference table.
///
/// `class_index` is itself a 1-based reference number: the `Class` entry that
/// owns this symbol. `class_index == 1` is the unit's own class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub kind: RefKind,
    pub flags: u32,
    pub class_index: u32,
    pub name_index: u32,
    pub member_index: u32,
    pub data_index: u32,
    pub reserved: u32,
}

const REFERENCE_SIZE: usize = 7 * 4;

/// Raw tables of one unit. Blobs borrow from the input buffer.
#[derive(Debug, Clone)]
pub struct SobUnit<'a> {
    /// Position of this unit in its buffer (0-based).
    pub index: usize,
    /// Byte range of the unit inside the buffer.
    pub start: usize,
    pub end: usize,
    pub header: [u32; 5],
    pub parent: Option<u32>,
    pub autoload: Vec<u32>,
    pub members: Vec<Variable>,
    pub statics: Vec<Variable>,
    pub code_entries: Vec<CodeEntry>,
    pub local_data: &'a [u8],
    pub references: Vec<Reference>,
    pub string_offsets: Vec<u32>,
    pub string_data: &'a [u8],
    pub bytecode: &'a [u8],
    pub source: Option<EmbeddedSource>,
}

const KNOWN_HEADER: [u32; 4] = [0, 0, 1, 0];

fn read_u32_table(cur: &mut ByteCursor<'_>, section: &'static str) -> Result<Vec<u32>> {
    let count = cur.read_count(4, section)?;
    (0..count).map(|_| cur.read_u32(section)).collect()
}

fn read_variables(cur: &mut ByteCursor<'_>, section: &'static str) -> Result<Vec<Variable>> {
    let count = cur.read_count(8, section)?;
    let mut vars = Vec::with_capacity(count);
    for _ in 0..count {
        let type_tag = cur.read_u32(section)?;
        let value = cur.read_u32(section)?;
        vars.push(Variable { type_tag, value });
    }
    Ok(vars)
}

fn read_blob<'a>(cur: &mut ByteCursor<'a>, section: &'static str) -> Result<&'a [u8]> {
    let size = cur.read_count(1, section)?;
    cur.read_bytes(size, section)
}

/// Read the unit starting at `*pos` and advance `*pos` past its terminator.
///
/// Layout (all u32 little-endian, `SEP` = [`SEPARATOR`]):
/// - `SEP`, 5 header words, parent count (0 or 1), parent class
/// - `SEP`, autoload count, autoload values
/// - `SEP`, member count, `{type, value}` pairs
/// - `SEP`, static count, `{type, value}` pairs
/// - `SEP`, code entry count, `{offset, flags}` pairs
/// - `SEP`, local data size, bytes
/// - `SEP`, reference count, 7-word references
/// - `SEP`, string count, string offsets
/// - `SEP`, string data size, bytes
/// - `SEP`, bytecode size, bytes
/// - either `SEP SEP`, or [`SOURCE_SENTINEL`], ciphertext lines, `SEP`
pub fn read_unit<'a>(bytes: &'a [u8], pos: &mut usize, index: usize) -> Result<SobUnit<'a>> {
    let start = *pos;
    let mut cur = ByteCursor::new(bytes, start, index);

    cur.expect_separator("unit header")?;
    let mut header = [0u32; 5];
    for word in header.iter_mut() {
        *word = cur.read_u32("unit header")?;
    }
    if header[..4] != KNOWN_HEADER {
        log::warn!("unit #{index}: unexpected header words {:?}", &header[..4]);
    }

    let parent_at = cur.pos();
    let parent_count = cur.read_u32("parent classes")?;
    let parent = match parent_count {
        0 => None,
        1 => Some(cur.read_u32("parent classes")?),
        n => return Err(cur.malformed(parent_at, MalformedReason::InvalidParentCount(n))),
    };

    cur.expect_separator("autoload list")?;
    let autoload = read_u32_table(&mut cur, "autoload list")?;

    cur.expect_separator("member variables")?;
    let members = read_variables(&mut cur, "member variables")?;

    cur.expect_separator("static variables")?;
    let statics = read_variables(&mut cur, "static variables")?;

    cur.expect_separator("code entries")?;
    let count = cur.read_count(8, "code entries")?;
    let mut code_entries = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = cur.read_u32("code entries")?;
        let flags = cur.read_u32("code entries")?;
        code_entries.push(CodeEntry { offset, flags });
    }

    cur.expect_separator("local data")?;
    let local_data = read_blob(&mut cur, "local data")?;

    cur.expect_separator("references")?;
    let count = cur.read_count(REFERENCE_SIZE, "references")?;
    let mut references = Vec::with_capacity(count);
    for _ in 0..count {
        references.push(Reference {
            kind: RefKind::from(cur.read_u32("references")?),
            flags: cur.read_u32("references")?,
            class_index: cur.read_u32("references")?,
            name_index: cur.read_u32("references")?,
            member_index: cur.read_u32("references")?,
            data_index: cur.read_u32("references")?,
            reserved: cur.read_u32("references")?,
        });
    }

    cur.expect_separator("string entries")?;
    let string_offsets = read_u32_table(&mut cur, "string entries")?;

    cur.expect_separator("string data")?;
    let string_data = read_blob(&mut cur, "string data")?;

    cur.expect_separator("bytecode")?;
    let bytecode = read_blob(&mut cur, "bytecode")?;

    log::debug!(
        "unit #{index}: {} members, {} statics, {} code entries, {} local bytes, \
         {} references, {} strings, {} bytecode bytes",
        members.len(),
        statics.len(),
        code_entries.len(),
        local_data.len(),
        references.len(),
        string_offsets.len(),
        bytecode.len()
    );

    let term_at = cur.pos();
    let terminator = cur.read_u32("unit terminator")?;
    let source = match terminator {
        SOURCE_SENTINEL => {
            let (source, resume) = decode_embedded_source(bytes, cur.pos(), index);
            cur.seek(resume);
            if source.truncated.is_none() {
                cur.expect_separator("unit end")?;
            }
            Some(source)
        }
        SEPARATOR => {
            cur.expect_separator("unit end")?;
            None
        }
        other => return Err(cur.malformed(term_at, MalformedReason::BadTerminator(other))),
    };

    *pos = cur.pos();
    Ok(SobUnit {
        index,
        start,
        end: cur.pos(),
        header,
        parent,
        autoload,
        members,
        statics,
        code_entries,
        local_data,
        references,
        string_offsets,
        string_data,
        bytecode,
        source,
    })
}

/// Iterator over the back-to-back units of a buffer.
///
/// Stops after the first malformed unit: the next boundary cannot be found
/// without a valid section walk.
pub struct SobUnits<'a> {
    bytes: &'a [u8],
    pos: usize,
    index: usize,
    failed: bool,
}

impl<'a> SobUnits<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            index: 0,
            failed: false,
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for SobUnits<'a> {
    type Item = Result<SobUnit<'a>, SobError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.bytes.len() {
            return None;
        }
        let index = self.index;
        self.index += 1;
        let item = read_unit(self.bytes, &mut self.pos, index);
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}
