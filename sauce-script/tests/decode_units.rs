use pretty_assertions::assert_eq;

use sauce_script::format::{SobUnits, SEPARATOR};
use sauce_script::script::{decode, DecodeOptions, Formatter, SymbolTable};
use sauce_script::test::{disassemble_bytes, UnitBuilder};
use sauce_script::{MalformedReason, Nls, SobError};

fn call_me(r: i32) -> Vec<u8> {
    let mut v = vec![0x13];
    v.extend_from_slice(&r.to_le_bytes());
    v
}

fn sample() -> Vec<u8> {
    let mut body = vec![0x06, 7];
    body.extend(call_me(3));
    body.push(0x05);

    let mut first = UnitBuilder::new("Foo")
        .parent(1)
        .method("bar", &[0x3c, 2, 0, 0, 0, 0x05], 0)
        .method("baz", &body, 0x2)
        .source(&["$foo.sau", "class Foo", "  method bar"])
        .build();
    let second = UnitBuilder::new("Other").method("go", &[0x00, 0x04], 0).build();
    first.extend_from_slice(&second);
    first
}

#[test]
fn whole_buffer_disassembly() {
    let text = disassemble_bytes(&sample(), Nls::Latin1).unwrap();
    assert_eq!(
        text,
        "// Foo:bar flags:0x0\n\
         [0000] (3c) push_string 2 /* bar */\n\
         [0005] (05) return\n\
         // Foo:baz flags:0x2\n\
         [0006] (06) push_int8 7\n\
         [0008] (13) call_me 3 /* Foo:baz */\n\
         [000d] (05) return\n\
         // Other:go flags:0x0\n\
         [0000] (00) nop\n\
         [0001] (04) end\n"
    );
}

#[test]
fn decoding_is_deterministic() {
    let bytes = sample();
    let a = disassemble_bytes(&bytes, Nls::Latin1).unwrap();
    let b = disassemble_bytes(&bytes, Nls::Latin1).unwrap();
    assert_eq!(a, b);
}

#[test]
fn units_come_out_in_order() {
    let bytes = sample();
    let units: Vec<_> = SobUnits::new(&bytes).collect::<Result<_, _>>().unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].index, 0);
    assert_eq!(units[1].index, 1);
    assert_eq!(units[0].end, units[1].start);
    assert_eq!(units[1].end, bytes.len());

    let src = units[0].source.as_ref().unwrap();
    assert_eq!(src.lines, 3);
    assert_eq!(src.files[0].name, b"foo.sau");
    assert_eq!(src.files[0].contents, b"$foo.sau\nclass Foo\n  method bar\n");
}

#[test]
fn every_separator_is_checked() {
    let bytes = UnitBuilder::new("Main").method("m", &[0x05], 0).build();
    let sep = SEPARATOR.to_le_bytes();
    // step past each match so the SEP SEP trailer counts as two markers, not three
    let mut positions = Vec::new();
    let mut i = 0;
    while i + 4 <= bytes.len() {
        if bytes[i..i + 4] == sep {
            positions.push(i);
            i += 4;
        } else {
            i += 1;
        }
    }
    assert_eq!(positions.len(), 12);
    assert_eq!(positions[11], bytes.len() - 4);

    for at in positions {
        let mut broken = bytes.clone();
        broken[at] ^= 0x01;
        let first = SobUnits::new(&broken).next().unwrap();
        match first {
            Err(SobError::Malformed { offset, reason, .. }) => {
                assert_eq!(offset, at);
                assert!(
                    matches!(
                        reason,
                        MalformedReason::BadSeparator { .. } | MalformedReason::BadTerminator(_)
                    ),
                    "{reason}"
                );
            }
            other => panic!("separator at 0x{at:x}: {other:?}"),
        }
    }
}

#[test]
fn truncated_source_keeps_flushed_files() {
    let mut bytes = UnitBuilder::new("Main")
        .source(&["$a.sau", "one", "$b.sau", "two"])
        .build();
    // drop the closing separator
    bytes.truncate(bytes.len() - 4);

    let units: Vec<_> = SobUnits::new(&bytes).collect();
    assert_eq!(units.len(), 1);
    let unit = units[0].as_ref().unwrap();
    let src = unit.source.as_ref().unwrap();
    assert_eq!(src.files.len(), 1);
    assert_eq!(src.files[0].name, b"a.sau");
    assert!(matches!(src.truncated, Some(SobError::CipherStreamTruncated { unit: 0, .. })));
}

#[test]
fn shift_jis_strings() {
    // "テスト" in Shift_JIS
    let sjis = [0x83u8, 0x65, 0x83, 0x58, 0x83, 0x67];
    let bytes = UnitBuilder::new("Main")
        .raw_string(&sjis)
        .code(&[0x3c, 2, 0, 0, 0])
        .build();
    let unit = SobUnits::new(&bytes).next().unwrap().unwrap();
    let symbols = SymbolTable::from_unit(&unit, Nls::ShiftJIS);
    let decoded = decode(unit.bytecode, &DecodeOptions::default()).unwrap();
    let text = Formatter::new(&symbols).render_text(&unit, &decoded);
    assert_eq!(text, "[0000] (3c) push_string 2 /* テスト */\n");
}
