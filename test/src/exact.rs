// Copyright 2024 Oxide Computer Company

use crate::data;
use crate::harness::{discard, execute, parse};
use crate::packet::write_capture;
use stf_bmv2::compare::compare_outputs;
use stf_bmv2::error::CompareError;
use stf_bmv2::executor::interfaces;
use stf_bmv2::schema::Program;

const SCENARIO: &str = "\
# rewrite a two byte packet
add t k:0x11 a(p:0x22)
packet 0 11 22
expect 0 33 44
";

#[test]
fn exact_add_exact_match() -> Result<(), anyhow::Error> {
    let program = Program::from_json(data::EXACT)?;
    let scenario = parse(SCENARIO);
    assert_eq!(scenario.error_count(), 0);

    let mut run = execute(&program, &scenario)?;
    assert_eq!(run.commands, vec!["table_add t a 0x11 => 0x22"]);
    assert_eq!(run.injected, vec![(0, vec![0x11, 0x22])]);

    // what the switch does with that entry installed
    let dir = tempfile::tempdir()?;
    write_capture(dir.path(), 0, &[vec![0x33, 0x44]])?;

    let mut log = Vec::new();
    compare_outputs(
        dir.path(),
        interfaces(&scenario),
        &mut run.expected,
        Some(&mut log),
        &discard(),
    )?;
    assert!(run.expected.is_empty());
    assert_eq!(String::from_utf8(log)?, "0 3344\n");
    Ok(())
}

#[test]
fn unmodified_packet_fails() -> Result<(), anyhow::Error> {
    let program = Program::from_json(data::EXACT)?;
    let scenario = parse(SCENARIO);
    let mut run = execute(&program, &scenario)?;

    let dir = tempfile::tempdir()?;
    write_capture(dir.path(), 0, &[vec![0x11, 0x22]])?;

    let err = compare_outputs(
        dir.path(),
        interfaces(&scenario),
        &mut run.expected,
        None,
        &discard(),
    )
    .unwrap_err();
    match err {
        CompareError::Mismatch {
            port,
            index,
            position,
            ..
        } => {
            assert_eq!((port, index, position), (0, 0, 0));
        }
        other => panic!("unexpected {}", other),
    }
    Ok(())
}

#[test]
fn unknown_names_are_reported_with_line() -> Result<(), anyhow::Error> {
    let program = Program::from_json(data::EXACT)?;
    let scenario = parse("add t k:1 a(p:2)\nadd nosuch k:1 a(p:2)\n");
    let err = execute(&program, &scenario).unwrap_err();
    assert!(err.to_string().starts_with("line 2:"), "{}", err);
    assert!(err.to_string().contains("nosuch"), "{}", err);
    Ok(())
}
