// Copyright 2024 Oxide Computer Company

use crate::data;
use crate::harness::{discard, execute, parse};
use stf_bmv2::error::CounterError;
use stf_bmv2::executor::check_counters;
use stf_bmv2::schema::Program;

const SCENARIO: &str = "\
packet 0 00
check_counter port_hits(0)
check_counter drops(3) bytes == 128
counter_read ingress.port_hits 1
check_counter ingress.port_hits(2) packets < 5
";

fn transcript(values: &[(u64, u64)]) -> String {
    let mut s = String::from("Obtaining JSON from switch...\nDone\n");
    for (p, b) in values {
        s += "RuntimeCmd: ";
        s += &format!("ingress.port_hits[0]= BmCounterValue(packets={}, bytes={})\n", p, b);
    }
    s += "RuntimeCmd: \n";
    s
}

#[test]
fn reads_are_emitted_in_order() -> Result<(), anyhow::Error> {
    let program = Program::from_json(data::ROUTER)?;
    let run = execute(&program, &parse(SCENARIO))?;
    assert_eq!(
        run.commands,
        vec![
            "counter_read ingress.port_hits 0",
            "counter_read egress.drops 3",
            "counter_read ingress.port_hits 1",
            "counter_read ingress.port_hits 2",
        ]
    );
    let checked: Vec<bool> = run
        .report
        .counter_reads
        .iter()
        .map(|r| r.check.is_some())
        .collect();
    assert_eq!(checked, vec![true, true, false, true]);
    Ok(())
}

#[test]
fn transcript_checks() -> Result<(), anyhow::Error> {
    let program = Program::from_json(data::ROUTER)?;
    let run = execute(&program, &parse(SCENARIO))?;
    let reads = &run.report.counter_reads;

    let good = transcript(&[(1, 64), (2, 128), (0, 0), (4, 256)]);
    check_counters(&good, reads, &discard())?;

    // nothing counted on the first read
    let bad = transcript(&[(0, 0), (2, 128), (0, 0), (4, 256)]);
    assert!(matches!(
        check_counters(&bad, reads, &discard()),
        Err(CounterError::Failed { .. })
    ));

    // the unchecked read still consumes a response
    let bad = transcript(&[(1, 64), (2, 128), (9, 9), (5, 320)]);
    match check_counters(&bad, reads, &discard()) {
        Err(CounterError::Failed { counter, packets, .. }) => {
            assert_eq!(counter, "ingress.port_hits(2)");
            assert_eq!(packets, 5);
        }
        other => panic!("unexpected {:?}", other),
    }

    let short = transcript(&[(1, 64)]);
    assert!(matches!(
        check_counters(&short, reads, &discard()),
        Err(CounterError::Missing(_))
    ));
    Ok(())
}

#[test]
fn unknown_counter() {
    let program = Program::from_json(data::ROUTER).unwrap();
    let err = execute(&program, &parse("check_counter misses(0)\n")).unwrap_err();
    assert!(err.to_string().contains("misses"), "{}", err);
}
