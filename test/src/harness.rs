// Copyright 2024 Oxide Computer Company

//! Running scenarios against in-memory sinks.

use slog::Logger;
use std::sync::Arc;
use stf::ast::Scenario;
use stf_bmv2::encode::{Encoder, PriorityTransform};
use stf_bmv2::executor::{Executor, Report, Timing};
use stf_bmv2::expect::ExpectedOutput;
use stf_bmv2::schema::Program;

/// Everything a scenario produced when executed without a switch.
#[derive(Debug)]
pub struct Run {
    pub expected: ExpectedOutput,
    pub report: Report,
    pub commands: Vec<String>,
    pub injected: Vec<(u32, Vec<u8>)>,
}

pub fn discard() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

pub fn parse(text: &str) -> Scenario {
    stf::parse(text, Arc::new("test.stf".into()), false)
}

pub fn execute(
    program: &Program,
    scenario: &Scenario,
) -> Result<Run, stf_bmv2::Error> {
    let encoder = Encoder::new(program, PriorityTransform::default(), discard());
    let mut x = Executor::new(
        encoder,
        Vec::new(),
        Vec::new(),
        Timing::immediate(),
        discard(),
    );
    x.run(scenario)?;
    let (expected, report, commands, injected) = x.finish();
    Ok(Run {
        expected,
        report,
        commands,
        injected,
    })
}
