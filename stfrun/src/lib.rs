// Copyright 2024 Oxide Computer Company

use anyhow::{anyhow, Result};
use clap::Parser;
use colored::Colorize;
use slog::{info, o, Drain, FilterLevel, Logger};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use stf::ast::Scenario;
use stf_bmv2::encode::{Encoder, PriorityTransform};
use stf_bmv2::executor::{Executor, Timing};
use stf_bmv2::schema::Program;
use stf_bmv2::switch::{self, SwitchConfig};

#[derive(Parser, Debug)]
#[command(version = "0.1", about = "Run STF scenarios against simple_switch")]
pub struct Opts {
    /// Compiled program description (BMv2 JSON).
    pub program: PathBuf,

    /// Scenario to run.
    pub stf: PathBuf,

    /// Switch executable.
    #[arg(long, default_value = "simple_switch")]
    pub switch: PathBuf,

    /// Switch control CLI executable.
    #[arg(long, default_value = "simple_switch_CLI")]
    pub cli: PathBuf,

    /// How scenario priorities map onto switch priorities.
    #[arg(long, value_enum, default_value_t = Priority::Inverted)]
    pub priority: Priority,

    /// Base for inverted priorities.
    #[arg(long, default_value_t = 10000)]
    pub priority_base: u32,

    /// Keep the scratch directory holding pcap files and logs.
    #[arg(long)]
    pub keep_scratch: bool,

    /// Where scratch directories are created.
    #[arg(long)]
    pub scratch_root: Option<PathBuf>,

    /// Directory holding port and device id leases.
    #[arg(long)]
    pub lock_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 1000)]
    pub packet_delay_ms: u64,

    #[arg(long, default_value_t = 500)]
    pub wait_ms: u64,

    #[arg(long, default_value_t = 2000)]
    pub settle_ms: u64,

    #[arg(long, default_value_t = 60)]
    pub ready_timeout_s: u64,

    #[arg(long, default_value_t = 2000)]
    pub fifo_timeout_ms: u64,

    /// Write observed packets to this file, one `<port> <hex>` per line.
    #[arg(long)]
    pub observation_log: Option<PathBuf>,

    /// Only parse and encode, printing the switch commands.
    #[arg(long)]
    pub check: bool,

    /// Show lexical tokens.
    #[arg(long)]
    pub show_tokens: bool,

    /// Show parsed statements.
    #[arg(long)]
    pub show_ast: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    Inverted,
    AsIs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// The run could not be attempted, e.g. no switch is installed.
    Skipped,
}

impl Outcome {
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Skipped => 999,
        }
    }
}

impl Opts {
    pub fn priority_transform(&self) -> PriorityTransform {
        match self.priority {
            Priority::Inverted => PriorityTransform::Inverted {
                base: self.priority_base,
            },
            Priority::AsIs => PriorityTransform::AsIs,
        }
    }

    pub fn timing(&self) -> Timing {
        Timing {
            packet_delay: Duration::from_millis(self.packet_delay_ms),
            wait: Duration::from_millis(self.wait_ms),
            settle: Duration::from_millis(self.settle_ms),
            ready_timeout: Duration::from_secs(self.ready_timeout_s),
            fifo_timeout: Duration::from_millis(self.fifo_timeout_ms),
            ..Timing::default()
        }
    }

    pub fn switch_config(&self) -> SwitchConfig {
        let defaults = SwitchConfig::default();
        SwitchConfig {
            switch: self.switch.clone(),
            cli: self.cli.clone(),
            lock_dir: self.lock_dir.clone().unwrap_or(defaults.lock_dir),
            scratch_root: self
                .scratch_root
                .clone()
                .unwrap_or(defaults.scratch_root),
            keep_scratch: self.keep_scratch,
            priority: self.priority_transform(),
            timing: self.timing(),
            observation_log: self.observation_log.clone(),
            ..defaults
        }
    }
}

/// Terminal logger on stderr, filtered by `RUST_LOG` on top of a default
/// level. The guard flushes pending records when dropped.
pub fn logger(verbose: bool) -> (Logger, slog_async::AsyncGuard) {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let level = match verbose {
        true => FilterLevel::Debug,
        false => FilterLevel::Info,
    };
    let mut builder = slog_envlogger::LogBuilder::new(drain).filter(None, level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder = builder.parse(&filters);
    }
    let drain = builder.build().fuse();
    let (drain, guard) = slog_async::Async::new(drain).build_with_guard();
    (Logger::root(drain.fuse(), o!()), guard)
}

/// Read and parse a scenario file, printing any errors.
pub fn parse_file(path: &Path, opts: &Opts) -> Result<Option<Scenario>> {
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow!("read scenario: {}: {}", path.display(), e))?;
    let scenario = stf::parse(
        &text,
        Arc::new(path.display().to_string()),
        opts.show_tokens,
    );
    if opts.show_ast {
        println!("{:#?}", scenario.statements);
    }
    if scenario.error_count() > 0 {
        for e in &scenario.errors {
            println!("{}", e);
        }
        return Ok(None);
    }
    Ok(Some(scenario))
}

pub fn load_program(path: &Path) -> Result<Program> {
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow!("read program: {}: {}", path.display(), e))?;
    Program::from_json(&text)
        .map_err(|e| anyhow!("load program: {}: {}", path.display(), e))
}

/// Encode a scenario without a switch, returning the commands it produces.
pub fn check(
    program: &Program,
    scenario: &Scenario,
    priority: PriorityTransform,
    log: &Logger,
) -> Result<Vec<String>, stf_bmv2::Error> {
    let encoder = Encoder::new(program, priority, log.clone());
    let mut executor = Executor::new(
        encoder,
        Vec::<String>::new(),
        Vec::<(u32, Vec<u8>)>::new(),
        Timing::immediate(),
        log.clone(),
    );
    executor.run(scenario)?;
    let (_, _, commands, _) = executor.finish();
    Ok(commands)
}

/// Locate an executable the way a shell would.
pub fn find_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.into());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

pub fn run(opts: &Opts, log: &Logger) -> Result<Outcome> {
    let Some(scenario) = parse_file(&opts.stf, opts)? else {
        return Ok(Outcome::Failure);
    };
    let program = load_program(&opts.program)?;

    if opts.check {
        return match check(&program, &scenario, opts.priority_transform(), log)
        {
            Ok(commands) => {
                for c in commands {
                    println!("{}", c);
                }
                Ok(Outcome::Success)
            }
            Err(e) => {
                println!("{}: {}", "error".bright_red(), e);
                Ok(Outcome::Failure)
            }
        };
    }

    let mut config = opts.switch_config();
    for exe in [&mut config.switch, &mut config.cli] {
        match find_executable(exe) {
            Some(found) => *exe = found,
            None => {
                println!(
                    "{}: {} not found",
                    "skipped".yellow(),
                    exe.display()
                );
                return Ok(Outcome::Skipped);
            }
        }
    }

    let name = opts.stf.display().to_string();
    match switch::run(&opts.program, &program, &scenario, &config, log) {
        Ok(summary) => {
            info!(log, "run complete";
                "commands" => summary.report.commands.len(),
                "packets" => summary.report.packets,
            );
            if let Some(dir) = summary.scratch {
                println!("scratch: {}", dir.display());
            }
            println!("{} {}", "PASS".green(), name);
            Ok(Outcome::Success)
        }
        Err(e) => {
            println!("{}: {}", "error".bright_red(), e);
            println!("{} {}", "FAIL".bright_red(), name);
            Ok(Outcome::Failure)
        }
    }
}
