// Copyright 2024 Oxide Computer Company

//! Running a scenario against a simple_switch process.

use crate::compare::compare_outputs;
use crate::encode::{Encoder, PriorityTransform};
use crate::error::{Error, SwitchError};
use crate::executor::{
    check_counters, interfaces, CliChannel, Executor, PortWriters, Report,
    Timing,
};
use crate::lease::{Lease, LeaseAllocator};
use crate::pcap::PcapWriter;
use crate::schema::Program;
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::Mode;
use nix::unistd::{mkfifo, Pid};
use pcap_parser::Linktype;
use slog::{debug, info, warn, Logger};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use stf::ast::Scenario;

/// Everything needed to launch and drive a switch.
#[derive(Debug, Clone)]
pub struct SwitchConfig {
    pub switch: PathBuf,
    pub cli: PathBuf,

    /// Control ports are `thrift_base + lease`.
    pub thrift_base: u16,

    /// Leases, and with them device ids, are taken from `0..=lease_max`.
    pub lease_max: u32,
    pub lock_dir: PathBuf,

    pub scratch_root: PathBuf,
    pub keep_scratch: bool,

    pub priority: PriorityTransform,
    pub timing: Timing,

    /// Where to write observed packets, one `<port> <HEX>` line each.
    pub observation_log: Option<PathBuf>,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            switch: "simple_switch".into(),
            cli: "simple_switch_CLI".into(),
            thrift_base: 9090,
            lease_max: 1000,
            lock_dir: tmp.join("stf-locks"),
            scratch_root: tmp,
            keep_scratch: false,
            priority: PriorityTransform::default(),
            timing: Timing::default(),
            observation_log: None,
        }
    }
}

/// The result of a run that got as far as comparing output.
#[derive(Debug)]
pub struct RunSummary {
    pub report: Report,

    /// The scratch directory, if it was kept.
    pub scratch: Option<PathBuf>,
}

/// A child process that is killed if still running when dropped.
struct ChildGuard {
    child: Child,
    name: &'static str,
    log: Logger,
}

impl ChildGuard {
    fn spawn(
        command: &mut Command,
        name: &'static str,
        log: &Logger,
    ) -> Result<Self, SwitchError> {
        let child = command.spawn().map_err(|source| SwitchError::Spawn {
            program: format!("{:?}", command.get_program()),
            source,
        })?;
        info!(log, "launched"; "process" => name, "pid" => child.id());
        Ok(Self {
            child,
            name,
            log: log.clone(),
        })
    }

    fn pid(&self) -> Pid {
        Pid::from_raw(self.child.id() as i32)
    }

    fn exited(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit on its own, up to `timeout`.
    fn wait_timeout(
        &mut self,
        timeout: Duration,
    ) -> io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            warn!(self.log, "killing"; "process" => self.name);
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Removes a file when dropped, if it exists.
struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

pub fn fifo_path(dir: &Path, port: u32) -> PathBuf {
    dir.join(format!("pcap{}_in.pcap", port))
}

pub fn notifications_path(device: u32) -> PathBuf {
    std::env::temp_dir().join(format!("bmv2-{}-notifications.ipc", device))
}

/// Command line for the switch.
pub fn switch_command(
    config: &SwitchConfig,
    program: &Path,
    scratch: &Path,
    thrift_port: u16,
    device: u32,
    ports: impl IntoIterator<Item = u32>,
) -> Command {
    let mut cmd = Command::new(&config.switch);
    cmd.current_dir(scratch)
        .arg("--log-file")
        .arg("switch.log")
        .arg("--log-flush")
        .arg("--use-files")
        .arg("0")
        .arg("--thrift-port")
        .arg(thrift_port.to_string())
        .arg("--device-id")
        .arg(device.to_string())
        .arg("--notifications-addr")
        .arg(format!("ipc://{}", notifications_path(device).display()));
    for port in ports {
        cmd.arg("-i").arg(format!("{}@pcap{}", port, port));
    }
    cmd.arg(program);
    cmd
}

/// Create the input FIFO for every port, in ascending order.
pub fn create_fifos(
    dir: &Path,
    ports: impl IntoIterator<Item = u32>,
) -> Result<(), SwitchError> {
    for port in ports {
        mkfifo(&fifo_path(dir, port), Mode::S_IRUSR | Mode::S_IWUSR)?;
    }
    Ok(())
}

/// Open a FIFO for writing once its reader shows up. Opening a FIFO with no
/// reader either blocks or, non blocking, fails with ENXIO, so poll with
/// non blocking opens and check that the switch is still alive in between.
fn open_fifo(
    path: &Path,
    timeout: Duration,
    switch: &mut ChildGuard,
) -> Result<File, SwitchError> {
    let deadline = Instant::now() + timeout;
    loop {
        match OpenOptions::new()
            .write(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(path)
        {
            Ok(probe) => {
                let file = OpenOptions::new().write(true).open(path)?;
                drop(probe);
                return Ok(file);
            }
            Err(e) if e.raw_os_error() == Some(nix::libc::ENXIO) => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(status) = switch.exited()? {
            return Err(SwitchError::EarlyExit(status.to_string()));
        }
        if Instant::now() >= deadline {
            return Err(SwitchError::FifoTimeout(path.into()));
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Poll the control port until it accepts connections.
fn wait_ready(
    port: u16,
    timing: &Timing,
    switch: &mut ChildGuard,
    log: &Logger,
) -> Result<(), SwitchError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let deadline = Instant::now() + timing.ready_timeout;
    loop {
        let started = Instant::now();
        match TcpStream::connect_timeout(&addr, timing.ready_poll) {
            Ok(_) => {
                info!(log, "switch ready"; "thrift_port" => port);
                return Ok(());
            }
            Err(e) => debug!(log, "switch not ready"; "error" => e.to_string()),
        }
        if let Some(status) = switch.exited()? {
            return Err(SwitchError::EarlyExit(status.to_string()));
        }
        if Instant::now() >= deadline {
            return Err(SwitchError::NotReady(port, timing.ready_timeout));
        }
        // refused connections return at once, keep the poll period
        let elapsed = started.elapsed();
        if elapsed < timing.ready_poll {
            std::thread::sleep(timing.ready_poll - elapsed);
        }
    }
}

/// Exit statuses accepted from a switch asked to terminate.
pub fn acceptable_exit(status: &ExitStatus) -> bool {
    status.code() == Some(0) || status.signal() == Some(Signal::SIGTERM as i32)
}

fn terminate(
    switch: &mut ChildGuard,
    timeout: Duration,
) -> Result<(), SwitchError> {
    if let Some(status) = switch.exited()? {
        // already gone, nothing to signal
        return match acceptable_exit(&status) {
            true => Ok(()),
            false => Err(SwitchError::BadExit(status.to_string())),
        };
    }
    kill(switch.pid(), Signal::SIGTERM)?;
    match switch.wait_timeout(timeout)? {
        Some(status) if acceptable_exit(&status) => Ok(()),
        Some(status) => Err(SwitchError::BadExit(status.to_string())),
        None => Err(SwitchError::BadExit(format!(
            "no exit within {:?} of SIGTERM",
            timeout
        ))),
    }
}

/// Run a parsed scenario against a fresh switch instance loaded with
/// `program_path`. Every process and file created along the way is cleaned
/// up on return, successful or not, apart from a kept scratch directory.
pub fn run(
    program_path: &Path,
    program: &Program,
    scenario: &Scenario,
    config: &SwitchConfig,
    log: &Logger,
) -> Result<RunSummary, Error> {
    if scenario.error_count() > 0 {
        return Err(Error::Parse(scenario.error_count()));
    }
    let program_path = fs::canonicalize(program_path)?;

    let allocator = LeaseAllocator::new(&config.lock_dir, config.lease_max, log.clone())?;
    let reaped = allocator.reap_stale()?;
    if reaped > 0 {
        info!(log, "reaped stale leases"; "count" => reaped);
    }
    let lease: Lease = allocator.acquire()?;
    let device = lease.number;
    let thrift_port = u16::try_from(u32::from(config.thrift_base) + device)
        .map_err(|_| SwitchError::NoLease(config.lock_dir.clone()))?;
    let _notifications = RemoveOnDrop(notifications_path(device));

    let scratch = tempfile::Builder::new()
        .prefix("stf-")
        .tempdir_in(&config.scratch_root)?;
    let dir = scratch.path().to_path_buf();
    let log = log.new(slog::o!(
        "device" => device,
        "thrift_port" => thrift_port,
    ));
    info!(log, "scratch directory"; "path" => dir.display().to_string());

    let result = drive(&program_path, program, scenario, config, &dir, thrift_port, device, &log);

    let kept = match config.keep_scratch {
        true => {
            let path = scratch.keep();
            info!(log, "keeping scratch directory"; "path" => path.display().to_string());
            Some(path)
        }
        false => None,
    };
    drop(lease);

    result.map(|report| RunSummary {
        report,
        scratch: kept,
    })
}

#[allow(clippy::too_many_arguments)]
fn drive(
    program_path: &Path,
    program: &Program,
    scenario: &Scenario,
    config: &SwitchConfig,
    dir: &Path,
    thrift_port: u16,
    device: u32,
    log: &Logger,
) -> Result<Report, Error> {
    let ports = interfaces(scenario);
    create_fifos(dir, ports.iter().copied())?;

    let mut switch = ChildGuard::spawn(
        switch_command(
            config,
            program_path,
            dir,
            thrift_port,
            device,
            ports.iter().copied(),
        )
        .stdout(Stdio::null())
        .stderr(File::create(dir.join("switch.err"))?),
        "simple_switch",
        log,
    )?;

    // the switch opens its inputs in ascending port order and blocks on
    // each until a writer appears
    let mut inputs = PortWriters::new();
    for port in &ports {
        let fifo = open_fifo(
            &fifo_path(dir, *port),
            config.timing.fifo_timeout,
            &mut switch,
        )?;
        inputs.insert(*port, PcapWriter::new(fifo, Linktype(0))?);
        debug!(log, "input open"; "port" => port);
    }

    wait_ready(thrift_port, &config.timing, &mut switch, log)?;

    let cli_log = File::create(dir.join("cli.log"))?;
    let mut cli = ChildGuard::spawn(
        Command::new(&config.cli)
            .arg("--thrift-port")
            .arg(thrift_port.to_string())
            .current_dir(dir)
            .stdin(Stdio::piped())
            .stdout(cli_log.try_clone()?)
            .stderr(cli_log),
        "simple_switch_CLI",
        log,
    )?;
    let stdin = cli.child.stdin.take().ok_or_else(|| {
        io::Error::new(io::ErrorKind::BrokenPipe, "cli stdin unavailable")
    })?;

    let encoder = Encoder::new(program, config.priority, log.clone());
    let mut executor = Executor::new(
        encoder,
        CliChannel::new(stdin),
        inputs,
        config.timing.clone(),
        log.clone(),
    );
    let executed = executor.run(scenario);
    let (mut expected, report, commands, inputs) = executor.finish();

    // end of input for both the CLI and the switch
    drop(commands);
    drop(inputs);
    if cli.wait_timeout(config.timing.exit_timeout)?.is_none() {
        warn!(log, "cli did not exit after end of input");
    }
    executed?;

    std::thread::sleep(config.timing.settle);
    terminate(&mut switch, config.timing.exit_timeout)?;
    info!(log, "switch stopped");

    let mut observations = match &config.observation_log {
        Some(path) => Some(File::create(path)?),
        None => None,
    };
    compare_outputs(
        dir,
        ports.iter().copied(),
        &mut expected,
        observations.as_mut().map(|f| f as &mut dyn io::Write),
        log,
    )?;

    let transcript = fs::read_to_string(dir.join("cli.log"))?;
    check_counters(&transcript, &report.counter_reads, log)?;

    Ok(report)
}
