//! Trial invocation: one external simulator process per seed.
//!
//! Argument vector:
//!   `<script> <token>... -d <turns> -s <seed> -o <oAlg> -f <fAlg>`
//! run as `<interpreter> <argv>` in a fixed working directory.
//!
//! RULES:
//!   - A gate slot is held for exactly the lifetime of the process. The
//!     permit is an RAII guard so every exit path releases it.
//!   - Standard output is buffered until exit, then decoded in one go. It
//!     must hold one result line per federate of the run.
//!   - No retries. Spawn failures, bad exits, bad output, timeouts and
//!     cancellations are distinct `TrialError` variants.

use crate::{
    config::Settings,
    error::TrialError,
    gate::{CancelToken, ConcurrencyGate},
    output::decode_cash_lines,
    record::{TrialConfig, TrialRecord, TrialResults},
    run_config::RunConfig,
    types::{Priority, Seed, SimulationInfo},
};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long to wait for pipe readers after killing a process. A grandchild
/// still holding the pipe would otherwise block the job forever.
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
/// Stderr lines kept for the error message of a failed trial.
const STDERR_TAIL_LINES: usize = 20;

/// How to start the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorCommand {
    pub interpreter: String,
    pub script:      PathBuf,
    pub working_dir: PathBuf,
    pub timeout:     Option<Duration>,
}

impl SimulatorCommand {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interpreter: settings.interpreter.clone(),
            script:      settings.script.clone(),
            working_dir: settings.working_dir.clone(),
            timeout:     settings.trial_timeout(),
        }
    }
}

/// Everything needed to run one seed.
#[derive(Debug, Clone, Copy)]
pub struct TrialJob<'a> {
    pub seed:     Seed,
    pub config:   &'a RunConfig,
    pub tokens:   &'a [String],
    pub priority: Priority,
}

pub struct TrialInvoker<'g> {
    gate:       &'g ConcurrencyGate,
    command:    SimulatorCommand,
    simulation: SimulationInfo,
}

impl<'g> TrialInvoker<'g> {
    pub fn new(gate: &'g ConcurrencyGate, command: SimulatorCommand, simulation: SimulationInfo) -> Self {
        Self { gate, command, simulation }
    }

    pub fn build_args(&self, job: &TrialJob<'_>) -> Vec<String> {
        let mut args = Vec::with_capacity(job.tokens.len() + 9);
        args.push(self.command.script.to_string_lossy().into_owned());
        args.extend(job.tokens.iter().cloned());
        args.extend([
            "-d".to_string(), job.config.turns.to_string(),
            "-s".to_string(), job.seed.to_string(),
            "-o".to_string(), job.config.o_alg.clone(),
            "-f".to_string(), job.config.f_alg.clone(),
        ]);
        args
    }

    /// Run one trial to completion under the gate.
    pub fn run(&self, job: &TrialJob<'_>, cancel: &CancelToken) -> Result<TrialRecord, TrialError> {
        let args = self.build_args(job);
        let stdout = {
            let Some(_permit) = self.gate.acquire_cancellable(job.priority, cancel) else {
                return Err(TrialError::Cancelled);
            };
            self.run_process(job.seed, &args, cancel)?
        };

        let columns = decode_cash_lines(&stdout, job.config.federate_ids.len())?;
        Ok(TrialRecord {
            simulation:    self.simulation.clone(),
            seed:          job.seed,
            configuration: TrialConfig {
                run:        job.config.clone(),
                start_cash: columns.start_cash,
            },
            results: TrialResults { end_cash: columns.end_cash },
        })
    }

    fn run_process(&self, seed: Seed, args: &[String], cancel: &CancelToken) -> Result<String, TrialError> {
        log::debug!("seed={seed} spawning {} {}", self.command.interpreter, args.join(" "));
        let started = Instant::now();

        let mut child = Command::new(&self.command.interpreter)
            .args(args)
            .current_dir(&self.command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TrialError::Spawn {
                program: self.command.interpreter.clone(),
                source,
            })?;

        let stdout_reader = child.stdout.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                pipe.read_to_end(&mut buf).map(|_| buf)
            })
        });
        let stderr_reader = child.stderr.take().map(|pipe| {
            thread::spawn(move || {
                let mut tail = Vec::new();
                for line in BufReader::new(pipe).lines().map_while(Result::ok) {
                    log::warn!("seed={seed} stderr: {line}");
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
                tail.join("\n")
            })
        });

        let status = match self.wait(&mut child, cancel, started) {
            Ok(status) => status,
            Err(err) => {
                abandon_reader(stdout_reader);
                abandon_reader(stderr_reader);
                return Err(err);
            }
        };

        let stdout = match stdout_reader {
            Some(handle) => handle
                .join()
                .map_err(|_| TrialError::Output(std::io::Error::other("stdout reader panicked")))?
                .map_err(TrialError::Output)?,
            None => Vec::new(),
        };
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        log::debug!("seed={seed} exited with {status} after {:?}", started.elapsed());
        if !status.success() {
            return Err(TrialError::Exit { code: status.code(), stderr });
        }
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Wait for exit, killing the process on deadline or cancellation.
    fn wait(&self, child: &mut Child, cancel: &CancelToken, started: Instant) -> Result<ExitStatus, TrialError> {
        loop {
            if let Some(status) = child.try_wait().map_err(TrialError::Output)? {
                return Ok(status);
            }
            if let Some(limit) = self.command.timeout {
                if started.elapsed() >= limit {
                    kill_and_reap(child);
                    return Err(TrialError::Timeout { secs: limit.as_secs() });
                }
            }
            if cancel.is_cancelled() {
                kill_and_reap(child);
                return Err(TrialError::Cancelled);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("failed to kill simulator process {}: {e}", child.id());
    }
    let _ = child.wait();
}

/// Give a pipe reader a short grace period, then leave it to finish on its
/// own when the last writer closes the pipe.
fn abandon_reader<T>(reader: Option<JoinHandle<T>>) {
    let Some(handle) = reader else { return };
    let deadline = Instant::now() + READER_JOIN_TIMEOUT;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return;
        }
        thread::sleep(POLL_INTERVAL);
    }
    let _ = handle.join();
}
