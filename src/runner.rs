//! Sequential test runner
//!
//! Spawns each discovered entry in turn with `Z_HARNESS=1` and streams its
//! stdout into a shared [`Aggregator`]. Test output is concatenated, one
//! process at a time; stderr is inherited.

use crate::aggregator::Aggregator;
use crate::config::ZConfig;
use crate::discovery::{TestEntry, TestKind};
use crate::signals;
use anyhow::{Context, Result};
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

/// Environment forwarded to every test
#[derive(Debug, Clone, Default)]
pub struct RunEnv {
    pub modes: String,
    pub tag_skip: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    /// Entries that were started
    pub started: usize,
    /// Entries that could not be spawned
    pub spawn_failures: usize,
    /// Entries that exited unsuccessfully
    pub nonzero_exits: usize,
    /// Lines read from all tests
    pub lines: usize,
    /// A shutdown signal stopped the run early
    pub interrupted: bool,
}

impl RunStats {
    /// Failures invisible to the aggregator
    pub fn has_runner_failures(&self) -> bool {
        self.spawn_failures > 0 || self.interrupted
    }
}

pub struct Runner<'a> {
    config: &'a ZConfig,
    env: RunEnv,
    echo: bool,
    shutdown: &'a AtomicBool,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a ZConfig, env: RunEnv) -> Self {
        Self {
            config,
            env,
            echo: false,
            shutdown: &signals::SHUTDOWN_REQUESTED,
        }
    }

    /// Watch `flag` instead of the process-wide signal flag
    pub fn shutdown_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.shutdown = flag;
        self
    }

    /// Copy every received line to stderr
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Build the command for one entry.
    pub fn command(&self, entry: &TestEntry) -> Command {
        let prefix = self.config.runners.command_for(entry.kind);
        let mut cmd = match prefix.split_first() {
            Some((program, args)) => {
                let mut cmd = Command::new(program);
                cmd.args(args).arg(&entry.test);
                cmd
            }
            // Relative program paths are ambiguous with current_dir
            None => Command::new(absolute(entry.path())),
        };

        cmd.current_dir(&entry.folder)
            .env("Z_HARNESS", "1")
            .env("Z_MODE", &self.env.modes)
            .env("Z_TAG_SKIP", &self.env.tag_skip)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if entry.kind == TestKind::Behave {
            cmd.env("Z_BEHAVE", "1");
        }
        cmd
    }

    /// Run every entry, feeding `aggregator`. Stops early on shutdown signals.
    pub fn run(&self, entries: &[TestEntry], aggregator: &mut Aggregator<'_>) -> Result<RunStats> {
        let mut stats = RunStats::default();

        for entry in entries {
            if self.shutdown.load(Ordering::SeqCst) {
                stats.interrupted = true;
                tracing::warn!(
                    "shutdown requested, {} test(s) not started",
                    entries.len() - stats.started
                );
                break;
            }
            stats.started += 1;
            self.run_one(entry, aggregator, &mut stats)?;
        }

        Ok(stats)
    }

    fn run_one(
        &self,
        entry: &TestEntry,
        aggregator: &mut Aggregator<'_>,
        stats: &mut RunStats,
    ) -> Result<()> {
        tracing::debug!(kind = %entry.kind, "starting {}", entry);

        let mut child = match self.command(entry).spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("failed to start {}: {}", entry, e);
                stats.spawn_failures += 1;
                return Ok(());
            }
        };

        if let Some(stdout) = child.stdout.take() {
            let reader = BufReader::new(stdout);
            let echo = self.echo;
            let lines = aggregator
                .read_from_with(reader, |line| {
                    if echo {
                        let mut err = std::io::stderr().lock();
                        let _ = writeln!(err, "{}", line);
                    }
                })
                .with_context(|| format!("reading output of {}", entry))?;
            stats.lines += lines;
        }

        let status = child
            .wait()
            .with_context(|| format!("waiting for {}", entry))?;
        if !status.success() {
            stats.nonzero_exits += 1;
            tracing::debug!("{} exited with {}", entry, status);
        }
        Ok(())
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

// =============================================================================
// Unit Tests
// =============================================================================
