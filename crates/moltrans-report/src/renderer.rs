//! External renderer process runner.
//!
//! The renderer is an opaque executable (typically `java` with the diagram
//! classes on its classpath). Each run is bounded by a timeout and can be
//! cancelled; in both cases the child is killed and the run is reported as
//! a `RenderOutcome`, not an error.

use crate::config::RendererConfig;
use crate::jobs::{RenderJobSpec, RendererEntry};
use moltrans_core::{Result, TransitionError};
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared flag that aborts a running renderer
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Captured result of one renderer process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRun {
    pub program: String,
    pub args: Vec<String>,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
}

impl ProcessRun {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// What became of a render job
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    /// Renderer exited with status 0
    Completed { artifact: PathBuf, run: ProcessRun },
    /// Renderer exited with a failure status; the artifact must not be used
    Failed {
        expected_artifact: PathBuf,
        run: ProcessRun,
    },
    /// Renderer ran past its timeout and was killed
    TimedOut {
        expected_artifact: PathBuf,
        run: ProcessRun,
        timeout_ms: u64,
    },
    /// Cancellation was requested while the renderer ran; it was killed
    Cancelled {
        expected_artifact: PathBuf,
        run: ProcessRun,
    },
}

impl RenderOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RenderOutcome::Completed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RenderOutcome::Cancelled { .. })
    }

    pub fn artifact(&self) -> Option<&Path> {
        match self {
            RenderOutcome::Completed { artifact, .. } => Some(artifact),
            _ => None,
        }
    }

    /// Artifact path the job was asked to produce, whether or not it did
    pub fn expected_artifact(&self) -> &Path {
        match self {
            RenderOutcome::Completed { artifact, .. } => artifact,
            RenderOutcome::Failed { expected_artifact, .. }
            | RenderOutcome::TimedOut { expected_artifact, .. }
            | RenderOutcome::Cancelled { expected_artifact, .. } => expected_artifact,
        }
    }

    pub fn run(&self) -> &ProcessRun {
        match self {
            RenderOutcome::Completed { run, .. }
            | RenderOutcome::Failed { run, .. }
            | RenderOutcome::TimedOut { run, .. }
            | RenderOutcome::Cancelled { run, .. } => run,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            RenderOutcome::Completed { .. } => "completed",
            RenderOutcome::Failed { .. } => "failed",
            RenderOutcome::TimedOut { .. } => "timed out",
            RenderOutcome::Cancelled { .. } => "cancelled",
        }
    }

    /// Artifact path, or the error matching how the run ended
    pub fn into_artifact(self) -> Result<PathBuf> {
        match self {
            RenderOutcome::Completed { artifact, .. } => Ok(artifact),
            RenderOutcome::Failed { run, .. } => Err(TransitionError::RendererProcessFailed {
                program: run.program,
                exit_code: run.exit_code,
                stderr: run.stderr,
            }),
            RenderOutcome::TimedOut {
                run, timeout_ms, ..
            } => Err(TransitionError::RendererTimedOut {
                program: run.program,
                millis: timeout_ms,
            }),
            RenderOutcome::Cancelled { run, .. } => {
                Err(TransitionError::RendererCancelled(run.program))
            }
        }
    }
}

/// Configured renderer executable
#[derive(Debug, Clone)]
pub struct RendererProcess {
    program: PathBuf,
    base_args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
    dendrogram_entry: String,
    cluster_entry: String,
    member_entry: String,
    cancel: CancellationToken,
}

impl RendererProcess {
    pub fn from_config(config: &RendererConfig) -> Self {
        Self {
            program: config.executable.clone(),
            base_args: config.args.clone(),
            working_dir: config.working_dir.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            dendrogram_entry: config.dendrogram_entry.clone(),
            cluster_entry: config.cluster_entry.clone(),
            member_entry: config.member_entry.clone(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn entry_name(&self, entry: RendererEntry) -> &str {
        match entry {
            RendererEntry::Dendrogram => &self.dendrogram_entry,
            RendererEntry::ClusterDiagram => &self.cluster_entry,
            RendererEntry::TransitionDiagram => &self.member_entry,
        }
    }

    /// Absolute path of the executable. Bare names are looked up on PATH.
    pub fn resolve(&self) -> Result<PathBuf> {
        if self.program.components().count() > 1 {
            if self.program.is_file() {
                return Ok(self.program.clone());
            }
            return Err(TransitionError::RendererNotFound(format!(
                "{} does not exist",
                self.program.display()
            )));
        }
        which::which(&self.program).map_err(|e| {
            TransitionError::RendererNotFound(format!("{}: {}", self.program.display(), e))
        })
    }

    /// Run the renderer for a prepared job and wait for it to exit, time
    /// out or be cancelled. Errors mean the process could not be run at all.
    pub fn run(&self, spec: &RenderJobSpec) -> Result<RenderOutcome> {
        let program = self.resolve()?;
        let program_name = program.display().to_string();

        let mut args = self.base_args.clone();
        args.push(self.entry_name(spec.entry).to_string());
        args.extend(spec.args.iter().cloned());

        let job_dir = spec.job_dir();
        let stem = spec
            .expected_artifact
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| spec.entry.to_string());
        let stdout_path = job_dir.join(format!("{}.stdout.log", stem));
        let stderr_path = job_dir.join(format!("{}.stderr.log", stem));
        let stdout_file = File::create(&stdout_path).map_err(|e| TransitionError::io(&stdout_path, e))?;
        let stderr_file = File::create(&stderr_path).map_err(|e| TransitionError::io(&stderr_path, e))?;

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file));
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        log::info!("Running renderer: {} {}", program_name, args.join(" "));
        let mut child = command.spawn().map_err(|e| {
            TransitionError::RendererNotFound(format!("failed to start {}: {}", program_name, e))
        })?;

        let started = Instant::now();
        let timeout_ms = self.timeout.as_millis() as u64;
        let ending = loop {
            match child.try_wait() {
                Ok(Some(status)) => break RunEnding::Exited(status.code()),
                Ok(None) => {
                    if self.cancel.is_cancelled() {
                        let _ = child.kill();
                        let _ = child.wait();
                        log::warn!("Renderer {} cancelled", program_name);
                        break RunEnding::Cancelled;
                    }
                    if started.elapsed() > self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        log::warn!("Renderer {} timed out after {} ms", program_name, timeout_ms);
                        break RunEnding::TimedOut;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(TransitionError::io(&program, e)),
            }
        };

        let read_capture = |path: &Path| -> Result<String> {
            let bytes = fs::read(path).map_err(|e| TransitionError::io(path, e))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        };

        let run = ProcessRun {
            program: program_name,
            args,
            exit_code: match ending {
                RunEnding::Exited(code) => code,
                _ => None,
            },
            stdout: read_capture(&stdout_path)?,
            stderr: read_capture(&stderr_path)?,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        let expected_artifact = spec.expected_artifact.clone();

        Ok(match ending {
            RunEnding::Cancelled => RenderOutcome::Cancelled {
                expected_artifact,
                run,
            },
            RunEnding::TimedOut => RenderOutcome::TimedOut {
                expected_artifact,
                run,
                timeout_ms,
            },
            RunEnding::Exited(_) if run.success() => {
                log::info!(
                    "Renderer finished in {} ms, artifact {}",
                    run.elapsed_ms,
                    expected_artifact.display()
                );
                RenderOutcome::Completed {
                    artifact: expected_artifact,
                    run,
                }
            }
            RunEnding::Exited(_) => {
                log::warn!(
                    "Renderer exited with {:?}: {}",
                    run.exit_code,
                    run.stderr.trim()
                );
                RenderOutcome::Failed {
                    expected_artifact,
                    run,
                }
            }
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum RunEnding {
    Exited(Option<i32>),
    TimedOut,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_run() -> ProcessRun {
        ProcessRun {
            program: "java".into(),
            args: vec![],
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "Exception in thread main".into(),
            elapsed_ms: 3,
        }
    }

    #[test]
    fn test_cancellation_token_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_failed_outcome_has_no_artifact() {
        let outcome = RenderOutcome::Failed {
            expected_artifact: PathBuf::from("out/job/dendrogram.png"),
            run: failed_run(),
        };
        assert!(!outcome.is_completed());
        assert!(outcome.artifact().is_none());
        assert!(matches!(
            outcome.into_artifact(),
            Err(TransitionError::RendererProcessFailed { exit_code: Some(1), .. })
        ));
    }

    #[test]
    fn test_timed_out_outcome_reports_millis() {
        let outcome = RenderOutcome::TimedOut {
            expected_artifact: PathBuf::from("out/job/1_CD.png"),
            run: ProcessRun {
                exit_code: None,
                ..failed_run()
            },
            timeout_ms: 300,
        };
        assert_eq!(outcome.status(), "timed out");
        assert_eq!(outcome.expected_artifact(), Path::new("out/job/1_CD.png"));
        assert!(matches!(
            outcome.into_artifact(),
            Err(TransitionError::RendererTimedOut { millis: 300, .. })
        ));
    }

    #[test]
    fn test_missing_executable() {
        let config = RendererConfig {
            executable: PathBuf::from("/nonexistent/renderer-bin"),
            ..RendererConfig::default()
        };
        let renderer = RendererProcess::from_config(&config);
        assert!(matches!(renderer.resolve(), Err(TransitionError::RendererNotFound(_))));

        let config = RendererConfig {
            executable: PathBuf::from("moltrans-no-such-renderer"),
            ..RendererConfig::default()
        };
        assert!(RendererProcess::from_config(&config).resolve().is_err());
    }

    #[test]
    fn test_entry_names_from_config() {
        let renderer = RendererProcess::from_config(&RendererConfig::default());
        assert_eq!(renderer.entry_name(RendererEntry::Dendrogram), "Dendrogram");
        assert_eq!(renderer.entry_name(RendererEntry::ClusterDiagram), "ClusterDiagram");
        assert_eq!(renderer.entry_name(RendererEntry::TransitionDiagram), "TransitionDiagram");
    }
}
