use crate::types::{SarError, SarResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::process::Command;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_./:=+,@%-]+$").expect("token pattern is valid")
    })
}

/// An external program and its argument list, run without a shell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCommand {
    pub program: String,
    #[serde(default, rename = "arg")]
    pub args: Vec<String>,
}

impl ExternalCommand {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Split a whitespace-separated command line; no quoting is supported
    pub fn parse(line: &str) -> SarResult<Self> {
        let mut tokens = line.split_whitespace().map(str::to_string);
        let program = tokens
            .next()
            .ok_or_else(|| SarError::Input("Empty command line".to_string()))?;
        Ok(Self {
            program,
            args: tokens.collect(),
        })
    }

    /// Replace `{name}` placeholders in the arguments
    pub fn substitute(&self, vars: &[(&str, String)]) -> Self {
        let args = self
            .args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{}}}", name), value)
                })
            })
            .collect();
        Self {
            program: self.program.clone(),
            args,
        }
    }

    /// Arguments must be drawn from a conservative character allow-list, so
    /// granule names, paths and coordinates substituted into them can never
    /// smuggle in anything shell-like. The configured program path is trusted.
    pub fn validate(&self) -> SarResult<()> {
        if self.program.trim().is_empty() {
            return Err(SarError::Input("Empty program name".to_string()));
        }
        for token in &self.args {
            if !token_pattern().is_match(token) {
                return Err(SarError::Input(format!(
                    "Refusing to run {}: argument '{}' contains disallowed characters",
                    self.program, token
                )));
            }
        }
        Ok(())
    }

    /// Run in `work_dir`, capturing output to `<log_stem>.out` / `<log_stem>.err`
    /// there. `target` names what is being processed, for error reports.
    pub fn run(
        &self,
        work_dir: &Path,
        log_stem: &str,
        timeout: Option<Duration>,
        target: &str,
    ) -> SarResult<()> {
        self.run_logged(work_dir, work_dir, log_stem, timeout, target)
    }

    /// Like [`ExternalCommand::run`], with the captured output written to `log_dir`
    pub fn run_logged(
        &self,
        work_dir: &Path,
        log_dir: &Path,
        log_stem: &str,
        timeout: Option<Duration>,
        target: &str,
    ) -> SarResult<()> {
        self.validate()?;

        let stdout = File::create(log_dir.join(format!("{}.out", log_stem)))?;
        let stderr = File::create(log_dir.join(format!("{}.err", log_stem)))?;

        log::info!(
            "Running {} {} in {}",
            self.program,
            self.args.join(" "),
            work_dir.display()
        );
        let started = Instant::now();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let status =
            runtime.block_on(self.spawn_and_wait(work_dir, stdout, stderr, timeout, target))?;

        log::debug!("{} finished in {:?}", self.program, started.elapsed());
        check_status(&self.program, status, target, log_dir, log_stem)
    }

    async fn spawn_and_wait(
        &self,
        work_dir: &Path,
        stdout: File,
        stderr: File,
        timeout: Option<Duration>,
        target: &str,
    ) -> SarResult<ExitStatus> {
        // `kill_on_drop` takes the child down if this future is abandoned
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SarError::ExternalTool {
                target: target.to_string(),
                message: format!("failed to start {}: {}", self.program, e),
            })?;

        let Some(limit) = timeout else {
            return Ok(child.wait().await?);
        };

        match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                log::error!("{} exceeded {:?}, killing it", self.program, limit);
                if let Err(e) = child.kill().await {
                    log::warn!("Failed to kill {}: {}", self.program, e);
                }
                Err(SarError::ExternalTool {
                    target: target.to_string(),
                    message: format!("{} timed out after {:?}", self.program, limit),
                })
            }
        }
    }
}

fn check_status(
    program: &str,
    status: ExitStatus,
    target: &str,
    log_dir: &Path,
    log_stem: &str,
) -> SarResult<()> {
    if status.success() {
        return Ok(());
    }
    Err(SarError::ExternalTool {
        target: target.to_string(),
        message: format!(
            "{} exited with {}; see {}",
            program,
            status,
            log_dir.join(format!("{}.err", log_stem)).display()
        ),
    })
}
