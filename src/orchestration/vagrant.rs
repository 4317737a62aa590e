//! Vagrant CLI driver
//!
//! Implements the `VmDriver` trait by shelling out to `vagrant` in the
//! buildserver working directory. All child output is appended to
//! `vagrant.log` in that directory so the tail monitor can echo it; a
//! non-zero exit from any command is fatal for the run.

use crate::error::{BuildServerError, BuildServerResult};
use crate::orchestration::driver::{BoxInfo, VmDriver, VmState};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Max number of output lines to include in command error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Driver that runs the `vagrant` binary
pub struct VagrantCli {
    serve_dir: PathBuf,
    log_path: PathBuf,
}

impl VagrantCli {
    /// Create a driver rooted at the Vagrant working directory
    pub fn new(serve_dir: PathBuf) -> Self {
        let log_path = serve_dir.join("vagrant.log");
        Self {
            serve_dir,
            log_path,
        }
    }

    /// The log file all command output is appended to
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Fail early if the vagrant binary is not on PATH
    pub async fn ensure_available(&self) -> BuildServerResult<()> {
        let found = Command::new("vagrant")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);

        if found {
            Ok(())
        } else {
            Err(BuildServerError::VagrantNotFound)
        }
    }

    /// Run a vagrant command, returning its stdout. Output is logged and
    /// a non-zero exit becomes a command execution error carrying the
    /// tail of the combined output.
    async fn exec(&self, args: &[&str]) -> BuildServerResult<String> {
        debug!("Executing: vagrant {:?}", args);

        let mut child = Command::new("vagrant")
            .args(args)
            .current_dir(&self.serve_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BuildServerError::command_failed(format!("vagrant {:?}", args), e))?;

        let lines = self.stream_to_log(&mut child).await?;

        let status = child
            .wait()
            .await
            .map_err(|e| BuildServerError::command_failed(format!("vagrant {:?}", args), e))?;

        if status.success() {
            Ok(lines.join("\n"))
        } else {
            let total = lines.len();
            let tail = if total > ERROR_TAIL_LINES {
                lines[total - ERROR_TAIL_LINES..].join("\n")
            } else {
                lines.join("\n")
            };
            Err(BuildServerError::command_exec(
                format!("vagrant {}", args.join(" ")),
                tail,
            ))
        }
    }

    /// Stream child stdout+stderr line by line into the log file,
    /// returning all collected lines for error reporting.
    async fn stream_to_log(
        &self,
        child: &mut tokio::process::Child,
    ) -> BuildServerResult<Vec<String>> {
        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .map_err(|e| {
                BuildServerError::io(format!("opening {}", self.log_path.display()), e)
            })?;

        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();

        let mut all_lines = Vec::new();
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !stdout_done || !stderr_done {
            let line = tokio::select! {
                line = stdout_reader.next_line(), if !stdout_done => {
                    match line {
                        Ok(Some(line)) => Some(line),
                        _ => {
                            stdout_done = true;
                            None
                        }
                    }
                }
                line = stderr_reader.next_line(), if !stderr_done => {
                    match line {
                        Ok(Some(line)) => Some(line),
                        _ => {
                            stderr_done = true;
                            None
                        }
                    }
                }
            };

            if let Some(line) = line {
                let _ = log.write_all(line.as_bytes()).await;
                let _ = log.write_all(b"\n").await;
                all_lines.push(line);
            }
        }
        let _ = log.flush().await;

        Ok(all_lines)
    }
}

#[async_trait]
impl VmDriver for VagrantCli {
    async fn status(&self) -> BuildServerResult<VmState> {
        let output = self.exec(&["status", "--machine-readable"]).await?;
        Ok(parse_status(&output))
    }

    async fn box_list(&self) -> BuildServerResult<Vec<BoxInfo>> {
        let output = self.exec(&["box", "list"]).await?;
        Ok(parse_box_list(&output))
    }

    async fn box_add(
        &self,
        name: &str,
        source: &str,
        provider: &str,
        version: Option<&str>,
        force: bool,
    ) -> BuildServerResult<()> {
        info!("Adding box {} from {}", name, source);

        let mut args = vec!["box", "add", "--name", name, "--provider", provider];
        if let Some(version) = version {
            args.push("--box-version");
            args.push(version);
        }
        if force {
            args.push("--force");
        }
        args.push(source);

        self.exec(&args).await?;
        Ok(())
    }

    async fn up(&self, provision: bool) -> BuildServerResult<()> {
        info!("Bringing up the build server VM (this takes a while)");

        let mut args = vec!["up"];
        if provision {
            args.push("--provision");
        } else {
            args.push("--no-provision");
        }

        self.exec(&args).await?;
        Ok(())
    }

    async fn halt(&self) -> BuildServerResult<()> {
        info!("Halting the VM");
        self.exec(&["halt"]).await?;
        Ok(())
    }

    async fn destroy(&self) -> BuildServerResult<()> {
        info!("Destroying the VM");
        self.exec(&["destroy", "--force"]).await?;
        Ok(())
    }

    async fn package(&self, output: &Path) -> BuildServerResult<()> {
        info!("Packaging the VM into {}", output.display());
        let output_str = output.to_string_lossy();
        self.exec(&["package", "--output", &output_str]).await?;
        Ok(())
    }

    async fn ssh_config(&self) -> BuildServerResult<String> {
        self.exec(&["ssh-config"]).await
    }

    async fn ssh_run(&self, command: &str) -> BuildServerResult<()> {
        debug!("Guest command: {}", command);
        self.exec(&["ssh", "-c", command]).await?;
        Ok(())
    }

    async fn snapshot_list(&self) -> BuildServerResult<String> {
        self.exec(&["snapshot", "list"]).await
    }
}

/// Pull the state value out of `status --machine-readable` output.
///
/// Rows look like `1614697,default,state,running`.
fn parse_status(output: &str) -> VmState {
    for line in output.lines() {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() >= 4 && fields[2] == "state" {
            return VmState::parse(fields[3]);
        }
    }
    VmState::NotCreated
}

/// Parse `vagrant box list` rows: `name (provider, version)`
fn parse_box_list(output: &str) -> Vec<BoxInfo> {
    let mut boxes = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        let Some((name, rest)) = line.split_once(" (") else {
            continue;
        };
        let name = name.trim_end();
        if name.is_empty() {
            continue;
        }
        let Some(rest) = rest.strip_suffix(')') else {
            continue;
        };
        let Some((provider, version)) = rest.split_once(", ") else {
            continue;
        };
        boxes.push(BoxInfo {
            name: name.to_string(),
            provider: provider.to_string(),
            version: version.to_string(),
        });
    }
    boxes
}
