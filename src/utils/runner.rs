// src/utils/runner.rs: shell command execution with live output relay

use std::process::{ExitStatus, Stdio};
use anyhow::{anyhow, Result};
use log::{debug, error, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use crate::config::defs::{RunConfig, KNOWN_TOOLS, MODULE_HINTS, NOT_FOUND_STATUS};
use crate::utils::file::find_tool;

const SHELL: &str = "/bin/sh";


/// Exit status of a finished command plus every line it wrote, stdout and
/// stderr interleaved in the order they arrived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessResult {
    pub status: i32,
    pub lines: Vec<String>,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}


/// Something that can execute a shell command line. Pipelines are generic over
/// this so the same stage list drives real runs and dry runs.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    async fn run(&mut self, command: &str) -> Result<ProcessResult>;
}


/// Runs commands through `/bin/sh -c` in the run's working directory with the
/// run's environment. Output lines are echoed as they arrive and kept in the
/// returned `ProcessResult`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    config: RunConfig,
    echo: bool,
}

impl ShellRunner {
    pub fn new(config: RunConfig) -> Self {
        ShellRunner { config, echo: true }
    }

    /// Keeps output in the result without printing it.
    pub fn quiet(config: RunConfig) -> Self {
        ShellRunner { config, echo: false }
    }

    /// The first word of `command` when it names a tool we know how to look
    /// for and that tool is missing from the run's PATH.
    fn missing_tool<'a>(&self, command: &'a str) -> Option<&'a str> {
        let program = command.split_whitespace().next()?;
        if !KNOWN_TOOLS.contains(&program) {
            return None;
        }
        let path_var = self.config.env.get("PATH").map(String::as_str);
        match find_tool(program, path_var, &self.config.cwd) {
            Some(_) => None,
            None => Some(program),
        }
    }
}

impl CommandRunner for ShellRunner {
    async fn run(&mut self, command: &str) -> Result<ProcessResult> {
        info!("Running: {}", command);

        if let Some(tool) = self.missing_tool(command) {
            error!("{} is not available in the PATH. Make sure it's installed and loaded.", tool);
            report_failure(NOT_FOUND_STATUS, Some(tool));
            return Ok(ProcessResult { status: NOT_FOUND_STATUS, lines: Vec::new() });
        }

        // `exec 2>&1` points the shell's stderr at the stdout pipe before the
        // command runs, so both streams share one pipe and keep their order.
        let script = format!("exec 2>&1\n{}", command);
        let mut child = Command::new(SHELL)
            .arg("-c")
            .arg(&script)
            .current_dir(&self.config.cwd)
            .env_clear()
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn {}: {}", SHELL, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Failed to get stdout from {}", SHELL))?;

        let mut reader = BufReader::new(stdout);
        let mut lines = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf).await?;
            if n == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf).trim_end_matches(['\n', '\r']).to_string();
            if self.echo {
                println!("{}", line);
            }
            lines.push(line);
        }

        let exit = child.wait().await?;
        let status = exit_code(exit);
        debug!("Command exited with status {} after {} lines", status, lines.len());

        if status != 0 {
            let program = command.split_whitespace().next();
            report_failure(status, program);
        }

        Ok(ProcessResult { status, lines })
    }
}


/// Records commands instead of running them. Every command reports success.
#[derive(Debug, Clone, Default)]
pub struct DryRunner {
    commands: Vec<String>,
}

impl DryRunner {
    pub fn new() -> Self {
        DryRunner { commands: Vec::new() }
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }
}

impl CommandRunner for DryRunner {
    async fn run(&mut self, command: &str) -> Result<ProcessResult> {
        info!("Dry run: {}", command);
        self.commands.push(command.to_string());
        Ok(ProcessResult::default())
    }
}


fn report_failure(status: i32, program: Option<&str>) {
    error!("Command failed with return code {}", status);
    if status == NOT_FOUND_STATUS {
        error!("This error typically indicates missing libraries or executables.");
        if let Some(hint) = program.and_then(|p| MODULE_HINTS.get(p)) {
            error!("Try loading required modules with '{}'", hint);
        }
    }
}


#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_in(dir: &std::path::Path) -> RunConfig {
        let env: HashMap<String, String> = std::env::vars().collect();
        RunConfig::new(dir.to_path_buf(), env, false)
    }

    #[tokio::test]
    async fn test_status_fidelity() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut runner = ShellRunner::quiet(config_in(dir.path()));
        for code in [0, 1, 3, 42] {
            let res = runner.run(&format!("exit {}", code)).await?;
            assert_eq!(res.status, code);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_stdout_stderr_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut runner = ShellRunner::quiet(config_in(dir.path()));
        let res = runner
            .run("echo one; echo two >&2; echo three; echo four >&2")
            .await?;
        assert!(res.success());
        assert_eq!(res.lines, vec!["one", "two", "three", "four"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_runs_in_config_cwd() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut runner = ShellRunner::quiet(config_in(dir.path()));
        runner.run("echo hi > marker.txt").await?;
        assert!(dir.path().join("marker.txt").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_env_from_config() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = config_in(dir.path());
        config.env.insert("NANOPORE_TEST_VAR".into(), "from-config".into());
        let mut runner = ShellRunner::quiet(config);
        let res = runner.run("echo $NANOPORE_TEST_VAR").await?;
        assert_eq!(res.lines, vec!["from-config"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_known_tool_missing_is_not_spawned() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let empty_bin = tempfile::tempdir()?;
        let mut config = config_in(dir.path());
        config.env.insert("PATH".into(), empty_bin.path().to_string_lossy().into_owned());
        let mut runner = ShellRunner::quiet(config);
        let res = runner.run("samtools view -b in.bam > out.bam").await?;
        assert_eq!(res.status, NOT_FOUND_STATUS);
        assert!(res.lines.is_empty());
        assert!(!dir.path().join("out.bam").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_known_tool_on_relative_path_entry() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let tool = dir.path().join("samtools");
        std::fs::write(&tool, "#!/bin/sh\necho ran\n")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755))?;
        }

        let mut config = config_in(dir.path());
        config.env.insert("PATH".into(), ".:/usr/bin:/bin".into());
        let mut runner = ShellRunner::quiet(config);
        let res = runner.run("samtools --version").await?;
        assert_eq!(res.status, 0);
        assert_eq!(res.lines, vec!["ran"]);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_exit_status() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut runner = ShellRunner::quiet(config_in(dir.path()));
        let res = runner.run("kill -9 $$").await?;
        assert_eq!(res.status, 128 + 9);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_command_reports_not_found() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut runner = ShellRunner::quiet(config_in(dir.path()));
        let res = runner.run("definitely_not_a_real_tool_4821 --help").await?;
        assert_eq!(res.status, NOT_FOUND_STATUS);
        Ok(())
    }

    #[tokio::test]
    async fn test_dry_runner_records() -> Result<()> {
        let mut runner = DryRunner::new();
        runner.run("dorado basecaller a").await?;
        runner.run("dorado demux b").await?;
        assert_eq!(runner.commands(), ["dorado basecaller a", "dorado demux b"]);
        Ok(())
    }
}
