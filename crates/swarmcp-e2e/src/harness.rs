use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

static BUILD_SWARMCP: OnceLock<Result<(), String>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub command_line: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    #[must_use]
    pub fn transcript(&self) -> String {
        format!(
            "$ {}\n[exit: {}]\n[stdout]\n{}[stderr]\n{}",
            self.command_line, self.exit_code, self.stdout, self.stderr
        )
    }
}

/// Run `swarmcp -p <project> <args>` as an external process.
///
/// `NO_PAGER=1` is always set; project, secret-store and proxy variables are
/// cleared so the host environment cannot leak in. `env_overrides` apply last.
///
/// # Errors
///
/// Returns an error if building or running the `swarmcp` binary fails.
pub fn run_swarmcp(
    project: &Path,
    args: &[&str],
    env_overrides: &[(&str, &str)],
) -> Result<RunResult, String> {
    ensure_swarmcp_built()?;
    let bin = swarmcp_bin()?;

    let mut command = Command::new(bin);
    command
        .env("NO_PAGER", "1")
        .env_remove("SWARMCP_PROJECT")
        .env_remove("VAULT_ADDR")
        .env_remove("BAO_ADDR")
        .env_remove("RUST_LOG")
        .env_remove("VAULT_TOKEN")
        .env_remove("BAO_TOKEN");
    // Loopback secret-store stubs must be reached directly.
    for proxy in ["ALL_PROXY", "HTTP_PROXY", "HTTPS_PROXY"] {
        command
            .env_remove(proxy)
            .env_remove(proxy.to_ascii_lowercase());
    }
    command
        .arg("-p")
        .arg(project)
        .args(args);
    for (name, value) in env_overrides {
        command.env(name, value);
    }

    let mut command_parts = vec![
        "swarmcp".to_string(),
        "-p".to_string(),
        project.display().to_string(),
    ];
    command_parts.extend(args.iter().map(|arg| (*arg).to_string()));

    let output = command
        .output()
        .map_err(|error| format!("failed to run swarmcp: {error}"))?;

    Ok(RunResult {
        command_line: command_parts.join(" "),
        exit_code: output.status.code().unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Write a text file, creating parent directories if needed.
///
/// # Errors
///
/// Returns an error if directories or file contents cannot be written.
pub fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

fn ensure_swarmcp_built() -> Result<(), String> {
    BUILD_SWARMCP
        .get_or_init(|| {
            let status = Command::new("cargo")
                .args(["build", "-q", "-p", "swarmcp"])
                .status()
                .map_err(|error| format!("failed to build swarmcp binary: {error}"))?;
            if status.success() {
                Ok(())
            } else {
                Err(format!(
                    "failed to build swarmcp binary: cargo exited with status {status}"
                ))
            }
        })
        .clone()
}

fn swarmcp_bin() -> Result<PathBuf, String> {
    let mut path = std::env::current_exe()
        .map_err(|error| format!("failed to determine current executable: {error}"))?;
    if !path.pop() {
        return Err("failed to resolve test executable directory".to_string());
    }
    if path.ends_with("deps") {
        let _ = path.pop();
    }
    Ok(path.join(format!("swarmcp{}", std::env::consts::EXE_SUFFIX)))
}
