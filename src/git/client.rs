use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Error, Result};

/// Result of cloning a repository
#[derive(Debug, Clone)]
pub struct RepositoryInfo {
    /// checkout directory
    pub workdir: PathBuf,
    /// checked out branch (the remote default when none was requested)
    pub branch: String,
    /// SHA-1 of the checked out commit (40 hex chars)
    pub head_commit: String,
    /// commit time of the checked out commit
    pub head_commit_time: DateTime<Utc>,
}

/// A single advertised ref of a remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub name: String,
    pub oid: String,
    /// target of a symbolic ref, e.g. `refs/heads/main` for `HEAD`
    pub symref_target: Option<String>,
}

/// Git transport used by snapjaw
pub trait GitClient: Send + Sync {
    /// Shallow clone `url` into `dest`, checking out `branch` or the remote default
    fn clone_repo(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<RepositoryInfo>;

    /// List the refs advertised by `url` without fetching objects
    fn list_remote_refs(&self, url: &str) -> Result<Vec<RemoteRef>>;
}

/// GitClient backed by the `git` executable
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: PathBuf,
}

impl SystemGit {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        // fail instead of waiting for credentials on stdin
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    fn run(&self, mut cmd: Command, what: &str) -> Result<String> {
        tracing::debug!("Running {:?}", cmd);

        let output = cmd
            .output()
            .map_err(|e| Error::Git(format!("failed to execute git {}: {}", what, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Git(format!("git {} failed: {}", what, stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new()
    }
}

impl GitClient for SystemGit {
    fn clone_repo(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<RepositoryInfo> {
        let mut cmd = self.command();
        cmd.arg("clone").arg("--depth").arg("1").arg("--quiet");
        if let Some(branch) = branch {
            cmd.arg("--branch").arg(branch);
        }
        cmd.arg("--").arg(url).arg(dest);
        self.run(cmd, "clone")?;

        let mut cmd = self.command();
        cmd.arg("-C").arg(dest).arg("rev-parse").arg("--abbrev-ref").arg("HEAD");
        let branch = self.run(cmd, "rev-parse")?.trim().to_string();

        let mut cmd = self.command();
        cmd.arg("-C")
            .arg(dest)
            .arg("log")
            .arg("-1")
            .arg("--format=%H %ct");
        let log = self.run(cmd, "log")?;
        let (head_commit, head_commit_time) = parse_head_log(&log)?;

        Ok(RepositoryInfo {
            workdir: dest.to_path_buf(),
            branch,
            head_commit,
            head_commit_time,
        })
    }

    fn list_remote_refs(&self, url: &str) -> Result<Vec<RemoteRef>> {
        let mut cmd = self.command();
        cmd.arg("ls-remote").arg("--symref").arg("--").arg(url);
        let output = self.run(cmd, "ls-remote")?;
        Ok(parse_ls_remote(&output))
    }
}

/// Parse `git log -1 --format='%H %ct'` output
fn parse_head_log(output: &str) -> Result<(String, DateTime<Utc>)> {
    let malformed = || Error::Git(format!("unexpected git log output: {}", output.trim()));

    let mut parts = output.split_whitespace();
    let hash = parts.next().ok_or_else(malformed)?;
    let seconds = parts
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(malformed)?;
    let time = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(malformed)?;

    Ok((hash.to_string(), time))
}

/// Parse `git ls-remote --symref` output.
///
/// Regular lines are `<oid>\t<refname>`; symbolic refs are announced by an
/// extra `ref: <target>\t<refname>` line before their resolved line.
fn parse_ls_remote(output: &str) -> Vec<RemoteRef> {
    let mut refs: Vec<RemoteRef> = Vec::new();
    let mut symrefs: Vec<(String, String)> = Vec::new();

    for line in output.lines() {
        let Some((left, name)) = line.split_once('\t') else {
            continue;
        };
        let name = name.trim().to_string();

        if let Some(target) = left.strip_prefix("ref: ") {
            symrefs.push((name, target.trim().to_string()));
            continue;
        }

        let symref_target = symrefs
            .iter()
            .find(|(symref, _)| *symref == name)
            .map(|(_, target)| target.clone());

        refs.push(RemoteRef {
            name,
            oid: left.trim().to_string(),
            symref_target,
        });
    }

    refs
}
