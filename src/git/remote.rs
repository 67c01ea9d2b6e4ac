use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinSet;

use super::client::{GitClient, RemoteRef};

/// A branch of a remote whose head should be resolved
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RemoteStateRequest {
    pub url: String,
    pub branch: String,
}

impl RemoteStateRequest {
    pub fn new(url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
        }
    }
}

/// Resolved head of a remote branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteState {
    pub url: String,
    pub branch: String,
    /// None when the branch does not exist on the remote
    pub head_commit: Option<String>,
    /// set when the remote could not be queried at all
    pub error: Option<String>,
}

/// Resolve the head commit of every requested (url, branch) pair.
///
/// Each distinct url is queried once, all urls concurrently. Returns one state
/// per distinct request once every query has finished; order is unspecified.
pub fn fetch_states(
    git: Arc<dyn GitClient>,
    requests: &[RemoteStateRequest],
) -> Result<Vec<RemoteState>> {
    let mut url_to_branches: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for request in requests {
        let branches = url_to_branches.entry(request.url.clone()).or_default();
        if !branches.contains(&request.branch) {
            branches.push(request.branch.clone());
        }
    }

    if url_to_branches.is_empty() {
        return Ok(Vec::new());
    }

    tracing::debug!(
        "Resolving {} branch(es) across {} remote(s)",
        requests.len(),
        url_to_branches.len()
    );

    let pb = ProgressBar::new(url_to_branches.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .context("Failed to create progress template")?
            .progress_chars("█▓░"),
    );
    pb.set_message("Checking remotes");

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    let states = runtime.block_on(async {
        let mut tasks = JoinSet::new();
        for (url, branches) in url_to_branches {
            let git = Arc::clone(&git);
            tasks.spawn_blocking(move || {
                let result = git.list_remote_refs(&url);
                (url, branches, result)
            });
        }

        let mut states = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (url, branches, result) = joined.context("Remote query task failed")?;
            pb.inc(1);

            match result {
                Ok(refs) => {
                    for branch in branches {
                        let head_commit = find_branch_head(&refs, &branch);
                        if head_commit.is_none() {
                            tracing::debug!("Branch {} not found on {}", branch, url);
                        }
                        states.push(RemoteState {
                            url: url.clone(),
                            branch,
                            head_commit,
                            error: None,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to query {}: {}", url, e);
                    let message = e.to_string();
                    for branch in branches {
                        states.push(RemoteState {
                            url: url.clone(),
                            branch,
                            head_commit: None,
                            error: Some(message.clone()),
                        });
                    }
                }
            }
        }

        Ok::<_, anyhow::Error>(states)
    })?;

    pb.finish_and_clear();
    Ok(states)
}

/// Head of `branch`, either from its `refs/heads/` ref or from a `HEAD` that
/// points at it
fn find_branch_head(refs: &[RemoteRef], branch: &str) -> Option<String> {
    let branch_ref = format!("refs/heads/{}", branch);
    refs.iter()
        .find(|r| {
            r.name.ends_with(&branch_ref)
                || (r.name == "HEAD" && r.symref_target.as_deref() == Some(branch_ref.as_str()))
        })
        .map(|r| r.oid.clone())
}
