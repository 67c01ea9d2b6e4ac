use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::error::Error;
use crate::git::GitClient;
use crate::install::install_addon;

/// Hosts whose web urls are rewritten to clone urls
const KNOWN_HOSTS: [&str; 2] = ["github.com", "gitlab.com"];

/// Handle the install command
pub fn handle(
    config: &mut Config,
    git: &dyn GitClient,
    addons_dir: &Path,
    url: &str,
    branch: Option<&str>,
) -> Result<()> {
    let (repo_url, branch_from_url) = normalize_url(url)?;

    let branch = match (branch, branch_from_url.as_deref()) {
        (Some(requested), Some(found)) if requested != found => {
            return Err(Error::BranchMismatch {
                requested: requested.to_string(),
                found: found.to_string(),
            }
            .into());
        }
        (Some(requested), _) => Some(requested.to_string()),
        (None, found) => found.map(str::to_string),
    };

    install_addon(config, git, &repo_url, branch.as_deref(), addons_dir)?;
    Ok(())
}

/// Turn a github/gitlab web url into a clone url.
///
/// `https://github.com/author/repo/tree/dev` becomes
/// `https://github.com/author/repo.git` with branch `dev`. Urls on other hosts
/// are returned unchanged.
pub fn normalize_url(url: &str) -> Result<(String, Option<String>), Error> {
    let Some((scheme, rest)) = url.split_once("://") else {
        return Ok((url.to_string(), None));
    };

    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host);

    if !KNOWN_HOSTS.contains(&host.to_ascii_lowercase().as_str()) {
        return Ok((url.to_string(), None));
    }

    // query and fragment carry nothing for a clone url
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut segments = path.trim_start_matches('/').split('/');

    let (Some(author), Some(repository)) = (segments.next(), segments.next()) else {
        return Err(Error::InvalidUrl(url.to_string()));
    };
    if author.is_empty() || repository.is_empty() {
        return Err(Error::InvalidUrl(url.to_string()));
    }

    let mut remaining: Vec<&str> = segments.collect();
    if remaining.last() == Some(&"") {
        remaining.pop();
    }
    let tail = match remaining.as_slice() {
        ["-", "tree", tail @ ..] | ["tree", tail @ ..] => tail,
        other => other,
    };
    let branch = (!tail.is_empty()).then(|| tail.join("/"));

    let repository = repository.trim_end_matches(".git");
    let repo_url = format!("{}://{}/{}/{}.git", scheme, authority, author, repository);

    Ok((repo_url, branch))
}
