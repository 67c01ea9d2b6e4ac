//! Reconciliation of recorded addons, the addons directory and remote heads

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::config::{addon_key, AddonRecord, Config};
use crate::git::{fetch_states, GitClient, RemoteState, RemoteStateRequest};
use crate::signature;

/// Directories shipped with the game client are never reported as untracked
const BUILTIN_ADDON_PREFIX: &str = "Blizzard_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddonStatus {
    UpToDate,
    Outdated,
    Modified,
    Untracked,
    Missing,
    Unknown,
    Error,
}

impl AddonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddonStatus::UpToDate => "up-to-date",
            AddonStatus::Outdated => "outdated",
            AddonStatus::Modified => "modified",
            AddonStatus::Untracked => "untracked",
            AddonStatus::Missing => "missing",
            AddonStatus::Unknown => "unknown",
            AddonStatus::Error => "error",
        }
    }
}

impl fmt::Display for AddonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status report line for one addon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonState {
    pub name: String,
    pub status: AddonStatus,
    pub error: Option<String>,
    pub released_at: Option<DateTime<Utc>>,
    pub installed_at: Option<DateTime<Utc>>,
}

impl AddonState {
    fn bare(name: &str, status: AddonStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            error: None,
            released_at: None,
            installed_at: None,
        }
    }

    fn recorded(addon: &AddonRecord, status: AddonStatus, error: Option<String>) -> Self {
        Self {
            name: addon.name.clone(),
            status,
            error,
            released_at: Some(addon.released_at),
            installed_at: Some(addon.installed_at),
        }
    }
}

/// Query the remotes of every recorded addon in one batch and reconcile
pub fn get_addon_states(
    config: &Config,
    addons_dir: &Path,
    git: Arc<dyn GitClient>,
) -> Result<Vec<AddonState>> {
    let requests: Vec<RemoteStateRequest> = config
        .records()
        .map(|addon| RemoteStateRequest::new(&addon.url, &addon.branch))
        .collect();

    let remote_states = fetch_states(git, &requests)?;
    reconcile(config, addons_dir, &remote_states)
}

/// Combine config, directory listing and remote heads into one state per addon,
/// sorted case-insensitively by name.
pub fn reconcile(
    config: &Config,
    addons_dir: &Path,
    remote_states: &[RemoteState],
) -> Result<Vec<AddonState>> {
    let mut url_to_branch_to_addons: HashMap<&str, HashMap<&str, Vec<&AddonRecord>>> =
        HashMap::new();
    for addon in config.records() {
        url_to_branch_to_addons
            .entry(addon.url.as_str())
            .or_default()
            .entry(addon.branch.as_str())
            .or_default()
            .push(addon);
    }

    let mut key_to_state: BTreeMap<String, AddonState> = BTreeMap::new();

    for remote in remote_states {
        let addons = url_to_branch_to_addons
            .get(remote.url.as_str())
            .and_then(|branches| branches.get(remote.branch.as_str()));
        let Some(addons) = addons else {
            tracing::debug!("Ignoring unrequested remote state {}#{}", remote.url, remote.branch);
            continue;
        };

        for addon in addons {
            let state = recorded_state(addon, remote, &addons_dir.join(&addon.name));
            key_to_state.insert(addon_key(&addon.name), state);
        }
    }

    let entries = fs::read_dir(addons_dir)
        .with_context(|| format!("Failed to list addons directory {:?}", addons_dir))?;
    for entry in entries {
        let entry =
            entry.with_context(|| format!("Failed to list addons directory {:?}", addons_dir))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let key = addon_key(&name);

        if !entry.path().is_dir()
            || name.starts_with(BUILTIN_ADDON_PREFIX)
            || config.contains(&name)
            || key_to_state.contains_key(&key)
        {
            continue;
        }
        key_to_state.insert(key, AddonState::bare(&name, AddonStatus::Untracked));
    }

    for addon in config.records() {
        let key = addon_key(&addon.name);
        if key_to_state.contains_key(&key) {
            continue;
        }
        let status = if addons_dir.join(&addon.name).is_dir() {
            AddonStatus::Unknown
        } else {
            AddonStatus::Missing
        };
        key_to_state.insert(key, AddonState::bare(&addon.name, status));
    }

    let mut states: Vec<AddonState> = key_to_state.into_values().collect();
    states.sort_by(|a, b| {
        addon_key(&a.name)
            .cmp(&addon_key(&b.name))
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(states)
}

fn recorded_state(addon: &AddonRecord, remote: &RemoteState, addon_dir: &Path) -> AddonState {
    if let Some(error) = &remote.error {
        return AddonState::recorded(addon, AddonStatus::Error, Some(error.clone()));
    }

    let Some(head_commit) = &remote.head_commit else {
        return AddonState::recorded(addon, AddonStatus::Unknown, None);
    };

    if !addon_dir.is_dir() {
        return AddonState::bare(&addon.name, AddonStatus::Missing);
    }

    // local changes take precedence over a pending update
    let unmodified = match &addon.checksum {
        Some(checksum) => match signature::validate(addon_dir, checksum) {
            Ok(valid) => valid,
            Err(e) => {
                return AddonState::recorded(addon, AddonStatus::Error, Some(e.to_string()));
            }
        },
        None => false,
    };

    let status = if !unmodified {
        AddonStatus::Modified
    } else if *head_commit == addon.commit {
        AddonStatus::UpToDate
    } else {
        AddonStatus::Outdated
    };
    AddonState::recorded(addon, status, None)
}
