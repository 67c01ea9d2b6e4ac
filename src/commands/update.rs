use anyhow::Result;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::config::{AddonRecord, Config};
use crate::error::Error;
use crate::git::GitClient;
use crate::install::install_addon;
use crate::status::{get_addon_states, AddonStatus};

/// Handle the update command
///
/// Named addons are reinstalled unconditionally. Without names, every outdated
/// addon is reinstalled; addons whose remote failed are reported and skipped.
pub fn handle<W: Write>(
    config: &mut Config,
    git: Arc<dyn GitClient>,
    addons_dir: &Path,
    names: &[String],
    output: &mut W,
) -> Result<()> {
    let addons: Vec<AddonRecord> = if names.is_empty() {
        let mut outdated = Vec::new();
        for state in get_addon_states(config, addons_dir, Arc::clone(&git))? {
            if let Some(error) = &state.error {
                writeln!(output, "Error: {}: {}", state.name, error)?;
            } else if state.status == AddonStatus::Outdated {
                if let Some(addon) = config.get(&state.name) {
                    outdated.push(addon.clone());
                }
            }
        }
        outdated
    } else {
        names
            .iter()
            .map(|name| {
                config
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::UnknownAddon(name.clone()))
            })
            .collect::<Result<_, _>>()?
    };

    // addons sharing a repository are installed by a single clone
    let mut sources: Vec<(String, String)> = Vec::new();
    for addon in addons {
        let source = (addon.url, addon.branch);
        if !sources.contains(&source) {
            sources.push(source);
        }
    }

    if sources.is_empty() {
        writeln!(output, "No addons to update found")?;
        return Ok(());
    }

    for (url, branch) in &sources {
        install_addon(config, git.as_ref(), url, Some(branch), addons_dir)?;
    }

    Ok(())
}
