//! Installing addons from a git source into the addons directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use glob::{MatchOptions, Pattern};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::config::{AddonRecord, Config};
use crate::error::{self, Error, IoResultExt};
use crate::git::{GitClient, RepositoryInfo};
use crate::signature;
use crate::toc::{self, MAX_GAME_VERSION};

/// Root level files copied next to addons living in a repository subdirectory
const EXTRA_FILE_PATTERNS: [&str; 3] = ["*readme*", "*.txt", "*.html"];

/// Clone `repo_url` and install every addon found in it.
///
/// Each addon directory is replaced wholesale and the config is saved after every
/// addon, so a failure part way keeps the addons installed before it.
/// Returns the names of the installed addons.
pub fn install_addon(
    config: &mut Config,
    git: &dyn GitClient,
    repo_url: &str,
    branch: Option<&str>,
    addons_dir: &Path,
) -> Result<Vec<String>> {
    tracing::info!("Cloning {}", repo_url);

    let repo_dir = TempDir::new().context("Failed to create temporary clone directory")?;
    let repo = git.clone_repo(repo_url, branch, repo_dir.path())?;

    let addons = toc::find_addons(&repo.workdir, MAX_GAME_VERSION)?;
    if addons.is_empty() {
        return Err(Error::NoAddonsFound.into());
    }

    let mut installed = Vec::with_capacity(addons.len());
    for addon in addons {
        tracing::info!(
            "Installing addon \"{}\", branch \"{}\"",
            addon.name,
            repo.branch
        );
        tracing::debug!(
            "Addon {} declares interface {} at {:?}",
            addon.name,
            addon.declared_version,
            addon.path
        );

        let dst_addon_dir = addon_install_dir(addons_dir, &addon.name)?;
        remove_addon_dir(&dst_addon_dir)?;
        copy_tree(&addon.path, &dst_addon_dir)?;

        if repo.workdir != addon.path {
            copy_extra_files(&repo.workdir, &dst_addon_dir)?;
        }

        let checksum = signature::calculate(&dst_addon_dir)?;
        config.insert(installed_record(&addon.name, repo_url, &repo, checksum));
        config.save()?;

        installed.push(addon.name);
    }

    tracing::info!("Done");
    Ok(installed)
}

/// Directory an addon is installed to; the name must not leave `addons_dir`
fn addon_install_dir(addons_dir: &Path, name: &str) -> error::Result<PathBuf> {
    let dir = addons_dir.join(name);
    if !toc::is_plain_name(name) || dir.parent() != Some(addons_dir) {
        return Err(Error::InvalidAddonName(name.to_string()));
    }
    Ok(dir)
}

fn installed_record(
    name: &str,
    repo_url: &str,
    repo: &RepositoryInfo,
    checksum: String,
) -> AddonRecord {
    AddonRecord {
        name: name.to_string(),
        url: repo_url.to_string(),
        branch: repo.branch.clone(),
        commit: repo.head_commit.clone(),
        released_at: repo.head_commit_time,
        installed_at: Utc::now(),
        checksum: Some(checksum),
    }
}

/// Remove an installed addon directory. Symlinks are unlinked without touching
/// their target; a path that does not exist is not an error.
pub fn remove_addon_dir(path: &Path) -> error::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_path(path),
    };

    if metadata.file_type().is_symlink() {
        tracing::debug!("Unlinking {:?}", path);
        // directory symlinks on windows need remove_dir
        fs::remove_file(path)
            .or_else(|_| fs::remove_dir(path))
            .with_path(path)
    } else if metadata.is_dir() {
        tracing::debug!("Removing {:?}", path);
        fs::remove_dir_all(path).with_path(path)
    } else {
        fs::remove_file(path).with_path(path)
    }
}

fn is_git_metadata(name: &str) -> bool {
    name.starts_with(".git")
}

/// Copy a directory tree, skipping `.git*` entries at any level
fn copy_tree(src: &Path, dst: &Path) -> error::Result<()> {
    let walker = WalkDir::new(src)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !is_git_metadata(&entry.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
            Error::Io {
                path,
                source: e.into(),
            }
        })?;

        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).with_path(&target)?;
        } else {
            fs::copy(entry.path(), &target).with_path(&target)?;
        }
    }

    Ok(())
}

/// Copy readme-like files from the repository root without overwriting addon files
fn copy_extra_files(repo_root: &Path, dst: &Path) -> error::Result<()> {
    let patterns: Vec<Pattern> = EXTRA_FILE_PATTERNS
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect();
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    for entry in fs::read_dir(repo_root).with_path(repo_root)? {
        let entry = entry.with_path(repo_root)?;
        let name = entry.file_name().to_string_lossy().into_owned();

        if !entry.path().is_file() || !patterns.iter().any(|p| p.matches_with(&name, options)) {
            continue;
        }

        let target = dst.join(&name);
        if target.exists() {
            continue;
        }
        tracing::debug!("Copying {} into {:?}", name, dst);
        fs::copy(entry.path(), &target).with_path(&target)?;
    }

    Ok(())
}
