//! Versioned content signatures of installed addon directories
//!
//! A signature is stored as `{hex_digest}|{version}`. Signatures written before
//! versioning existed are a bare hex digest and are read as version 1.
//!
//! - Version 1: SHA-1 over the sorted list of per-file content digests.
//!   File names and directory layout do not contribute.
//! - Version 2: SHA-1 over a top-down walk feeding, per directory, the sorted
//!   subdirectory names, then each file's root-relative path and content digest.

use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use walkdir::WalkDir;

use crate::error::{Error, IoResultExt, Result};

/// Version used for newly calculated signatures
pub const LATEST_VERSION: u32 = 2;

const CHUNK_SIZE: usize = 64 * 1024;

/// Parsed representation of a stored signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub digest: String,
    pub version: u32,
}

impl Signature {
    /// Parse a stored signature string
    pub fn parse(signature: &str) -> Result<Self> {
        let parts: Vec<&str> = signature.split('|').collect();

        match parts.as_slice() {
            [digest] => Ok(Signature {
                digest: digest.to_string(),
                version: 1,
            }),
            [digest, version] => {
                let version = version
                    .parse::<u32>()
                    .map_err(|_| Error::MalformedSignature(signature.to_string()))?;
                Ok(Signature {
                    digest: digest.to_string(),
                    version,
                })
            }
            _ => Err(Error::MalformedSignature(signature.to_string())),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.digest, self.version)
    }
}

/// Calculate the signature of a directory using the latest version
pub fn calculate(dir: &Path) -> Result<String> {
    let signature = Signature {
        digest: checksum(dir, LATEST_VERSION)?,
        version: LATEST_VERSION,
    };
    Ok(signature.to_string())
}

/// Check a directory against a stored signature, using the version the
/// signature was created with
pub fn validate(dir: &Path, signature: &str) -> Result<bool> {
    let expected = Signature::parse(signature)?;
    let actual = checksum(dir, expected.version)?;
    Ok(actual == expected.digest)
}

fn checksum(dir: &Path, version: u32) -> Result<String> {
    if !dir.is_dir() {
        return Err(Error::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut hasher = Sha1::new();
    match version {
        1 => {
            let mut digests = file_digests_v1(dir)?;
            digests.sort();
            for digest in digests {
                hasher.update(digest.as_bytes());
            }
        }
        2 => feed_dir_v2(&mut hasher, dir, dir)?,
        other => return Err(Error::InvalidSignatureVersion(other)),
    }

    Ok(hex::encode(hasher.finalize()))
}

fn file_digests_v1(dir: &Path) -> Result<Vec<String>> {
    let mut digests = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            Error::Io {
                path,
                source: e.into(),
            }
        })?;
        if entry.depth() > 0 && !entry.path().is_dir() {
            digests.push(file_digest(entry.path())?);
        }
    }
    Ok(digests)
}

fn feed_dir_v2(hasher: &mut Sha1, root: &Path, dir: &Path) -> Result<()> {
    let (subdirs, files) = list_dir_sorted(dir)?;

    for (name, _) in &subdirs {
        hasher.update(name.as_bytes());
    }

    for (_, path) in &files {
        hasher.update(relative_path(root, path).as_bytes());
        hasher.update(file_digest(path)?.as_bytes());
    }

    for (_, path) in &subdirs {
        // symlinked directories are listed by name but not descended into
        let is_link = fs::symlink_metadata(path)
            .with_path(path)?
            .file_type()
            .is_symlink();
        if !is_link {
            feed_dir_v2(hasher, root, path)?;
        }
    }

    Ok(())
}

type NamedPaths = Vec<(String, PathBuf)>;

/// List a directory's entries as (subdirectories, files), each sorted by name
fn list_dir_sorted(dir: &Path) -> Result<(NamedPaths, NamedPaths)> {
    let mut subdirs = Vec::new();
    let mut files = Vec::new();

    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            subdirs.push((name, path));
        } else {
            files.push((name, path));
        }
    }

    subdirs.sort();
    files.sort();
    Ok((subdirs, files))
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Streaming SHA-1 of a file's bytes, as lowercase hex
fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_path(path)?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let read = file.read(&mut buffer).with_path(path)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
