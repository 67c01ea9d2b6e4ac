//! Discovery of addons inside a cloned repository by their `.toc` files

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use walkdir::WalkDir;

use crate::error::{Error, IoResultExt, Result};

/// Highest `## Interface:` version accepted for installation (client 1.12)
pub const MAX_GAME_VERSION: u32 = 11200;

/// An addon root found in a source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    /// addon name, taken from the toc file stem
    pub name: String,
    /// directory holding the toc file
    pub path: PathBuf,
    /// declared `## Interface:` version
    pub declared_version: u32,
}

#[derive(Debug)]
struct TocFile {
    path: PathBuf,
    game_version: u32,
}

fn interface_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"## Interface:\s+(\d+)").expect("valid interface regex"))
}

/// Find addon roots under `root` compatible with `max_game_version`.
///
/// Nested matches are collapsed to the shallowest one: a toc file is skipped when
/// its directory, or any directory above it, already holds an accepted toc.
pub fn find_addons(root: &Path, max_game_version: u32) -> Result<Vec<SourceItem>> {
    let mut tocs = find_toc_files(root, max_game_version)?;
    tocs.sort_by(|a, b| {
        let depth_a = a.path.components().count();
        let depth_b = b.path.components().count();
        depth_a.cmp(&depth_b).then_with(|| a.path.cmp(&b.path))
    });

    let mut claimed: Vec<PathBuf> = Vec::new();
    let mut items = Vec::new();

    for toc in tocs {
        let Some(addon_dir) = toc.path.parent() else {
            continue;
        };
        if addon_dir.ancestors().any(|dir| claimed.iter().any(|c| c == dir)) {
            tracing::debug!("Skipping nested toc {:?}", toc.path);
            continue;
        }

        let name = toc
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !is_plain_name(&name) {
            tracing::warn!("Ignoring {:?}: {:?} is not a valid addon name", toc.path, name);
            continue;
        }

        claimed.push(addon_dir.to_path_buf());
        items.push(SourceItem {
            name,
            path: addon_dir.to_path_buf(),
            declared_version: toc.game_version,
        });
    }

    Ok(items)
}

/// True when `name` is a single normal path component, usable as a directory
/// name directly under the addons directory
pub fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn find_toc_files(root: &Path, max_game_version: u32) -> Result<Vec<TocFile>> {
    let mut tocs = Vec::new();

    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            Error::Io {
                path,
                source: e.into(),
            }
        })?;

        if !entry.file_type().is_file() || !is_toc(entry.path()) {
            continue;
        }

        let content = read_text(entry.path())?;
        let Some(game_version) = declared_version(&content) else {
            tracing::debug!("No interface version in {:?}", entry.path());
            continue;
        };

        if game_version <= max_game_version {
            tocs.push(TocFile {
                path: entry.path().to_path_buf(),
                game_version,
            });
        } else {
            tracing::debug!(
                "Skipping {:?}: interface {} is newer than {}",
                entry.path(),
                game_version,
                max_game_version
            );
        }
    }

    Ok(tocs)
}

fn is_toc(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("toc"))
        .unwrap_or(false)
}

/// Value of the first `## Interface:` directive. A value that does not fit
/// into u32 is treated as newer than anything supported.
fn declared_version(content: &str) -> Option<u32> {
    let captures = interface_regex().captures(content)?;
    Some(captures[1].parse::<u32>().unwrap_or(u32::MAX))
}

/// Read a text file as UTF-8, falling back to the Windows-1252 code page
fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_path(path)?;

    if let Some(text) = encoding_rs::UTF_8.decode_without_bom_handling_and_without_replacement(&bytes)
    {
        return Ok(text.into_owned());
    }

    // encoding_rs maps every byte; the five the code page leaves undefined
    // come out as C1 controls and mean the guess was wrong
    let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(&bytes);
    if text.chars().any(is_undefined_in_windows_1252) {
        return Err(Error::Encoding(path.to_path_buf()));
    }
    Ok(text.into_owned())
}

fn is_undefined_in_windows_1252(c: char) -> bool {
    matches!(c, '\u{81}' | '\u{8d}' | '\u{8f}' | '\u{90}' | '\u{9d}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_toc(dir: &Path, name: &str, interface: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(
            dir.join(format!("{}.toc", name)),
            format!("## Interface: {}\n## Title: {}\n{}.lua\n", interface, name, name),
        )
        .unwrap();
    }

    #[test]
    fn test_single_addon_at_root() {
        let repo = TempDir::new().unwrap();
        write_toc(repo.path(), "Foo", "11200");

        let addons = find_addons(repo.path(), MAX_GAME_VERSION).unwrap();

        assert_eq!(
            addons,
            vec![SourceItem {
                name: "Foo".to_string(),
                path: repo.path().to_path_buf(),
                declared_version: 11200,
            }]
        );
    }

    #[test]
    fn test_nested_toc_suppressed() {
        let repo = TempDir::new().unwrap();
        write_toc(&repo.path().join("Parent"), "Parent", "11200");
        write_toc(&repo.path().join("Parent/Child"), "Child", "11200");

        let addons = find_addons(repo.path(), MAX_GAME_VERSION).unwrap();

        assert_eq!(addons.len(), 1);
        assert_eq!(addons[0].name, "Parent");
        assert_eq!(addons[0].path, repo.path().join("Parent"));
    }

    #[test]
    fn test_sibling_addons() {
        let repo = TempDir::new().unwrap();
        write_toc(&repo.path().join("Alpha"), "Alpha", "11200");
        write_toc(&repo.path().join("Beta"), "Beta", "11100");

        let addons = find_addons(repo.path(), MAX_GAME_VERSION).unwrap();
        let names: Vec<_> = addons.iter().map(|a| a.name.as_str()).collect();

        assert_eq!(names, vec!["Alpha", "Beta"]);
        assert_eq!(addons[1].declared_version, 11100);
    }

    #[test]
    fn test_newer_interface_excluded() {
        let repo = TempDir::new().unwrap();
        write_toc(&repo.path().join("Classic"), "Classic", "11302");
        write_toc(&repo.path().join("Vanilla"), "Vanilla", "11200");

        let addons = find_addons(repo.path(), MAX_GAME_VERSION).unwrap();

        assert_eq!(addons.len(), 1);
        assert_eq!(addons[0].name, "Vanilla");
    }

    #[test]
    fn test_newer_parent_does_not_claim_subtree() {
        let repo = TempDir::new().unwrap();
        write_toc(repo.path(), "Retail", "90000");
        write_toc(&repo.path().join("Vanilla"), "Vanilla", "11200");

        let addons = find_addons(repo.path(), MAX_GAME_VERSION).unwrap();

        assert_eq!(addons.len(), 1);
        assert_eq!(addons[0].name, "Vanilla");
    }

    #[test]
    fn test_toc_without_directive_ignored() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("Broken.toc"), "## Title: Broken\n").unwrap();

        assert!(find_addons(repo.path(), MAX_GAME_VERSION).unwrap().is_empty());
    }

    #[test]
    fn test_uppercase_extension() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("Loud.TOC"), "## Interface: 11200\n").unwrap();

        let addons = find_addons(repo.path(), MAX_GAME_VERSION).unwrap();
        assert_eq!(addons[0].name, "Loud");
    }

    #[test]
    fn test_git_directory_skipped() {
        let repo = TempDir::new().unwrap();
        write_toc(&repo.path().join(".git/stale"), "Stale", "11200");

        assert!(find_addons(repo.path(), MAX_GAME_VERSION).unwrap().is_empty());
    }

    #[test]
    fn test_legacy_encoding_fallback() {
        let repo = TempDir::new().unwrap();
        // "## Title: Caf\xe9" is not valid UTF-8
        let mut bytes = b"## Interface: 11200\n## Title: Caf".to_vec();
        bytes.push(0xe9);
        bytes.push(b'\n');
        fs::write(repo.path().join("Cafe.toc"), bytes).unwrap();

        let text = read_text(&repo.path().join("Cafe.toc")).unwrap();
        assert!(text.contains("Café"));

        let addons = find_addons(repo.path(), MAX_GAME_VERSION).unwrap();
        assert_eq!(addons[0].name, "Cafe");
    }

    #[test]
    fn test_undecodable_toc() {
        let repo = TempDir::new().unwrap();
        // 0x81 is neither valid UTF-8 nor defined in Windows-1252
        let mut bytes = b"## Interface: 11200\n## Title: ".to_vec();
        bytes.push(0x81);
        fs::write(repo.path().join("Broken.toc"), bytes).unwrap();

        let error = find_addons(repo.path(), MAX_GAME_VERSION).unwrap_err();

        assert!(matches!(&error, Error::Encoding(path) if path.ends_with("Broken.toc")));
        assert!(error.is_user_facing());
    }

    #[test]
    fn test_dot_named_toc_ignored() {
        let repo = TempDir::new().unwrap();
        let sub = repo.path().join("Sub");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("..toc"), "## Interface: 11200\n").unwrap();
        write_toc(&repo.path().join("Real"), "Real", "11200");

        let addons = find_addons(repo.path(), MAX_GAME_VERSION).unwrap();

        let names: Vec<_> = addons.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Real"]);
    }

    #[test]
    fn test_plain_names() {
        assert!(is_plain_name("Foo"));
        assert!(is_plain_name("Foo.Bar"));
        assert!(!is_plain_name("."));
        assert!(!is_plain_name(".."));
        assert!(!is_plain_name(""));
        assert!(!is_plain_name("a/b"));
        assert!(!is_plain_name("/abs"));
    }

    #[test]
    fn test_declared_version_overflow() {
        assert_eq!(declared_version("## Interface: 99999999999999"), Some(u32::MAX));
        assert_eq!(declared_version("## Interface:  11200"), Some(11200));
        assert_eq!(declared_version("## Title: x"), None);
    }
}
