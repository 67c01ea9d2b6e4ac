use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Helper to run git commands in a directory
fn git_command(dir: &Path, args: &[&str]) -> Output {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("Failed to run git command");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

/// Run snapjaw against an addons directory
fn snapjaw(addons_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_snapjaw"))
        .arg("--addons-dir")
        .arg(addons_dir)
        .args(args)
        .env("RUST_LOG", "info")
        .output()
        .expect("Failed to run snapjaw")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn commit_all(repo_dir: &Path, message: &str) {
    git_command(repo_dir, &["add", "."]);
    git_command(repo_dir, &["commit", "--no-gpg-sign", "-m", message]);
}

/// Create a repository on branch master holding the given files
fn create_addon_repo(dir: &Path, files: &[(&str, &str)]) -> PathBuf {
    let repo_dir = dir.join("addon-repo");
    fs::create_dir(&repo_dir).expect("Failed to create repo dir");

    git_command(&repo_dir, &["init", "--quiet"]);
    git_command(&repo_dir, &["symbolic-ref", "HEAD", "refs/heads/master"]);
    git_command(&repo_dir, &["config", "user.name", "Test User"]);
    git_command(&repo_dir, &["config", "user.email", "test@example.com"]);

    for (path, content) in files {
        let path = repo_dir.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    commit_all(&repo_dir, "Initial commit");

    repo_dir
}

fn create_addons_dir(dir: &Path) -> PathBuf {
    let addons_dir = dir.join("WoW").join("Interface").join("AddOns");
    fs::create_dir_all(&addons_dir).unwrap();
    addons_dir
}

#[test]
fn test_addon_lifecycle() {
    let temp = TempDir::new().unwrap();
    let repo = create_addon_repo(
        temp.path(),
        &[
            ("Foo/Foo.toc", "## Interface: 11200\n## Title: Foo\n"),
            ("Foo/Foo.lua", "print('v1')"),
            ("README.md", "# Foo"),
        ],
    );
    let addons_dir = create_addons_dir(temp.path());
    let repo_url = repo.to_str().unwrap();

    let output = snapjaw(&addons_dir, &["install", repo_url]);
    assert!(output.status.success(), "install failed: {}", stderr(&output));
    assert!(addons_dir.join("Foo/Foo.lua").is_file());
    assert!(addons_dir.join("Foo/README.md").is_file());

    let config = fs::read_to_string(addons_dir.join("snapjaw.json")).unwrap();
    assert!(config.contains("\"addons_by_key\""));
    assert!(config.contains("\"foo\""));
    assert!(config.contains("\"branch\": \"master\""));

    let output = snapjaw(&addons_dir, &["status"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "1 addons are up to date\n");

    // a new upstream commit makes the addon outdated
    fs::write(repo.join("Foo/Foo.lua"), "print('v2')").unwrap();
    commit_all(&repo, "Second commit");

    let output = snapjaw(&addons_dir, &["status"]);
    assert!(stdout(&output).contains("| Foo   | outdated |"));

    let output = snapjaw(&addons_dir, &["update"]);
    assert!(output.status.success(), "update failed: {}", stderr(&output));
    assert_eq!(
        fs::read_to_string(addons_dir.join("Foo/Foo.lua")).unwrap(),
        "print('v2')"
    );

    let output = snapjaw(&addons_dir, &["update"]);
    assert_eq!(stdout(&output), "No addons to update found\n");

    // local edits are reported before anything else
    fs::write(addons_dir.join("Foo/Foo.lua"), "print('local')").unwrap();
    let output = snapjaw(&addons_dir, &["status"]);
    assert!(stdout(&output).contains("| Foo   | modified |"));

    let output = snapjaw(&addons_dir, &["remove", "foo", "Bar"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        "Removing addon Foo\nAddon not found: \"Bar\"\n"
    );
    assert!(!addons_dir.join("Foo").exists());

    let output = snapjaw(&addons_dir, &["status"]);
    assert_eq!(stdout(&output), "No addons found\n");
}

#[test]
fn test_status_reports_untracked_and_missing() {
    let temp = TempDir::new().unwrap();
    let repo = create_addon_repo(temp.path(), &[("Bar.toc", "## Interface: 11200\n")]);
    let addons_dir = create_addons_dir(temp.path());

    let output = snapjaw(&addons_dir, &["install", repo.to_str().unwrap()]);
    assert!(output.status.success(), "install failed: {}", stderr(&output));
    assert!(addons_dir.join("Bar/Bar.toc").is_file());

    fs::remove_dir_all(addons_dir.join("Bar")).unwrap();
    fs::create_dir_all(addons_dir.join("Manual")).unwrap();
    fs::create_dir_all(addons_dir.join("Blizzard_AuctionUI")).unwrap();

    let output = snapjaw(&addons_dir, &["status", "--verbose"]);
    let report = stdout(&output);

    assert!(report.contains("| Bar    | missing   |"));
    assert!(report.contains("| Manual | untracked |"));
    assert!(!report.contains("Blizzard_"));
}

#[test]
fn test_install_without_vanilla_addons() {
    let temp = TempDir::new().unwrap();
    let repo = create_addon_repo(temp.path(), &[("Retail.toc", "## Interface: 90200\n")]);
    let addons_dir = create_addons_dir(temp.path());

    let output = snapjaw(&addons_dir, &["install", repo.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("error: no vanilla addons found"));
    assert!(!addons_dir.join("Retail").exists());
}

#[test]
fn test_install_unreachable_repository() {
    let temp = TempDir::new().unwrap();
    let addons_dir = create_addons_dir(temp.path());
    let missing = temp.path().join("does-not-exist");

    let output = snapjaw(&addons_dir, &["install", missing.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("error: git clone failed"));
}

#[test]
fn test_update_unknown_addon() {
    let temp = TempDir::new().unwrap();
    let addons_dir = create_addons_dir(temp.path());

    let output = snapjaw(&addons_dir, &["update", "Ghost"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("error: unknown addon: Ghost"));
}

#[test]
fn test_invalid_addons_dir() {
    let temp = TempDir::new().unwrap();

    let output = snapjaw(&temp.path().join("nope"), &["status"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("error: invalid directory path"));
}

#[test]
fn test_addons_dir_found_from_game_directory() {
    let temp = TempDir::new().unwrap();
    let addons_dir = create_addons_dir(temp.path());
    let game_dir = temp.path().join("WoW");
    fs::write(game_dir.join("WoW.exe"), "").unwrap();
    fs::create_dir_all(addons_dir.join("Manual")).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_snapjaw"))
        .current_dir(game_dir.join("Interface"))
        .arg("status")
        .output()
        .expect("Failed to run snapjaw");

    assert!(output.status.success(), "status failed: {}", stderr(&output));
    assert!(stdout(&output).contains("| Manual | untracked |"));
}

#[test]
fn test_addons_dir_not_found() {
    let temp = TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_snapjaw"))
        .current_dir(temp.path())
        .arg("status")
        .output()
        .expect("Failed to run snapjaw");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("error: addons directory not found"));
}

#[test]
fn test_backup_written_before_mutation() {
    let temp = TempDir::new().unwrap();
    let repo = create_addon_repo(temp.path(), &[("Foo.toc", "## Interface: 11200\n")]);
    let addons_dir = create_addons_dir(temp.path());

    let output = snapjaw(&addons_dir, &["install", repo.to_str().unwrap()]);
    assert!(output.status.success(), "install failed: {}", stderr(&output));
    assert!(!addons_dir.join("snapjaw.backup.json").exists());

    let before = fs::read_to_string(addons_dir.join("snapjaw.json")).unwrap();
    let output = snapjaw(&addons_dir, &["remove", "Foo"]);
    assert!(output.status.success());

    let backup = fs::read_to_string(addons_dir.join("snapjaw.backup.json")).unwrap();
    assert_eq!(backup, before);
}
