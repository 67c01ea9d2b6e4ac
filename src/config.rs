use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const CONFIG_FILE_NAME: &str = "snapjaw.json";
pub const BACKUP_FILE_NAME: &str = "snapjaw.backup.json";

/// Executable marking the game installation directory
const GAME_EXECUTABLE: &str = "WoW.exe";

/// Config key of an addon name; lookups are case-insensitive
pub fn addon_key(name: &str) -> String {
    name.to_lowercase()
}

/// An installed addon as recorded in snapjaw.json
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddonRecord {
    pub name: String,
    pub url: String,
    pub branch: String,
    /// commit the installed files come from (40 hex chars)
    pub commit: String,
    #[serde(with = "timestamp")]
    pub released_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub installed_at: DateTime<Utc>,
    /// content signature of the installed directory, see `signature`
    #[serde(default)]
    pub checksum: Option<String>,
}

/// On-disk layout of snapjaw.json
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    addons_by_key: BTreeMap<String, AddonRecord>,
}

/// Installed addons of one addons directory, bound to the file it was loaded from
#[derive(Debug, Clone)]
pub struct Config {
    path: PathBuf,
    addons: BTreeMap<String, AddonRecord>,
}

impl Config {
    /// Create an empty config that will be saved to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            addons: BTreeMap::new(),
        }
    }

    /// Load the config at `path`, or start an empty one if the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, starting empty", path);
            return Ok(Self::new(path));
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(Error::from)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        let mut config = Self::new(path);
        for (key, record) in file.addons_by_key {
            if key != addon_key(&record.name) {
                tracing::warn!(
                    "Config key {:?} does not match addon name {:?}, re-keying",
                    key,
                    record.name
                );
            }
            config.insert(record);
        }

        Ok(config)
    }

    /// Write the config back to the file it belongs to.
    /// Output is pretty printed and sorted by key, written via temp file + rename.
    pub fn save(&self) -> Result<()> {
        let file = ConfigFile {
            addons_by_key: self.addons.clone(),
        };

        let mut content = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut content, formatter);
        file.serialize(&mut serializer)
            .context("Failed to serialize config")?;
        content.push(b'\n');

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content)
            .with_context(|| format!("Failed to write config file: {:?}", temp_path))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace config file: {:?}", self.path))?;

        tracing::debug!("Saved {} addon(s) to {:?}", self.addons.len(), self.path);
        Ok(())
    }

    /// Path the config is saved to
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&AddonRecord> {
        self.addons.get(&addon_key(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.addons.contains_key(&addon_key(name))
    }

    /// Insert or replace the record for `record.name`
    pub fn insert(&mut self, record: AddonRecord) {
        self.addons.insert(addon_key(&record.name), record);
    }

    pub fn remove(&mut self, name: &str) -> Option<AddonRecord> {
        self.addons.remove(&addon_key(name))
    }

    /// Records in key order
    pub fn records(&self) -> impl Iterator<Item = &AddonRecord> {
        self.addons.values()
    }

    pub fn len(&self) -> usize {
        self.addons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addons.is_empty()
    }
}

/// Copy of the config taken before a mutating command.
///
/// Restores the copy onto the config path when dropped, unless `keep` was called.
/// The backup file itself is left on disk either way.
pub struct ConfigBackup {
    config_path: PathBuf,
    backup_path: PathBuf,
    armed: bool,
}

impl ConfigBackup {
    pub fn create(config_path: &Path, backup_path: &Path) -> Result<Self> {
        let armed = config_path.exists();
        if armed {
            fs::copy(config_path, backup_path).with_context(|| {
                format!(
                    "Failed to back up config {:?} to {:?}",
                    config_path, backup_path
                )
            })?;
        }

        Ok(Self {
            config_path: config_path.to_path_buf(),
            backup_path: backup_path.to_path_buf(),
            armed,
        })
    }

    /// Keep the current config file instead of restoring the backup
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for ConfigBackup {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::copy(&self.backup_path, &self.config_path) {
            Ok(_) => tracing::warn!("Restored config from {:?}", self.backup_path),
            Err(e) => tracing::error!(
                "Failed to restore config from {:?}: {}",
                self.backup_path,
                e
            ),
        }
    }
}

/// Locate the addons directory of the game installation containing `start`
pub fn find_addons_dir(start: &Path) -> Option<PathBuf> {
    let game_dir = start
        .ancestors()
        .find(|dir| dir.join(GAME_EXECUTABLE).is_file())?;

    let interface_dir = game_dir.join("Interface");
    ["AddOns", "Addons"]
        .iter()
        .map(|name| interface_dir.join(name))
        .find(|dir| dir.is_dir())
        .or_else(|| Some(interface_dir.join("AddOns")))
}

mod timestamp {
    //! RFC 3339 timestamps; numeric Unix seconds are accepted when reading

    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(f64),
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => parse_text(&text)
                .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", text))),
            Raw::Seconds(seconds) => {
                let whole = seconds.trunc() as i64;
                let nanos = (seconds.fract() * 1e9).round() as u32;
                Utc.timestamp_opt(whole, nanos.min(999_999_999))
                    .single()
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", seconds)))
            }
        }
    }

    fn parse_text(text: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&Utc));
        }
        // timestamps without an offset are taken as UTC
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}
