use anyhow::Result;
use std::io::Write;
use std::path::Path;

use crate::config::Config;
use crate::install::remove_addon_dir;

/// Handle the remove command
/// Names that are not installed are reported and skipped
pub fn handle<W: Write>(
    config: &mut Config,
    addons_dir: &Path,
    names: &[String],
    output: &mut W,
) -> Result<()> {
    for name in names {
        match config.remove(name) {
            None => writeln!(output, "Addon not found: \"{}\"", name)?,
            Some(addon) => {
                writeln!(output, "Removing addon {}", addon.name)?;
                remove_addon_dir(&addons_dir.join(&addon.name))?;
            }
        }
    }

    Ok(())
}
