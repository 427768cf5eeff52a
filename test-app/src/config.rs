// Configuration loading and PAN descriptor persistence.
//
// The JSON config file carries `id`, `password` and `tty`. Each may be
// overridden from the command line or the environment; a value given there
// wins over the file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use routeb_core::types::PanDescriptor;

/// Contents of the JSON config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tty: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub tty: Option<String>,
    pub id: Option<String>,
    pub password: Option<String>,
}

/// Fully resolved connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub tty: String,
    pub id: String,
    pub password: String,
}

impl Settings {
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
        let tty = overrides.tty.or(file.tty);
        let id = overrides.id.or(file.id);
        let password = overrides.password.or(file.password);

        let Some(tty) = tty else {
            bail!("no serial port configured (--tty, ROUTEB_TTY or \"tty\" in the config file)");
        };
        let Some(id) = id else {
            bail!("no Route B ID configured (--id, ROUTEB_ID or \"id\" in the config file)");
        };
        let Some(password) = password else {
            bail!(
                "no Route B password configured (--password, ROUTEB_PASSWORD or \"password\" in the config file)"
            );
        };
        Ok(Settings { tty, id, password })
    }
}

pub fn save_descriptor(path: &Path, pan: &PanDescriptor) -> Result<()> {
    let json = serde_json::to_string_pretty(pan)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

pub fn load_descriptor(path: &Path) -> Result<PanDescriptor> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
