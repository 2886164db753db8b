use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use relic_formats::TableLayout;
use serde::{Deserialize, Serialize};

/// Where a release keeps its tables inside the executable's data segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameProfile {
    pub name: String,
    /// PEF section holding the pattern-initialized data segment.
    #[serde(default = "default_data_segment")]
    pub data_segment: usize,
    pub tables: TableLayout,
    /// Rooms per age; every known release has exactly one.
    #[serde(default = "default_rooms_per_age")]
    pub rooms_per_age: u16,
    /// Age and node entered by `boot` when none is given.
    #[serde(default = "default_start")]
    pub start: (u16, u16),
}

fn default_data_segment() -> usize {
    1
}

fn default_rooms_per_age() -> u16 {
    1
}

fn default_start() -> (u16, u16) {
    (1, 1)
}

impl GameProfile {
    /// DVD edition of the Macintosh executable.
    pub fn dvd() -> Self {
        Self {
            name: "dvd".to_string(),
            data_segment: 1,
            tables: TableLayout {
                age_table: 0x2598,
                sound_table: 0x2678,
                movie_table: 0x2DA8,
                help_table: 0x38FAC,
                url_table: 0x35B8,
            },
            rooms_per_age: 1,
            start: (1, 1),
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "dvd" => Some(Self::dvd()),
            _ => None,
        }
    }

    pub fn builtin_names() -> &'static [&'static str] {
        &["dvd"]
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading game profile {}", path.display()))?;
        let profile: Self = serde_json::from_str(&data)
            .with_context(|| format!("parsing game profile {}", path.display()))?;
        Ok(profile)
    }

    /// `--profile-json` wins over the named built-in profile.
    pub fn resolve(name: &str, json: Option<&Path>) -> Result<Self> {
        match json {
            Some(path) => Self::from_json_file(path),
            None => Self::builtin(name).ok_or_else(|| {
                anyhow!(
                    "unknown game profile '{name}' (known: {})",
                    Self::builtin_names().join(", ")
                )
            }),
        }
    }
}
