use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::action::{Color, StrokeWidth, DEFAULT_FONT_SIZE};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorSettings {
    pub last_color: Color,
    pub last_stroke: StrokeWidth,
    pub last_font_size: f32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            last_color: Color::RED,
            last_stroke: StrokeWidth::Medium,
            last_font_size: DEFAULT_FONT_SIZE,
        }
    }
}

impl EditorSettings {
    fn file_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("com", "notemark", "notemark")?;
        let config_dir = dirs.config_dir();
        std::fs::create_dir_all(config_dir).ok()?;
        Some(config_dir.join("settings.json"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::file_path().context("cannot resolve settings path")?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::file_path().context("cannot resolve settings path")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
