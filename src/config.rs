//! TOML-based deployment configuration.
//!
//! Launch flags decide *how* the session behaves (see [`crate::session`]);
//! this file decides *what* it shows and how the engine is tuned. Every
//! struct implements `Default`, so a missing or partial file is never an
//! error.
//!
//! ## Config file search order
//!
//! 1. `SIGNAGE_CONFIG` environment variable (explicit override)
//! 2. Next to the executable (`<exe_dir>/signage.toml`)
//! 3. Platform config directory (`%APPDATA%\SignageShell\signage.toml` on Windows)
//! 4. Current working directory (`./signage.toml`)
//! 5. No file found → `Config::default()`

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::navigation::NavigationScope;

const CONFIG_FILE: &str = "signage.toml";

// ─────────────────────────────────────────────────────────────────────────────
// Config structs
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub content: ContentConfig,
    pub display: DisplayConfig,
    pub servo: ServoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub window_title: String,
}

/// Bundled signage content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Entry page, absolute or relative to the install location.
    pub entry: PathBuf,
    /// Only allow navigation below the entry page's directory instead of the
    /// whole `file:` origin.
    pub restrict_to_content_dir: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// RGBA fill shown until the content is ready (values 0.0–1.0).
    pub background: [f32; 4],
    /// Surface size when the platform reports no monitor.
    pub fallback_width: u32,
    pub fallback_height: u32,
}

/// Servo engine performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// Maximum layout threads. 0 = auto-detect from CPU count.
    pub layout_threads: i64,
    /// HTTP cache size in bytes.
    pub cache_size: i64,
    /// User-agent string. Empty = engine default.
    pub user_agent: String,
    /// Pre-cache GPU shaders at startup.
    pub precache_shaders: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Default impls
// ─────────────────────────────────────────────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            window_title: "Digital Signage".to_string(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            entry: PathBuf::from("content/index.html"),
            restrict_to_content_dir: false,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            // #1a1a1a
            background: [0.102, 0.102, 0.102, 1.0],
            fallback_width: 1920,
            fallback_height: 1080,
        }
    }
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            layout_threads: 0,
            cache_size: 50_000,
            user_agent: String::new(),
            precache_shaders: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Loads configuration from a TOML file. Never panics: returns defaults
    /// if no file is found or if parsing fails.
    pub fn load() -> Self {
        match find_config_path() {
            Some(path) => match fs::read_to_string(&path) {
                Ok(content) => match toml::from_str::<Config>(&content) {
                    Ok(config) => {
                        info!(path = %path.display(), "Configuration loaded");
                        config
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                        Config::default()
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read config, using defaults");
                    Config::default()
                }
            },
            None => {
                info!("No config file found, using defaults");
                Config::default()
            }
        }
    }

    pub fn navigation_scope(&self) -> NavigationScope {
        if self.content.restrict_to_content_dir {
            NavigationScope::ContentDir
        } else {
            NavigationScope::Origin
        }
    }
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content entry '{0}' cannot be expressed as a file URL")]
    NotAFileUrl(PathBuf),
}

impl ContentConfig {
    /// Resolves the entry page to a `file:` URL.
    ///
    /// Relative entries are looked up next to the executable, at the project
    /// root when running from `target/`, then in the working directory. When
    /// none exists the working-directory candidate is used anyway, so the
    /// engine shows its own error page instead of the shell refusing to start.
    pub fn entry_url(&self) -> Result<Url, ContentError> {
        let path = if self.entry.is_absolute() {
            self.entry.clone()
        } else {
            match locate_relative(&self.entry) {
                Some(path) => path,
                None => {
                    warn!(entry = %self.entry.display(), "Content entry not found");
                    std::env::current_dir()
                        .unwrap_or_default()
                        .join(&self.entry)
                }
            }
        };
        Url::from_file_path(&path).map_err(|()| ContentError::NotAFileUrl(path))
    }
}

fn locate_relative(entry: &Path) -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe()
        && let Ok(canonical) = exe.canonicalize()
        && let Some(exe_dir) = canonical.parent()
    {
        let p = exe_dir.join(entry);
        if p.is_file() {
            return Some(p);
        }

        // target/{debug,release}/ → project root
        if let Some(target_dir) = exe_dir.parent()
            && target_dir.file_name().is_some_and(|n| n == "target")
            && let Some(project_root) = target_dir.parent()
        {
            let p = project_root.join(entry);
            if p.is_file() {
                return Some(p);
            }
        }
    }

    let p = std::env::current_dir().ok()?.join(entry);
    p.is_file().then_some(p)
}

/// Searches for a config file in the standard locations.
fn find_config_path() -> Option<PathBuf> {
    // 1. Explicit env var override
    if let Ok(path) = std::env::var("SIGNAGE_CONFIG") {
        let p = PathBuf::from(path);
        if p.is_file() {
            return Some(p);
        }
    }

    // 2. Next to the executable
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let p = dir.join(CONFIG_FILE);
        if p.is_file() {
            return Some(p);
        }
    }

    // 3. Platform config directory
    if let Some(dir) = platform_config_dir() {
        let p = dir.join(CONFIG_FILE);
        if p.is_file() {
            return Some(p);
        }
    }

    // 4. Current working directory
    let p = PathBuf::from(CONFIG_FILE);
    if p.is_file() {
        return Some(p);
    }

    None
}

/// Returns the platform config directory without adding a dependency.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("APPDATA")
            .ok()
            .map(|appdata| PathBuf::from(appdata).join("SignageShell"))
    }
    #[cfg(not(windows))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .or_else(|| std::env::var("HOME").ok().map(|h| format!("{h}/.config")))
            .map(|dir| PathBuf::from(dir).join("signage-shell"))
    }
}
