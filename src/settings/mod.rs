/*
 * Process-wide display settings: persisted theme preference with system fallback
 */

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tokio::sync::watch;
use tracing::{debug, warn};
use crate::models::{ArbviewError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    Auto,
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
            ThemeMode::Auto => "auto",
        })
    }
}

impl std::str::FromStr for ThemeMode {
    type Err = ArbviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            "auto" => Ok(ThemeMode::Auto),
            _ => Err(ArbviewError::ConfigError(format!("Unknown theme mode: {s}"))),
        }
    }
}

/// On-disk shape. The theme is kept as text so a hand-edited value degrades to `auto`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSettings {
    #[serde(default)]
    theme: Option<String>,
}

pub struct ThemeStore {
    path: PathBuf,
    mode: RwLock<ThemeMode>,
    system_dark: AtomicBool,
    dark_tx: watch::Sender<bool>,
}

impl ThemeStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, system_prefers_dark: bool) -> Self {
        let (dark_tx, _) = watch::channel(system_prefers_dark);
        Self {
            path: path.into(),
            mode: RwLock::new(ThemeMode::Auto),
            system_dark: AtomicBool::new(system_prefers_dark),
            dark_tx,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted preference and applies it. Returns whether dark mode is active.
    pub fn init(&self) -> Result<bool> {
        let mode = self.load()?;
        *self.mode.write().map_err(|_| poisoned())? = mode;
        debug!("Theme initialised from {}: {}", self.path.display(), mode);
        Ok(self.apply())
    }

    fn load(&self) -> Result<ThemeMode> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ThemeMode::Auto),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredSettings = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Ignoring unreadable settings file {}: {}", self.path.display(), e);
                StoredSettings::default()
            }
        };
        Ok(stored
            .theme
            .and_then(|t| t.parse().ok())
            .unwrap_or(ThemeMode::Auto))
    }

    fn persist(&self, mode: ThemeMode) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let stored = StoredSettings {
            theme: Some(mode.to_string()),
        };
        fs::write(&self.path, serde_json::to_vec_pretty(&stored)?)?;
        Ok(())
    }

    #[must_use]
    pub fn mode(&self) -> ThemeMode {
        self.mode.read().map(|m| *m).unwrap_or_default()
    }

    pub fn set_mode(&self, mode: ThemeMode) -> Result<bool> {
        self.persist(mode)?;
        *self.mode.write().map_err(|_| poisoned())? = mode;
        Ok(self.apply())
    }

    #[must_use]
    pub fn is_dark(&self) -> bool {
        match self.mode() {
            ThemeMode::Dark => true,
            ThemeMode::Light => false,
            ThemeMode::Auto => self.system_dark.load(Ordering::SeqCst),
        }
    }

    /// System appearance changed. Only takes effect while the mode is `auto`.
    pub fn system_preference_changed(&self, prefers_dark: bool) -> bool {
        self.system_dark.store(prefers_dark, Ordering::SeqCst);
        if self.mode() == ThemeMode::Auto {
            self.apply()
        } else {
            self.is_dark()
        }
    }

    /// Receiver of the effective dark flag; notified only when it actually changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.dark_tx.subscribe()
    }

    fn apply(&self) -> bool {
        let dark = self.is_dark();
        self.dark_tx.send_if_modified(|current| {
            if *current == dark {
                false
            } else {
                *current = dark;
                true
            }
        });
        dark
    }
}

fn poisoned() -> ArbviewError {
    ArbviewError::Unknown("theme settings lock poisoned".to_string())
}

static GLOBAL: OnceCell<ThemeStore> = OnceCell::new();

/// Initialises and installs the process-wide store. Fails if one is already installed.
pub fn init_global(store: ThemeStore) -> Result<&'static ThemeStore> {
    store.init()?;
    GLOBAL
        .set(store)
        .map_err(|_| ArbviewError::ConfigError("Theme settings already initialised".to_string()))?;
    GLOBAL
        .get()
        .ok_or_else(|| ArbviewError::Unknown("Theme settings missing after init".to_string()))
}

#[must_use]
pub fn global() -> Option<&'static ThemeStore> {
    GLOBAL.get()
}
