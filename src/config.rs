use std::fs;
use std::io;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};

/// Panel-specific settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PanelSettings {
    #[serde(default)]
    pub start_path: Option<String>,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// External transfer tool binary (looked up on PATH if not absolute)
    #[serde(default = "default_tool_path")]
    pub tool_path: String,
    /// Log file that detached jobs append their output to
    #[serde(default)]
    pub detached_log: Option<String>,
    /// Left/right panel settings
    #[serde(default = "default_panels")]
    pub panels: Vec<PanelSettings>,
    /// Theme name: "dark" or "light"
    #[serde(default = "default_theme_name")]
    pub theme: String,
}

fn default_tool_path() -> String {
    "rclone".to_string()
}

fn default_panels() -> Vec<PanelSettings> {
    vec![PanelSettings::default(), PanelSettings::default()]
}

fn default_theme_name() -> String {
    "dark".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tool_path: default_tool_path(),
            detached_log: None,
            panels: default_panels(),
            theme: default_theme_name(),
        }
    }
}

impl Settings {
    /// Returns the config directory path (~/.rclonedir)
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".rclonedir"))
    }

    /// Returns the config file path (~/.rclonedir/settings.json)
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("settings.json"))
    }

    /// Returns the log directory path (~/.rclonedir/logs)
    pub fn log_dir() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("logs"))
    }

    /// Log file that detached jobs append to (~/.rclonedir/jobs.log by default)
    pub fn detached_log_path(&self) -> PathBuf {
        match &self.detached_log {
            Some(p) => PathBuf::from(p),
            None => Self::config_dir()
                .map(|d| d.join("jobs.log"))
                .unwrap_or_else(|| PathBuf::from("rclonedir-jobs.log")),
        }
    }

    /// Ensures the config directory and a default settings file exist.
    /// Called on app startup.
    pub fn ensure_config_exists() {
        if let Some(config_dir) = Self::config_dir() {
            if !config_dir.exists() && fs::create_dir_all(&config_dir).is_ok() {
                // User-only permissions on Unix
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = fs::Permissions::from_mode(0o700);
                    let _ = fs::set_permissions(&config_dir, perms);
                }
            }
        }

        if let Some(config_path) = Self::config_path() {
            if !config_path.exists() {
                let _ = Self::default().save();
            }
        }
    }

    /// Loads settings with error information for startup diagnostics
    pub fn load_with_error() -> Result<Self, String> {
        Self::ensure_config_exists();

        let config_path = Self::config_path()
            .ok_or_else(|| "Could not determine config path".to_string())?;

        let content = fs::read_to_string(&config_path)
            .map_err(|e| format!("Failed to read settings file: {}", e))?;

        serde_json::from_str(&content)
            .map_err(|e| format!("Invalid JSON in settings.json: {}", e))
    }

    /// Saves settings to the config file using atomic write pattern
    pub fn save(&self) -> io::Result<()> {
        let Some(config_dir) = Self::config_dir() else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine config directory",
            ));
        };

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = fs::Permissions::from_mode(0o700);
                let _ = fs::set_permissions(&config_dir, perms);
            }
        }

        let config_path = config_dir.join("settings.json");
        let temp_path = config_dir.join("settings.json.tmp");
        let content = serde_json::to_string_pretty(self)?;

        // Atomic write: write to temp file first, then rename
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, &config_path)?;

        Ok(())
    }

    /// Resolves a configured start path to a valid directory.
    /// Only absolute paths are accepted; symlinks are resolved and missing
    /// paths fall back to the nearest existing parent, then to `fallback`.
    pub fn resolve_path<F>(&self, path_opt: &Option<String>, fallback: F) -> PathBuf
    where
        F: FnOnce() -> PathBuf,
    {
        if let Some(path_str) = path_opt {
            let path = PathBuf::from(path_str);

            if !path.is_absolute() {
                return fallback();
            }

            if let Ok(canonical) = path.canonicalize() {
                if canonical.is_dir() {
                    return canonical;
                }
            }

            let mut current = path;
            while let Some(parent) = current.parent() {
                if let Ok(canonical_parent) = parent.canonicalize() {
                    if canonical_parent.is_dir() {
                        return canonical_parent;
                    }
                }
                if parent == current {
                    break;
                }
                current = parent.to_path_buf();
            }
        }
        fallback()
    }

    /// Start path for the panel at `index`, or `fallback` if unset/invalid.
    pub fn panel_start_path<F>(&self, index: usize, fallback: F) -> PathBuf
    where
        F: FnOnce() -> PathBuf,
    {
        let configured = self.panels.get(index).and_then(|p| p.start_path.clone());
        self.resolve_path(&configured, fallback)
    }
}
