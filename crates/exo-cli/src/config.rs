//! Startup configuration – reads/writes `exo.toml`.
//!
//! ```toml
//! [control]
//! target_freq = 200.0
//! controller = "spline"
//!
//! [control.control_params]
//! peak_torque = 12.0
//!
//! [replay]
//! data_dir = "data"
//!
//! [output]
//! dir = "sessions"
//!
//! [logging]
//! json = false
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use exo_hal::DEFAULT_REPLAY_BASE;
use exo_types::Configuration;

/// Where recorded datasets are looked up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySection {
    /// Directory holding `<base>_LEFT.csv`, `<base>_RIGHT.csv` and
    /// `<base>_CONFIG.csv`.
    pub data_dir: PathBuf,
    /// Dataset base name used when the requested one is missing.
    pub default_base: String,
}

impl Default for ReplaySection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            default_base: DEFAULT_REPLAY_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Directory that receives telemetry CSVs and the session summary.
    pub dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub json: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,
}

/// Everything the `exo` binary reads at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExoConfig {
    pub control: Configuration,
    pub replay: ReplaySection,
    pub output: OutputSection,
    pub logging: LoggingSection,
}

impl ExoConfig {
    /// Absolute-or-relative path of the fallback replay dataset.
    pub fn default_replay_base(&self) -> PathBuf {
        self.replay.data_dir.join(&self.replay.default_base)
    }

    /// Resolve a `--past-data` base name against the data directory.
    pub fn replay_base(&self, name: &str) -> PathBuf {
        let requested = Path::new(name);
        if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.replay.data_dir.join(requested)
        }
    }
}

/// Default config location: `exo.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("exo.toml")
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<ExoConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: ExoConfig =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Load `path` (or defaults when absent) and apply environment overrides.
pub fn load_or_default(path: &Path) -> Result<ExoConfig, String> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply `EXO_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `EXO_TARGET_FREQ` | `control.target_freq` |
/// | `EXO_READ_ONLY` | `control.read_only` |
/// | `EXO_OUTPUT_DIR` | `output.dir` |
/// | `EXO_DATA_DIR` | `replay.data_dir` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut ExoConfig) {
    if let Ok(v) = std::env::var("EXO_TARGET_FREQ")
        && let Ok(freq) = v.trim().parse::<f64>()
    {
        cfg.control.target_freq = freq;
    }
    if let Ok(v) = std::env::var("EXO_READ_ONLY")
        && let Some(flag) = parse_flag(&v)
    {
        cfg.control.read_only = flag;
    }
    if let Ok(v) = std::env::var("EXO_OUTPUT_DIR")
        && !v.trim().is_empty()
    {
        cfg.output.dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("EXO_DATA_DIR")
        && !v.trim().is_empty()
    {
        cfg.replay.data_dir = PathBuf::from(v);
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Save the config to `path`, creating parent directories if necessary.
pub fn save_to(cfg: &ExoConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
