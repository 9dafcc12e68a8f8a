//! Configuration management for the `voxhub` tool
//!
//! The library itself owns no configuration; only the command-line tool
//! reads `~/.voxhub.cfg`.

use crate::error::VoxError;
use crate::util::TrimParams;
use ini::Ini;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

type Result<T> = std::result::Result<T, VoxError>;

const CONFIG_FILE: &str = ".voxhub.cfg";

/// Persistent settings for the command-line tool
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path
    path: PathBuf,
}

impl Config {
    /// Load configuration from `~/.voxhub.cfg` or create the default
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(&path)
                .map_err(|e| VoxError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default");
            let default = Self::default_config();
            default
                .write_to_file(&path)
                .map_err(|e| VoxError::Config(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self { ini, path })
    }

    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn default_config() -> Ini {
        let mut ini = Ini::new();
        let trim = TrimParams::default();

        ini.with_section(Some("speech"))
            .set("backend", "")
            .set("rate", "")
            .set("volume", "")
            .set("pitch", "")
            .set("voice", "");

        ini.with_section(Some("audio")).set("trim_silence", "true");

        ini.with_section(Some("trim"))
            .set("frame_ms", trim.frame_ms.to_string())
            .set("hop_ms", trim.hop_ms.to_string())
            .set("head_ms", trim.head_ms.to_string())
            .set("tail_ms", trim.tail_ms.to_string())
            .set("min_floor_db", trim.min_floor_db.to_string())
            .set("max_floor_db", trim.max_floor_db.to_string())
            .set("open_db", trim.open_db.to_string())
            .set("close_db", trim.close_db.to_string())
            .set("min_speech_frames", trim.min_speech_frames.to_string())
            .set("min_silence_frames", trim.min_silence_frames.to_string())
            .set("preroll_ms", trim.preroll_ms.to_string())
            .set("postroll_ms", trim.postroll_ms.to_string())
            .set("boundary_search_ms", trim.boundary_search_ms.to_string())
            .set("fade_ms", trim.fade_ms.to_string());

        ini
    }

    /// Raw value, treating an empty string as absent
    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.ini
            .get_from(Some(section), key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Get a boolean value from config
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get an integer value from config
    pub fn get_int(&self, section: &str, key: &str, default: i32) -> i32 {
        self.get(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get a float value from config
    pub fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.get(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// A normalized speech parameter, ignored unless it parses into `[0, 1]`
    fn normalized(&self, key: &str) -> Option<f32> {
        let raw = self.get("speech", key)?;
        match raw.parse::<f32>() {
            Ok(v) if (0.0..=1.0).contains(&v) => Some(v),
            _ => {
                warn!("Ignoring speech.{} = {:?}: expected a number in [0, 1]", key, raw);
                None
            }
        }
    }

    /// Preferred backend name; `None` selects the best available
    pub fn backend(&self) -> Option<String> {
        self.get("speech", "backend").map(str::to_string)
    }

    /// Speech rate (0.0-1.0)
    pub fn rate(&self) -> Option<f32> {
        self.normalized("rate")
    }

    /// Speech volume (0.0-1.0)
    pub fn volume(&self) -> Option<f32> {
        self.normalized("volume")
    }

    /// Speech pitch (0.0-1.0)
    pub fn pitch(&self) -> Option<f32> {
        self.normalized("pitch")
    }

    /// Voice index for the selected backend
    pub fn voice(&self) -> Option<usize> {
        self.get_int("speech", "voice", -1).try_into().ok()
    }

    /// Should rendered audio have leading and trailing silence removed?
    pub fn trim_silence(&self) -> bool {
        self.get_bool("audio", "trim_silence", true)
    }

    /// Trimmer tuning, each field falling back to its default
    pub fn trim_params(&self) -> TrimParams {
        let d = TrimParams::default();
        let uint = |key: &str, default: u32| -> u32 {
            self.get("trim", key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let params = TrimParams {
            frame_ms: self.get_float("trim", "frame_ms", d.frame_ms),
            hop_ms: self.get_float("trim", "hop_ms", d.hop_ms),
            head_ms: self.get_float("trim", "head_ms", d.head_ms),
            tail_ms: self.get_float("trim", "tail_ms", d.tail_ms),
            min_floor_db: self.get_float("trim", "min_floor_db", d.min_floor_db),
            max_floor_db: self.get_float("trim", "max_floor_db", d.max_floor_db),
            open_db: self.get_float("trim", "open_db", d.open_db),
            close_db: self.get_float("trim", "close_db", d.close_db),
            min_speech_frames: uint("min_speech_frames", d.min_speech_frames),
            min_silence_frames: uint("min_silence_frames", d.min_silence_frames),
            preroll_ms: self.get_float("trim", "preroll_ms", d.preroll_ms),
            postroll_ms: self.get_float("trim", "postroll_ms", d.postroll_ms),
            boundary_search_ms: self.get_float("trim", "boundary_search_ms", d.boundary_search_ms),
            fade_ms: self.get_float("trim", "fade_ms", d.fade_ms),
        };
        if params.open_db <= params.close_db {
            warn!(
                "trim.open_db ({}) must exceed trim.close_db ({}), using defaults",
                params.open_db, params.close_db
            );
            return TrimParams {
                open_db: d.open_db,
                close_db: d.close_db,
                ..params
            };
        }
        params
    }
}
