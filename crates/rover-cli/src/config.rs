//! Configuration file – reads/writes `~/.rover/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rover_hal::JoystickMapper;
use rover_perception::SensorSettings;
use rover_runtime::{BehaviorConfig, ControlSettings, RoverLoopConfig};
use rover_types::{ModeTable, RoverError};
use serde::{Deserialize, Serialize};

/// Persisted rover configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Rover name, used as the `source` prefix on published events.
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Mode code published to the controller at startup.
    #[serde(default = "default_start_mode")]
    pub start_mode: u8,

    #[serde(default)]
    pub sensors: SensorConfig,

    #[serde(default)]
    pub behavior: BehaviorConfig,

    #[serde(default)]
    pub modes: ModeTable,

    #[serde(default)]
    pub sim: SimConfig,
}

/// Proximity sensor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub max_range: f32,
    pub min_distance: f32,
    pub avoidance_enabled: bool,
    /// Proximity data older than this stops the rover.  `0` disables the
    /// check.
    pub stale_after_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            max_range: 3.0,
            min_distance: 0.2,
            avoidance_enabled: true,
            stale_after_ms: 500,
        }
    }
}

/// One cube placed in the simulated arena.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CubeSpawn {
    pub id: u32,
    pub x: f32,
    pub y: f32,
}

/// The simulated arena the demo binary drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Half the side length of the square arena (metres).
    pub half_extent: f32,
    pub home: (f32, f32),
    pub start: (f32, f32),
    pub cubes: Vec<CubeSpawn>,
    /// Camera cone width (radians) and reach (metres).
    pub camera_fov: f32,
    pub camera_range: f32,
    /// Physical reach used when the controller reports a grab or a deposit.
    pub grab_within: f32,
    pub deposit_within: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            half_extent: 3.0,
            home: (0.0, 0.0),
            start: (0.5, 0.0),
            cubes: vec![
                CubeSpawn { id: 1, x: 1.8, y: 0.4 },
                CubeSpawn { id: 2, x: -1.5, y: 1.2 },
                CubeSpawn { id: 3, x: 0.6, y: -2.0 },
            ],
            camera_fov: 1.2,
            camera_range: 2.5,
            grab_within: 0.25,
            deposit_within: 0.4,
        }
    }
}

fn default_name() -> String {
    "rover".to_string()
}
fn default_tick_period_ms() -> u64 {
    100
}
fn default_status_interval_ms() -> u64 {
    1000
}
fn default_heartbeat_interval_ms() -> u64 {
    2000
}
fn default_start_mode() -> u8 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            tick_period_ms: default_tick_period_ms(),
            status_interval_ms: default_status_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            start_mode: default_start_mode(),
            sensors: SensorConfig::default(),
            behavior: BehaviorConfig::default(),
            modes: ModeTable::default(),
            sim: SimConfig::default(),
        }
    }
}

impl Config {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.max(1))
    }

    pub fn sensor_settings(&self) -> SensorSettings {
        SensorSettings {
            max_range: self.sensors.max_range,
            min_distance: self.sensors.min_distance,
            avoidance_enabled: self.sensors.avoidance_enabled,
        }
    }

    /// Everything the tick loop needs, with `name` as the event source.
    pub fn loop_config(&self, name: &str) -> RoverLoopConfig {
        RoverLoopConfig {
            name: name.to_string(),
            tick_period: self.tick_period(),
            status_interval: Duration::from_millis(self.status_interval_ms.max(1)),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms.max(1)),
            control: ControlSettings::new(self.behavior.clone(), self.tick_period())
                .with_stale_after(Duration::from_millis(self.sensors.stale_after_ms)),
            modes: self.modes.clone(),
            joystick: JoystickMapper::new(self.behavior.max_cmd),
        }
    }
}

/// `$ROVER_CONFIG` if set, otherwise `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("ROVER_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, RoverError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, RoverError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        RoverError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let mut cfg = parse(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Parse a config document.  Missing fields take their defaults.
pub(crate) fn parse(raw: &str) -> Result<Config, RoverError> {
    toml::from_str(raw).map_err(|e| RoverError::Config(format!("failed to parse: {e}")))
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.  Values that do
/// not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_NAME` | `name` |
/// | `ROVER_TICK_MS` | `tick_period_ms` |
/// | `ROVER_MIN_DISTANCE` | `sensors.min_distance` |
/// | `ROVER_AVOIDANCE` | `sensors.avoidance_enabled` (`true`/`false`/`1`/`0`) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROVER_NAME")
        && !v.trim().is_empty()
    {
        cfg.name = v;
    }
    if let Ok(v) = std::env::var("ROVER_TICK_MS")
        && let Ok(ms) = v.parse::<u64>()
        && ms > 0
    {
        cfg.tick_period_ms = ms;
    }
    if let Ok(v) = std::env::var("ROVER_MIN_DISTANCE")
        && let Ok(d) = v.parse::<f32>()
        && d.is_finite()
        && d >= 0.0
    {
        cfg.sensors.min_distance = d;
    }
    if let Ok(v) = std::env::var("ROVER_AVOIDANCE") {
        match v.trim() {
            "1" | "true" => cfg.sensors.avoidance_enabled = true,
            "0" | "false" => cfg.sensors.avoidance_enabled = false,
            _ => {}
        }
    }
}

/// Save the config to disk, creating the parent directory if necessary.
pub fn save(cfg: &Config) -> Result<(), RoverError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), RoverError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            RoverError::Config(format!("failed to create config directory: {e}"))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                RoverError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| RoverError::Config(format!("failed to serialize: {e}")))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| RoverError::Config(format!("failed to write {}: {e}", path.display())))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| RoverError::Config(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::Mode;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.status_interval_ms, 1000);
        assert_eq!(loaded.heartbeat_interval_ms, 2000);
        assert_eq!(loaded.modes, ModeTable::default());
        assert_eq!(loaded.behavior, BehaviorConfig::default());
        assert_eq!(loaded.sim, SimConfig::default());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let cfg = parse(
            r#"
name = "scout"

[sensors]
min_distance = 0.35

[[modes.bindings]]
code = 7
mode = "auto_paused"
"#,
        )
        .unwrap();

        assert_eq!(cfg.name, "scout");
        assert_eq!(cfg.sensors.min_distance, 0.35);
        assert_eq!(cfg.sensors.max_range, 3.0);
        assert_eq!(cfg.modes.resolve(7), Ok(Mode::AutoPaused));
        assert!(cfg.modes.resolve(2).is_err(), "table replaced, not merged");
        assert_eq!(cfg.behavior.search_leg_ticks, 30);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        assert!(matches!(
            parse("tick_period_ms = \"fast\""),
            Err(RoverError::Config(_))
        ));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn config_path_points_to_rover_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".rover"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn loop_config_carries_intervals_and_staleness() {
        let cfg = Config::default();
        let lc = cfg.loop_config("r9");
        assert_eq!(lc.name, "r9");
        assert_eq!(lc.tick_period, Duration::from_millis(100));
        assert_eq!(lc.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(lc.control.stale_after, Duration::from_millis(500));
        assert!((lc.control.dt - 0.1).abs() < 1e-6);
    }

    #[test]
    fn apply_env_overrides_changes_name() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("ROVER_NAME", "achilles") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.name, "achilles");
        unsafe { std::env::remove_var("ROVER_NAME") };
    }

    #[test]
    fn apply_env_overrides_changes_tick_period() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("ROVER_TICK_MS", "50") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.tick_period_ms, 50);
        unsafe { std::env::remove_var("ROVER_TICK_MS") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_min_distance() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("ROVER_MIN_DISTANCE", "close") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.sensors.min_distance, 0.2);
        unsafe { std::env::remove_var("ROVER_MIN_DISTANCE") };
    }

    #[test]
    fn apply_env_overrides_toggles_avoidance() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("ROVER_AVOIDANCE", "false") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!(!cfg.sensors.avoidance_enabled);
        unsafe { std::env::remove_var("ROVER_AVOIDANCE") };
    }
}
