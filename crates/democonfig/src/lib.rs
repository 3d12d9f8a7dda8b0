use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

pub const CONFIG_VERSION: u32 = 1;
pub const CONFIG_FILE_NAME: &str = "fake3d.toml";

const MAX_SENSOR_RATE_HZ: u32 = 240;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to render configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputModeSetting {
    #[default]
    Auto,
    Pointer,
    Sensor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    #[default]
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntialiasSetting {
    Auto,
    Off,
    Samples(u32),
}

impl AntialiasSetting {
    pub fn from_samples(samples: u32) -> Option<Self> {
        match samples {
            0 | 1 => Some(Self::Off),
            2 | 4 | 8 | 16 => Some(Self::Samples(samples)),
            _ => None,
        }
    }
}

impl fmt::Display for AntialiasSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Off => f.write_str("off"),
            Self::Samples(samples) => write!(f, "{samples}"),
        }
    }
}

impl std::str::FromStr for AntialiasSetting {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        parse_antialias(raw)
    }
}

impl Serialize for AntialiasSetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Root of `fake3d.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_demo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_root: Option<PathBuf>,
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub input: InputSection,
    /// Replaces the built-in demo table when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub demos: Vec<DemoEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WindowSection {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(
        default,
        deserialize_with = "deserialize_antialias_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub antialias: Option<AntialiasSetting>,
    #[serde(default)]
    pub power: PowerSetting,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InputSection {
    #[serde(default)]
    pub mode: InputModeSetting,
    #[serde(default = "default_max_tilt")]
    pub max_tilt_x: f32,
    #[serde(default = "default_max_tilt")]
    pub max_tilt_y: f32,
    #[serde(default = "default_sensor_rate")]
    pub sensor_rate_hz: u32,
    #[serde(default = "default_deadband")]
    pub sensor_deadband: f32,
    #[serde(
        default = "default_sweep_period",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub sweep_period: Duration,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DemoEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Color image relative to the asset root. Defaults to `img/<id>.jpg`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Depth map relative to the asset root. Defaults to `img/<id>-map.jpg`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<String>,
    pub horizontal_threshold: f32,
    pub vertical_threshold: f32,
}

impl DemoEntry {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn image_path(&self) -> String {
        self.image
            .clone()
            .unwrap_or_else(|| format!("img/{}.jpg", self.id))
    }

    pub fn depth_path(&self) -> String {
        self.depth
            .clone()
            .unwrap_or_else(|| format!("img/{}-map.jpg", self.id))
    }
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_max_tilt() -> f32 {
    15.0
}

fn default_sensor_rate() -> u32 {
    60
}

fn default_deadband() -> f32 {
    0.005
}

fn default_sweep_period() -> Duration {
    Duration::from_secs(8)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            default_demo: None,
            asset_root: None,
            window: WindowSection::default(),
            input: InputSection::default(),
            demos: Vec::new(),
        }
    }
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            antialias: None,
            power: PowerSetting::default(),
        }
    }
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            mode: InputModeSetting::default(),
            max_tilt_x: default_max_tilt(),
            max_tilt_y: default_max_tilt(),
            sensor_rate_hz: default_sensor_rate(),
            sensor_deadband: default_deadband(),
            sweep_period: default_sweep_period(),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&humantime::format_duration(*duration))
}

fn deserialize_antialias_opt<'de, D>(deserializer: D) -> Result<Option<AntialiasSetting>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Str(String),
        Num(i64),
    }

    let helper: Option<Helper> = Option::deserialize(deserializer)?;
    let result = match helper {
        None => None,
        Some(Helper::Str(raw)) => Some(parse_antialias(&raw).map_err(de::Error::custom)?),
        Some(Helper::Num(value)) => {
            if value < 0 {
                return Err(de::Error::custom("antialias value must be non-negative"));
            }
            Some(parse_antialias(&value.to_string()).map_err(de::Error::custom)?)
        }
    };
    Ok(result)
}

fn parse_antialias(raw: &str) -> Result<AntialiasSetting, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "max" | "default" => Ok(AntialiasSetting::Auto),
        "off" | "none" | "disable" | "disabled" => Ok(AntialiasSetting::Off),
        other => other
            .parse::<u32>()
            .ok()
            .and_then(AntialiasSetting::from_samples)
            .ok_or_else(|| format!("invalid antialias setting '{other}'")),
    }
}

impl AppConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: AppConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Like [`AppConfig::load`], but a missing file yields `Ok(None)`.
    pub fn load_optional(path: &Path) -> Result<Option<Self>, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents).map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} must be non-zero",
                self.window.width, self.window.height
            )));
        }

        let input = &self.input;
        for (axis, value) in [("max_tilt_x", input.max_tilt_x), ("max_tilt_y", input.max_tilt_y)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "input.{axis} must be a positive number of degrees, got {value}"
                )));
            }
        }
        if !(1..=MAX_SENSOR_RATE_HZ).contains(&input.sensor_rate_hz) {
            return Err(ConfigError::Invalid(format!(
                "input.sensor_rate_hz must be within 1..={MAX_SENSOR_RATE_HZ}, got {}",
                input.sensor_rate_hz
            )));
        }
        if !(input.sensor_deadband.is_finite() && input.sensor_deadband >= 0.0) {
            return Err(ConfigError::Invalid(
                "input.sensor_deadband must be >= 0".into(),
            ));
        }
        if input.sweep_period.is_zero() {
            return Err(ConfigError::Invalid(
                "input.sweep_period must be greater than zero".into(),
            ));
        }

        let mut seen = HashSet::new();
        for demo in &self.demos {
            if demo.id.trim().is_empty() {
                return Err(ConfigError::Invalid("demo id may not be empty".into()));
            }
            if !seen.insert(demo.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "demo '{}' is defined more than once",
                    demo.id
                )));
            }
            for (label, value) in [
                ("horizontal_threshold", demo.horizontal_threshold),
                ("vertical_threshold", demo.vertical_threshold),
            ] {
                if !(value.is_finite() && value > 0.0) {
                    return Err(ConfigError::Invalid(format!(
                        "demo '{}' {label} must be positive, got {value}",
                        demo.id
                    )));
                }
            }
        }

        if !self.demos.is_empty() {
            self.check_default_demo(self.demos.iter().map(|demo| demo.id.as_str()))?;
        }

        Ok(())
    }

    /// Fails when `default_demo` names an id missing from `known`.
    pub fn check_default_demo<'a>(
        &self,
        known: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError> {
        let Some(default_demo) = self.default_demo.as_deref() else {
            return Ok(());
        };
        if known.into_iter().any(|id| id == default_demo) {
            Ok(())
        } else {
            Err(ConfigError::Invalid(format!(
                "default_demo references unknown demo '{default_demo}'"
            )))
        }
    }
}
