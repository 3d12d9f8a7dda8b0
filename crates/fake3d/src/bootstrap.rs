use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use democonfig::{AntialiasSetting, AppConfig, InputModeSetting, PowerSetting};
use parallax::{
    Antialiasing, DemoDescriptor, DemoRegistry, GpuPowerPreference, InputMode, InputOptions,
    RendererConfig, Thresholds,
};
use tracing::{debug, info};

use crate::cli::Args;
use crate::paths::AppPaths;

const DEFAULT_ASSET_ROOT: &str = "assets";

/// Configuration file contents plus where they came from.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

/// Reads `--config` when given (the file must exist), else the discovered `fake3d.toml`. A missing
/// discovered file yields the built-in defaults.
pub fn load_config(args: &Args, paths: &AppPaths) -> Result<LoadedConfig> {
    if let Some(path) = args.config.as_ref() {
        let config = AppConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        return Ok(LoadedConfig {
            config,
            source: Some(path.clone()),
        });
    }

    let path = paths.config_file();
    match AppConfig::load_optional(&path)
        .with_context(|| format!("failed to load config {}", path.display()))?
    {
        Some(config) => {
            info!(path = %path.display(), "loaded configuration");
            Ok(LoadedConfig {
                config,
                source: Some(path),
            })
        }
        None => {
            debug!(path = %path.display(), "no configuration file; using defaults");
            Ok(LoadedConfig {
                config: AppConfig::default(),
                source: None,
            })
        }
    }
}

/// Folds command-line flags over the file configuration and re-validates the result.
pub fn apply_overrides(config: &mut AppConfig, args: &Args) -> Result<()> {
    if let Some(demo) = args.demo.as_ref() {
        config.default_demo = Some(demo.clone());
    }
    if let Some(assets) = args.assets.as_ref() {
        config.asset_root = Some(assets.clone());
    }
    if let Some(size) = args.size.as_deref() {
        let (width, height) = parse_surface_size(size)?;
        config.window.width = width;
        config.window.height = height;
    }
    if let Some(mode) = args.input {
        config.input.mode = mode;
    }
    if let Some(degrees) = args.max_tilt {
        config.input.max_tilt_x = degrees;
        config.input.max_tilt_y = degrees;
    }
    if let Some(antialias) = args.antialias {
        config.window.antialias = Some(antialias);
    }
    config
        .validate()
        .context("command-line flags produce an invalid configuration")
}

/// Builds the effective demo table: `[[demos]]` when present, else the built-in demos.
pub fn build_registry(config: &AppConfig) -> Result<Arc<DemoRegistry>> {
    let registry = if config.demos.is_empty() {
        DemoRegistry::builtin()
    } else {
        let descriptors = config
            .demos
            .iter()
            .map(|demo| {
                DemoDescriptor::new(
                    demo.id.clone(),
                    demo.display_name(),
                    demo.image_path(),
                    demo.depth_path(),
                    Thresholds::new(demo.horizontal_threshold, demo.vertical_threshold),
                )
            })
            .collect();
        Arc::new(DemoRegistry::from_descriptors(descriptors).context("invalid [[demos]] table")?)
    };
    config.check_default_demo(registry.iter().map(|demo| demo.id.as_str()))?;
    Ok(registry)
}

pub fn renderer_config(config: &AppConfig, registry: Arc<DemoRegistry>) -> RendererConfig {
    let input = &config.input;
    RendererConfig {
        surface_size: (config.window.width, config.window.height),
        initial_demo: config.default_demo.clone(),
        registry,
        asset_root: config
            .asset_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSET_ROOT)),
        input: InputOptions {
            mode: map_input_mode(input.mode),
            max_tilt_x: input.max_tilt_x,
            max_tilt_y: input.max_tilt_y,
            sensor_rate_hz: input.sensor_rate_hz,
            sensor_deadband: input.sensor_deadband,
            sweep_period: input.sweep_period,
        },
        antialiasing: config
            .window
            .antialias
            .map(map_antialias)
            .unwrap_or_default(),
        power: map_power(config.window.power),
    }
}

fn map_input_mode(mode: InputModeSetting) -> InputMode {
    match mode {
        InputModeSetting::Auto => InputMode::Auto,
        InputModeSetting::Pointer => InputMode::Pointer,
        InputModeSetting::Sensor => InputMode::Sensor,
    }
}

fn map_antialias(setting: AntialiasSetting) -> Antialiasing {
    match setting {
        AntialiasSetting::Auto => Antialiasing::Auto,
        AntialiasSetting::Off => Antialiasing::Off,
        AntialiasSetting::Samples(samples) => Antialiasing::Samples(samples),
    }
}

fn map_power(setting: PowerSetting) -> GpuPowerPreference {
    match setting {
        PowerSetting::Low => GpuPowerPreference::Low,
        PowerSetting::High => GpuPowerPreference::High,
    }
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow::anyhow!("expected WxH format, e.g. 1280x720"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn parses_surface_sizes() {
        assert_eq!(parse_surface_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_surface_size(" 640 X 480 ").unwrap(), (640, 480));
        assert_eq!(parse_surface_size("800×600").unwrap(), (800, 600));
        assert!(parse_surface_size("1280").is_err());
        assert!(parse_surface_size("0x720").is_err());
        assert!(parse_surface_size("wide x tall").is_err());
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::from_raw(dir.path().to_path_buf());
        let loaded = load_config(&Args::default(), &paths).unwrap();
        assert!(loaded.source.is_none());
        assert_eq!(loaded.config, AppConfig::default());
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::from_raw(dir.path().to_path_buf());
        let args = Args {
            config: Some(dir.path().join("nope.toml")),
            ..Args::default()
        };
        assert!(load_config(&args, &paths).is_err());
    }

    #[test]
    fn discovered_config_is_loaded() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("fake3d.toml"),
            "version = 1\ndefault_demo = \"mount\"\n",
        )
        .unwrap();
        let paths = AppPaths::from_raw(dir.path().to_path_buf());
        let loaded = load_config(&Args::default(), &paths).unwrap();
        assert_eq!(loaded.source, Some(dir.path().join("fake3d.toml")));
        assert_eq!(loaded.config.default_demo.as_deref(), Some("mount"));
    }

    #[test]
    fn flags_override_file_values() {
        let mut config = AppConfig::from_toml_str(
            "version = 1\ndefault_demo = \"mount\"\n[input]\nmode = \"sensor\"\nmax_tilt_x = 30\n",
        )
        .unwrap();
        let args = Args {
            demo: Some("ball".into()),
            size: Some("640x480".into()),
            input: Some(InputModeSetting::Pointer),
            max_tilt: Some(10.0),
            antialias: Some(AntialiasSetting::Off),
            assets: Some(PathBuf::from("/tmp/pictures")),
            ..Args::default()
        };
        apply_overrides(&mut config, &args).unwrap();

        let registry = build_registry(&config).unwrap();
        let renderer = renderer_config(&config, registry);
        assert_eq!(renderer.surface_size, (640, 480));
        assert_eq!(renderer.initial_demo_id(), "ball");
        assert_eq!(renderer.asset_root, PathBuf::from("/tmp/pictures"));
        assert_eq!(renderer.input.mode, InputMode::Pointer);
        assert_eq!(renderer.input.max_tilt_x, 10.0);
        assert_eq!(renderer.input.max_tilt_y, 10.0);
        assert_eq!(renderer.input.sweep_period, Duration::from_secs(8));
        assert_eq!(renderer.antialiasing, Antialiasing::Off);
        assert_eq!(renderer.power, GpuPowerPreference::Low);
    }

    #[test]
    fn defaults_use_builtin_demos() {
        let config = AppConfig::default();
        let registry = build_registry(&config).unwrap();
        let renderer = renderer_config(&config, registry);
        assert_eq!(renderer.initial_demo_id(), "lady");
        assert_eq!(renderer.registry.len(), 4);
        assert_eq!(renderer.asset_root, PathBuf::from("assets"));
        assert_eq!(renderer.antialiasing, Antialiasing::Auto);
    }

    #[test]
    fn unknown_demo_flag_is_rejected() {
        let mut config = AppConfig::default();
        let args = Args {
            demo: Some("sculpture".into()),
            ..Args::default()
        };
        apply_overrides(&mut config, &args).unwrap();
        let err = build_registry(&config).unwrap_err();
        assert!(format!("{err:#}").contains("sculpture"));
    }

    #[test]
    fn custom_demo_table_replaces_builtins() {
        let config = AppConfig::from_toml_str(
            r#"
version = 1
default_demo = "harbor"

[[demos]]
id = "harbor"
name = "Harbor"
horizontal_threshold = 30
vertical_threshold = 20
"#,
        )
        .unwrap();
        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.len(), 1);
        let harbor = registry.get("harbor").unwrap();
        assert_eq!(harbor.image, "img/harbor.jpg");
        assert_eq!(harbor.depth, "img/harbor-map.jpg");
        assert_eq!(harbor.thresholds, Thresholds::new(30.0, 20.0));
        assert!(!registry.contains("lady"));
    }

    #[test]
    fn invalid_override_is_reported() {
        let mut config = AppConfig::default();
        let args = Args {
            max_tilt: Some(f32::NAN),
            ..Args::default()
        };
        assert!(apply_overrides(&mut config, &args).is_err());
    }
}
