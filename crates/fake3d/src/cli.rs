use std::path::PathBuf;

use clap::Parser;
use democonfig::{AntialiasSetting, InputModeSetting};

#[derive(Parser, Debug, Default)]
#[command(
    name = "fake3d",
    author,
    version,
    about = "Tilt-reactive parallax viewer for photos with depth maps"
)]
pub struct Args {
    /// Configuration file; defaults to `fake3d.toml` in the user config directory.
    #[arg(long, value_name = "PATH", env = "FAKE3D_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory that demo image paths are resolved against.
    #[arg(long, value_name = "DIR", env = "FAKE3D_ASSETS")]
    pub assets: Option<PathBuf>,

    /// Demo shown at start-up (see `--list-demos`).
    #[arg(long, value_name = "ID")]
    pub demo: Option<String>,

    /// Window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Tilt input: `auto`, `pointer`, or `sensor`.
    #[arg(long, value_name = "MODE", value_parser = parse_input_mode)]
    pub input: Option<InputModeSetting>,

    /// Attitude in degrees that maps onto full tilt, applied to both axes.
    #[arg(long, value_name = "DEGREES", value_parser = parse_max_tilt)]
    pub max_tilt: Option<f32>,

    /// Anti-aliasing policy: `auto`, `off`, or an explicit MSAA sample count (e.g. `4`).
    #[arg(long, value_name = "MODE", value_parser = parse_antialias)]
    pub antialias: Option<AntialiasSetting>,

    /// Print the demo table and exit.
    #[arg(long)]
    pub list_demos: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,
}

pub fn parse() -> Args {
    Args::parse()
}

pub fn parse_input_mode(value: &str) -> Result<InputModeSetting, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "auto" => Ok(InputModeSetting::Auto),
        "pointer" | "mouse" => Ok(InputModeSetting::Pointer),
        "sensor" | "motion" => Ok(InputModeSetting::Sensor),
        other => Err(format!(
            "unknown input mode '{other}'; expected auto, pointer, or sensor"
        )),
    }
}

pub fn parse_max_tilt(value: &str) -> Result<f32, String> {
    let degrees: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid tilt range '{value}'"))?;
    if degrees.is_finite() && degrees > 0.0 {
        Ok(degrees)
    } else {
        Err("tilt range must be a positive number of degrees".to_string())
    }
}

pub fn parse_antialias(value: &str) -> Result<AntialiasSetting, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("anti-alias mode must not be empty".to_string());
    }
    trimmed.parse::<AntialiasSetting>().map_err(|_| {
        format!("invalid anti-alias mode '{trimmed}'; use auto/off or 2/4/8/16")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_input_modes() {
        assert_eq!(parse_input_mode("Pointer"), Ok(InputModeSetting::Pointer));
        assert_eq!(parse_input_mode("sensor"), Ok(InputModeSetting::Sensor));
        assert_eq!(parse_input_mode(" auto "), Ok(InputModeSetting::Auto));
        assert!(parse_input_mode("gyro").is_err());
    }

    #[test]
    fn rejects_non_positive_tilt() {
        assert_eq!(parse_max_tilt("22.5"), Ok(22.5));
        assert!(parse_max_tilt("0").is_err());
        assert!(parse_max_tilt("-4").is_err());
        assert!(parse_max_tilt("inf").is_err());
        assert!(parse_max_tilt("steep").is_err());
    }

    #[test]
    fn parses_antialias_modes() {
        assert_eq!(parse_antialias("auto"), Ok(AntialiasSetting::Auto));
        assert_eq!(parse_antialias("0"), Ok(AntialiasSetting::Off));
        assert_eq!(parse_antialias("4"), Ok(AntialiasSetting::Samples(4)));
        assert!(parse_antialias("6").is_err());
        assert!(parse_antialias("").is_err());
    }

    #[test]
    fn flags_parse_into_args() {
        let args = Args::try_parse_from([
            "fake3d",
            "--demo",
            "ball",
            "--size",
            "800x600",
            "--input",
            "pointer",
            "--max-tilt",
            "20",
            "--list-demos",
        ])
        .unwrap();
        assert_eq!(args.demo.as_deref(), Some("ball"));
        assert_eq!(args.size.as_deref(), Some("800x600"));
        assert_eq!(args.input, Some(InputModeSetting::Pointer));
        assert_eq!(args.max_tilt, Some(20.0));
        assert!(args.list_demos);
        assert!(!args.print_config);
    }
}
