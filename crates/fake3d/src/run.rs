use std::io::{self, Write};

use anyhow::{Context, Result};
use parallax::{DemoRegistry, Renderer};
use tracing_subscriber::EnvFilter;

use crate::bootstrap::{apply_overrides, build_registry, load_config, renderer_config};
use crate::cli::Args;
use crate::paths::AppPaths;

pub fn run(args: Args) -> Result<()> {
    initialise_tracing();

    let paths = AppPaths::discover()?;
    tracing::debug!(config_dir = %paths.config_dir().display(), "resolved fake3d paths");

    let loaded = load_config(&args, &paths)?;
    let mut config = loaded.config;
    apply_overrides(&mut config, &args)?;
    let registry = build_registry(&config)?;

    if args.print_config {
        let rendered = config.to_toml_string()?;
        io::stdout()
            .write_all(rendered.as_bytes())
            .context("failed to write configuration")?;
        return Ok(());
    }

    if args.list_demos {
        return print_demos(&registry);
    }

    let renderer_config = renderer_config(&config, registry);
    tracing::info!(
        demo = renderer_config.initial_demo_id(),
        assets = %renderer_config.asset_root.display(),
        input = ?renderer_config.input.mode,
        config = ?loaded.source,
        "starting fake3d"
    );
    Renderer::new(renderer_config).run()
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn print_demos(registry: &DemoRegistry) -> Result<()> {
    let mut out = io::stdout().lock();
    for (position, demo) in registry.iter().enumerate() {
        let key = if position < 9 {
            (position + 1).to_string()
        } else {
            "-".to_string()
        };
        writeln!(
            out,
            "{key}  {:<12} {:<20} h={} v={}",
            demo.id, demo.display_name, demo.thresholds.horizontal, demo.thresholds.vertical
        )
        .context("failed to write demo list")?;
    }
    Ok(())
}
