mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    tracing::debug!("Loaded config from {:?}", path);
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./scormcast.toml",
        "./config.toml",
        "~/.config/scormcast/config.toml",
        "/etc/scormcast/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.capture.fps == 0 || config.capture.fps > 30 {
        anyhow::bail!(
            "capture.fps must be between 1 and 30, got {}",
            config.capture.fps
        );
    }

    if config.capture.chunk_interval_ms == 0 {
        anyhow::bail!("capture.chunk_interval_ms cannot be 0");
    }

    if !(1..=100).contains(&config.capture.jpeg_quality) {
        anyhow::bail!(
            "capture.jpeg_quality must be between 1 and 100, got {}",
            config.capture.jpeg_quality
        );
    }

    let nav = &config.navigation;
    if nav.interval_ms == 0 || nav.mutation_debounce_ms == 0 {
        anyhow::bail!("navigation intervals cannot be 0");
    }

    if nav.extra_keywords.iter().any(|k| k.trim().is_empty()) {
        anyhow::bail!("navigation.extra_keywords cannot contain empty entries");
    }

    if config.encode.video_crf > 51 {
        anyhow::bail!("encode.video_crf must be at most 51");
    }

    if config.encode.engine_probe_timeout_secs == 0 {
        anyhow::bail!("encode.engine_probe_timeout_secs cannot be 0");
    }

    if config.browser.window_width == 0 || config.browser.window_height == 0 {
        anyhow::bail!("browser window size cannot be 0");
    }

    if let Some(url) = &config.browser.devtools_url {
        if !(url.starts_with("ws://") || url.starts_with("http://")) {
            anyhow::bail!("browser.devtools_url must be a ws:// or http:// URL: {}", url);
        }
    }

    for (name, path) in [
        ("ffmpeg", config.tools.ffmpeg.as_deref()),
        ("chrome", config.tools.chrome.as_deref()),
    ] {
        if let Some(path) = path {
            if !path.exists() {
                tracing::warn!("Configured {} path does not exist: {:?}", name, path);
            }
        }
    }

    Ok(())
}
