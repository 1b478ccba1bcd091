mod cli;

use scormcast::{
    capture::{CaptureSettings, Recorder},
    config::{self, Config},
    events::{EventBus, PlayerEvent},
    player::{self, Player, RecordOptions, SharedPlayback},
    runtime::ShimRegistry,
    server::{self, AppContext},
    surface::{self, RenderSurface},
    vfs::VfsHandle,
};
use scormcast_av::{ToolRegistry, Transcoder, FFMPEG};
use scormcast_package::ContentPackage;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Overrides the `record` subcommand applies on top of the config file.
struct RecordArgs {
    package: PathBuf,
    output: Option<PathBuf>,
    trim_start: Option<f64>,
    trim_end: Option<f64>,
    raw_only: bool,
    devtools_url: Option<String>,
    headed: bool,
}

fn read_package(path: &Path) -> Result<ContentPackage> {
    if !path.exists() {
        anyhow::bail!("Package does not exist: {:?}", path);
    }

    let data = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let package = ContentPackage::from_zip(&data)
        .with_context(|| format!("Failed to load package {:?}", path))?;

    tracing::info!(
        "Loaded \"{}\" ({}, {} items, {} files)",
        package.title,
        package.spec_version,
        package.items.len(),
        package.archive.len()
    );
    Ok(package)
}

fn app_context(config: Arc<Config>) -> AppContext {
    AppContext {
        config,
        vfs: VfsHandle::spawn(),
        shims: ShimRegistry::new(),
        events: EventBus::new(),
        playback: SharedPlayback::default(),
    }
}

fn player_for(ctx: &AppContext) -> Player {
    Player::new(
        Arc::clone(&ctx.config),
        ctx.vfs.clone(),
        Arc::clone(&ctx.shims),
        ctx.events.clone(),
        Arc::clone(&ctx.playback),
    )
}

/// Log player events as they happen.
fn spawn_event_log(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(PlayerEvent::ItemStarted { index, title, .. }) => {
                    tracing::info!("Item {} started: {}", index + 1, title);
                }
                Ok(PlayerEvent::ItemFailed { index, error, .. }) => {
                    tracing::warn!("Item {} skipped: {}", index + 1, error);
                }
                Ok(PlayerEvent::ItemCompleted { index, status, .. }) => {
                    tracing::info!("Item {} completed ({})", index + 1, status);
                }
                Ok(PlayerEvent::RawFallback { reason }) => {
                    tracing::warn!("Saving raw capture: {}", reason);
                }
                Ok(PlayerEvent::Error { message }) => tracing::error!("{}", message),
                Ok(event) => tracing::debug!("Player event: {}", event.name()),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("Event log skipped {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn record(args: RecordArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if let Some(url) = args.devtools_url {
        config.browser.devtools_url = Some(url);
    }
    if args.headed {
        config.browser.headless = false;
    }
    config::validate_config(&config)?;

    let output_dir = args.output.unwrap_or_else(|| config.output.dir.clone());
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

    let package = read_package(&args.package)?;
    let config = Arc::new(config);
    let ctx = app_context(Arc::clone(&config));
    let event_log = spawn_event_log(&ctx.events);

    // The rendering context only needs to reach the server locally.
    let server = server::spawn_server(ctx.clone(), &config.server.host, 0).await?;

    let mut player = player_for(&ctx);
    let first = player
        .load(package)
        .await?
        .context("No item in the package could be played")?;

    let tools = ToolRegistry::discover(&config.tools);
    let surface: Arc<dyn RenderSurface> = Arc::new(
        surface::connect(&config.browser, &tools)
            .await
            .context("Failed to open the rendering context")?,
    );

    let transcoder = Arc::new(Transcoder::new(
        tools.get(FFMPEG).map(Path::to_path_buf),
        config.encode.clone(),
    ));
    let mut recorder = Recorder::new(CaptureSettings::from(&config.capture), transcoder);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        server::shutdown_signal().await;
        interrupt.cancel();
    });

    let options = RecordOptions {
        base_url: server.base_url(),
        output_dir,
        trim_start: args.trim_start,
        trim_end: args.trim_end,
        raw_only: args.raw_only,
    };

    let result = player::run_recording(
        &mut player,
        first,
        Arc::clone(&surface),
        &mut recorder,
        &options,
        cancel,
    )
    .await;

    if let Err(e) = surface.close().await {
        tracing::debug!("Closing the rendering context: {}", e);
    }
    player.unload().await;
    server.shutdown().await?;
    event_log.abort();

    let report = result?;
    println!("\nRecording saved: {}", report.artifact.display());
    println!("  Title: {}", report.title);
    println!(
        "  Items: {}/{} completed{}",
        report.items_completed,
        report.item_count,
        if report.finished { "" } else { " (stopped early)" }
    );
    println!("  Status: {}", report.completion_status);
    println!(
        "  Duration: {}s, {} frames{}",
        report.elapsed_seconds,
        report.frames,
        if report.raw { " (raw MJPEG)" } else { "" }
    );
    println!(
        "  Navigation: {} clicks, {} menu, {} keyboard, {} misses",
        report.navigation.activated,
        report.navigation.menu_advances,
        report.navigation.keyboard,
        report.navigation.misses
    );

    Ok(())
}

fn inspect(path: &Path, json: bool) -> Result<()> {
    let package = read_package(path)?;
    let summary = package.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Title: {}", summary.title);
    println!("Version: {}", summary.spec_version);
    println!("Files: {} ({} bytes)", summary.file_count, summary.total_bytes);
    println!("Base directory: {}", package.base_dir());

    println!("\nItems: {}", summary.items.len());
    for (i, item) in summary.items.iter().enumerate() {
        println!("  [{}] {} ({})", i + 1, item.item.title, item.item.id);
        match (&item.resource, &item.entry) {
            (_, Some(entry)) if entry.substituted => {
                println!("      entry: {} (declared {})", entry.path, entry.declared);
            }
            (_, Some(entry)) => println!("      entry: {}", entry.path),
            (Some(resource), None) => {
                println!("      entry: {} [missing]", resource.entry_path);
            }
            (None, None) => println!("      entry: [no resource {}]", item.item.resource_ref),
        }
    }

    Ok(())
}

async fn serve(
    path: &Path,
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let package = read_package(path)?;
    let config = Arc::new(config);
    let ctx = app_context(Arc::clone(&config));
    let event_log = spawn_event_log(&ctx.events);

    let mut player = player_for(&ctx);
    if player.load(package).await?.is_none() {
        anyhow::bail!("No item in the package could be played");
    }

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        server::shutdown_signal().await;
        stop.cancel();
    });

    println!(
        "Open http://{}:{}/player/?follow=1 to play \"{}\"",
        config.server.host,
        config.server.port,
        player.state().title.unwrap_or_default()
    );

    let server_cancel = cancel.clone();
    let (served, played) = tokio::join!(
        server::serve(
            ctx,
            &config.server.host,
            config.server.port,
            async move { server_cancel.cancelled().await },
        ),
        async {
            let result = player::run_interactive(&mut player, cancel.clone()).await;
            // The server may have stopped on its own; end playback with it.
            cancel.cancel();
            result
        },
    );

    player.unload().await;
    event_log.abort();
    served?;
    played
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Recording needs chrome; without ffmpeg the raw capture is saved.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!(
        "  Capture: {} fps, JPEG quality {}",
        config.capture.fps, config.capture.jpeg_quality
    );
    println!(
        "  Navigation: every {}ms, cooldown {}ms, {} extra keywords",
        config.navigation.interval_ms,
        config.navigation.cooldown_ms,
        config.navigation.extra_keywords.len()
    );
    match &config.browser.devtools_url {
        Some(url) => println!("  Browser: attach to {}", url),
        None => println!(
            "  Browser: launch {} at {}x{}",
            if config.browser.headless { "headless" } else { "headed" },
            config.browser.window_width,
            config.browser.window_height
        ),
    }
    println!("  Output: {}", config.output.dir.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "scormcast=trace,scormcast_av=debug,scormcast_package=debug,tower_http=debug"
                .to_string()
        } else {
            "scormcast=info,scormcast_av=info,scormcast_package=info,tower_http=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Record {
            package,
            output,
            trim_start,
            trim_end,
            raw_only,
            devtools_url,
            headed,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(record(
                RecordArgs {
                    package,
                    output,
                    trim_start,
                    trim_end,
                    raw_only,
                    devtools_url,
                    headed,
                },
                config_path,
            ))
        }
        Commands::Inspect { package, json } => inspect(&package, json),
        Commands::Serve {
            package,
            host,
            port,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(&package, host, port, config_path))
        }
        Commands::CheckTools => check_tools(config_path),
        Commands::Validate {
            config: validate_path,
        } => {
            let path = validate_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("scormcast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
