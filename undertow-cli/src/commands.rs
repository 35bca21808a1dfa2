//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use undertow_core::config::UndertowConfig;
use undertow_core::engine::{MemoryEngine, RqbitEngine, RqbitOptions, TransferEngine};
use undertow_core::subtitle::srt_to_vtt;
use undertow_core::{RuntimeMode, SessionRegistry};
use undertow_search::{MockSubtitleProvider, OpenSubtitlesProvider, SubtitleProvider};
use undertow_web::{AppState, run_server};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the API and streaming server
    Serve(ServeArgs),
    /// Convert an SRT subtitle file to WebVTT
    Convert {
        /// SRT file to convert
        input: PathBuf,
        /// Destination path (defaults to the input with a .vtt extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Flags for `serve`. Anything left unset falls back to the environment,
/// then to the built-in defaults.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Scratch directory holding per-session data
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Serve every entry of this directory as a transfer (development mode)
    #[arg(long)]
    pub seed_dir: Option<PathBuf>,

    /// Remove sessions idle for longer than this many hours
    #[arg(long)]
    pub max_age_hours: Option<u64>,

    /// Seconds between idle-session sweeps
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,

    /// Seconds to wait for torrent metadata before giving up
    #[arg(long)]
    pub metadata_timeout_secs: Option<u64>,

    /// Which engine and subtitle provider back the server
    #[arg(long, default_value_t = RuntimeMode::Development)]
    pub mode: RuntimeMode,

    /// Resolve magnet links through trackers only (production mode)
    #[arg(long)]
    pub disable_dht: bool,
}

impl ServeArgs {
    /// Overlays the flags onto `config`.
    pub fn apply(&self, config: &mut UndertowConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = &self.data_dir {
            config.session.data_dir = dir.clone();
        }
        if let Some(hours) = self.max_age_hours {
            config.session.max_age = Duration::from_secs(hours * 60 * 60);
        }
        if let Some(seconds) = self.sweep_interval_secs {
            config.session.sweep_interval = Duration::from_secs(seconds.max(1));
        }
        if let Some(seconds) = self.metadata_timeout_secs {
            config.session.metadata_timeout = Duration::from_secs(seconds);
        }
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve(args) => serve(args).await,
        Commands::Convert { input, output } => {
            let written = convert_file(&input, output.as_deref()).await?;
            println!("Wrote {}", written.display());
            Ok(())
        }
    }
}

/// Runs the server until Ctrl-C.
///
/// # Errors
/// - Torrent session failed to start
/// - Data or seed directory unusable
/// - Server failed to bind or serve
pub async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = UndertowConfig::from_env();
    args.apply(&mut config);

    tokio::fs::create_dir_all(&config.session.data_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create data directory {}",
                config.session.data_dir.display()
            )
        })?;

    let engine = build_engine(&args, &config).await?;
    let subtitles = build_subtitle_provider(&config)?;

    println!("Starting Undertow server...");
    println!("Mode: {}", args.mode);
    println!("URL: http://{}:{}", config.server.host, config.server.port);
    println!("Data: {}", config.session.data_dir.display());
    println!("Press Ctrl+C to stop the server");

    let registry = Arc::new(SessionRegistry::new(engine, config.session.clone()));
    let state = AppState::new(registry, subtitles, config);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            return;
        }
        info!("Shutdown requested");
        signal.cancel();
    });

    run_server(state, shutdown).await?;
    Ok(())
}

/// Picks the transfer engine for the requested mode: the swarm in
/// production, local files otherwise.
///
/// # Errors
/// - Torrent session failed to start
/// - Seed directory could not be listed
pub async fn build_engine(
    args: &ServeArgs,
    config: &UndertowConfig,
) -> anyhow::Result<Arc<dyn TransferEngine>> {
    let data_dir = config.session.data_dir.clone();
    if args.mode.is_production() {
        if args.seed_dir.is_some() {
            warn!("--seed-dir is ignored in production mode");
        }
        let options = RqbitOptions {
            disable_dht: args.disable_dht,
            ..RqbitOptions::default()
        };
        let engine = RqbitEngine::new(data_dir, options)
            .await
            .context("failed to start the torrent engine")?;
        return Ok(Arc::new(engine));
    }

    let seed_dir = args.seed_dir.as_deref();
    let engine = MemoryEngine::with_options(Duration::ZERO, Some(data_dir));
    if let Some(dir) = seed_dir {
        let seeded = engine
            .seed_directory(dir)
            .with_context(|| format!("failed to seed transfers from {}", dir.display()))?;
        info!(count = seeded.len(), dir = %dir.display(), "Seeded transfers");
        for transfer in &seeded {
            println!("  {}: {}", transfer.name(), transfer.magnet());
        }
    }

    Ok(Arc::new(engine))
}

/// OpenSubtitles when an API key is configured, canned results otherwise.
///
/// # Errors
/// - HTTP client could not be constructed
pub fn build_subtitle_provider(
    config: &UndertowConfig,
) -> anyhow::Result<Arc<dyn SubtitleProvider>> {
    if config.subtitles.api_key.is_some() {
        return Ok(Arc::new(OpenSubtitlesProvider::new(&config.subtitles)?));
    }
    warn!("OPENSUBTITLES_API_KEY not set, subtitle search returns sample results");
    Ok(Arc::new(MockSubtitleProvider::new()))
}

/// Converts `input` from SRT to WebVTT, returning the path written.
///
/// # Errors
/// - Input unreadable or output unwritable
/// - Output would overwrite the input
pub async fn convert_file(input: &Path, output: Option<&Path>) -> anyhow::Result<PathBuf> {
    let output = output.map_or_else(|| input.with_extension("vtt"), Path::to_path_buf);
    if output == input {
        bail!("refusing to overwrite {}", input.display());
    }

    let srt = tokio::fs::read(input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;
    tokio::fs::write(&output, srt_to_vtt(&srt))
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!(input = %input.display(), output = %output.display(), "Converted subtitle");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    const SRT: &str = "1\n00:00:01,000 --> 00:00:02,500\nHello\n";

    #[test]
    fn test_serve_flags_override_config() {
        let cli = TestCli::try_parse_from([
            "undertow",
            "serve",
            "--port",
            "9000",
            "--data-dir",
            "/srv/undertow",
            "--max-age-hours",
            "2",
            "--sweep-interval-secs",
            "0",
            "--mode",
            "prod",
        ])
        .unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };

        let mut config = UndertowConfig::default();
        args.apply(&mut config);

        assert_eq!(args.mode, RuntimeMode::Production);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.session.data_dir, PathBuf::from("/srv/undertow"));
        assert_eq!(config.session.max_age, Duration::from_secs(2 * 60 * 60));
        assert_eq!(config.session.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.session.metadata_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(TestCli::try_parse_from(["undertow", "serve", "--mode", "staging"]).is_err());
    }

    fn serve_args(extra: &[&str]) -> ServeArgs {
        let argv = ["undertow", "serve"].iter().chain(extra);
        match TestCli::try_parse_from(argv).unwrap().command {
            Commands::Serve(args) => args,
            Commands::Convert { .. } => panic!("expected serve"),
        }
    }

    #[tokio::test]
    async fn test_production_mode_starts_torrent_engine() {
        let data = tempfile::tempdir().unwrap();
        let mut config = UndertowConfig::for_testing();
        config.session.data_dir = data.path().to_path_buf();
        let args = serve_args(&["--mode", "prod", "--disable-dht"]);
        assert!(args.disable_dht);

        let engine = build_engine(&args, &config).await.unwrap();

        let bad = engine.add_descriptor("not a magnet").await;
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_development_engine_seeds_directory() {
        let seed = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(seed.path().join("Movie")).unwrap();
        std::fs::write(seed.path().join("Movie/Movie.mkv"), b"video").unwrap();
        std::fs::write(seed.path().join("clip.mp4"), b"clip").unwrap();
        let config = UndertowConfig::for_testing();

        let seed_arg = seed.path().to_str().unwrap();
        let args = serve_args(&["--seed-dir", seed_arg]);
        assert!(build_engine(&args, &config).await.is_ok());

        let missing = seed.path().join("missing");
        let args = serve_args(&["--seed-dir", missing.to_str().unwrap()]);
        assert!(build_engine(&args, &config).await.is_err());
    }

    #[test]
    fn test_provider_without_key_is_mock() {
        let provider = build_subtitle_provider(&UndertowConfig::for_testing()).unwrap();
        assert!(format!("{provider:?}").contains("Mock"));
    }

    #[tokio::test]
    async fn test_convert_writes_vtt_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("episode.srt");
        std::fs::write(&input, SRT).unwrap();

        let written = convert_file(&input, None).await.unwrap();

        assert_eq!(written, dir.path().join("episode.vtt"));
        let vtt = std::fs::read_to_string(&written).unwrap();
        assert!(vtt.starts_with("WEBVTT"));
        assert!(vtt.contains("00:00:01.000 --> 00:00:02.500"));
    }

    #[tokio::test]
    async fn test_convert_to_explicit_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("episode.srt");
        let output = dir.path().join("out/track.vtt");
        std::fs::write(&input, SRT).unwrap();
        std::fs::create_dir_all(dir.path().join("out")).unwrap();

        let written = convert_file(&input, Some(&output)).await.unwrap();
        assert_eq!(written, output);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_convert_refuses_to_overwrite_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("already.vtt");
        std::fs::write(&input, "WEBVTT\n").unwrap();

        assert!(convert_file(&input, None).await.is_err());
        assert!(convert_file(&dir.path().join("missing.srt"), None).await.is_err());
    }
}
