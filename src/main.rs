use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{debug, info};

use glyphrain::config::{load_config_or_default, ConfigOverride};
use glyphrain::encoding::FfmpegPipe;
use glyphrain::error_codes::find_coded_error;
use glyphrain::rng::entropy_seed;
use glyphrain::{fnv1a64, GlyphPainter, GridSize, PixmapSurface, RainConfig, RainEngine};

#[derive(Debug, Parser)]
#[command(name = "glyphrain")]
#[command(about = "Digital rain: falling glyph columns with fading trails")]
#[command(version = env!("GLYPHRAIN_VERSION"))]
struct Cli {
    /// Log filter when RUST_LOG is unset (error, warn, info, debug, trace).
    #[arg(long = "log-level", global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the rain headless for a fixed number of ticks.
    Render(RenderArgs),
    /// Validate a config and print the resolved values.
    Check(CheckArgs),
    /// Open a live preview window.
    #[cfg(feature = "play")]
    Play(PlayArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// YAML config; built-in defaults when omitted.
    config: Option<PathBuf>,
    /// Override a config key, e.g. `--set col_size=18`.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

impl ConfigArgs {
    fn parsed_overrides(&self) -> Result<Vec<ConfigOverride>> {
        self.overrides
            .iter()
            .map(|raw| ConfigOverride::parse(raw))
            .collect()
    }

    fn load(&self) -> Result<RainConfig> {
        load_config_or_default(self.config.as_deref(), &self.parsed_overrides()?)
    }
}

#[derive(Debug, Args)]
struct RenderArgs {
    #[command(flatten)]
    config: ConfigArgs,
    #[arg(long, default_value_t = 640)]
    width: u32,
    #[arg(long, default_value_t = 360)]
    height: u32,
    #[arg(long, default_value_t = 200)]
    ticks: u64,
    /// `.png` keeps the last frame, other extensions go through ffmpeg.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,
    /// Treat `--output` as a directory and write one PNG per tick.
    #[arg(long)]
    sequence: bool,
    /// Seed for the run; overrides the config's `seed`.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Args)]
struct CheckArgs {
    #[command(flatten)]
    config: ConfigArgs,
    #[arg(long, default_value_t = 1920)]
    width: u32,
    #[arg(long, default_value_t = 1080)]
    height: u32,
    /// Machine-readable output; coded errors become a JSON envelope.
    #[arg(long)]
    json: bool,
}

#[cfg(feature = "play")]
#[derive(Debug, Args)]
struct PlayArgs {
    #[command(flatten)]
    config: ConfigArgs,
    #[arg(long, default_value_t = 960)]
    width: u32,
    #[arg(long, default_value_t = 540)]
    height: u32,
    #[arg(long)]
    seed: Option<u64>,
    /// Start paused; Space resumes.
    #[arg(long)]
    paused: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Render(args) => run_render(&args).map(|()| ExitCode::SUCCESS),
        Commands::Check(args) => run_check(&args),
        #[cfg(feature = "play")]
        Commands::Play(args) => run_play(args).map(|()| ExitCode::SUCCESS),
    }
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("glyphrain={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RenderOutput {
    HashOnly,
    Png(PathBuf),
    Sequence(PathBuf),
    Video(PathBuf),
}

impl RenderOutput {
    fn from_args(output: Option<&Path>, sequence: bool) -> Result<Self> {
        let Some(path) = output else {
            if sequence {
                bail!("--sequence needs --output <DIR>");
            }
            return Ok(Self::HashOnly);
        };
        if sequence {
            return Ok(Self::Sequence(path.to_path_buf()));
        }
        let is_png = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if is_png {
            Ok(Self::Png(path.to_path_buf()))
        } else if path.extension().is_none() {
            bail!(
                "cannot infer output format for {} (use .png, a video extension, or --sequence)",
                path.display()
            );
        } else {
            Ok(Self::Video(path.to_path_buf()))
        }
    }
}

fn run_render(args: &RenderArgs) -> Result<()> {
    if args.width == 0 || args.height == 0 {
        bail!("--width and --height must be >= 1");
    }
    let output = RenderOutput::from_args(args.output.as_deref(), args.sequence)?;

    let mut config = args.config.load()?;
    let seed = args.seed.or(config.seed).unwrap_or_else(entropy_seed);
    config.seed = Some(seed);

    let painter = GlyphPainter::for_source(config.font.as_ref())?;
    let surface = PixmapSurface::new(args.width, args.height, painter);
    let mut engine = RainEngine::new(config, surface);
    let grid = engine.grid();
    info!(
        width = args.width,
        height = args.height,
        columns = grid.columns,
        rows = grid.rows,
        seed,
        ticks = args.ticks,
        "rendering"
    );

    let mut encoder = match &output {
        RenderOutput::Video(path) => Some(FfmpegPipe::spawn(
            args.width,
            args.height,
            engine.config().frame_interval(),
            path,
        )?),
        RenderOutput::Sequence(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create sequence directory {}", dir.display()))?;
            None
        }
        RenderOutput::HashOnly | RenderOutput::Png(_) => None,
    };

    let progress_step = (args.ticks / 10).max(1);
    for tick in 1..=args.ticks {
        engine.tick();

        match &output {
            RenderOutput::Sequence(dir) => {
                let path = dir.join(format!("frame_{tick:05}.png"));
                engine.surface().save_png(&path)?;
            }
            RenderOutput::Video(_) => {
                if let Some(encoder) = encoder.as_mut() {
                    encoder.write_frame(engine.surface().to_rgba8())?;
                }
            }
            RenderOutput::HashOnly | RenderOutput::Png(_) => {}
        }

        if tick % progress_step == 0 {
            debug!(tick, total = args.ticks, "render progress");
        }
    }

    if let Some(encoder) = encoder.take() {
        encoder.finish().context("video encoding failed")?;
    }
    if let RenderOutput::Png(path) = &output {
        engine.surface().save_png(path)?;
    }

    let hash = fnv1a64(&engine.surface().to_rgba8());
    match &output {
        RenderOutput::HashOnly => println!(
            "OK: {} ticks ({}x{}, seed {seed}) frame_hash={hash:016x}",
            args.ticks, args.width, args.height
        ),
        RenderOutput::Png(path) | RenderOutput::Sequence(path) | RenderOutput::Video(path) => {
            println!(
                "Wrote {} ({} ticks, {}x{}, seed {seed}) frame_hash={hash:016x}",
                path.display(),
                args.ticks,
                args.width,
                args.height
            )
        }
    }
    Ok(())
}

fn run_check(args: &CheckArgs) -> Result<ExitCode> {
    let checked = args.config.load().and_then(|config| {
        GlyphPainter::for_source(config.font.as_ref())?;
        Ok(config)
    });

    let config = match checked {
        Ok(config) => config,
        Err(error) => {
            if args.json {
                if let Some(coded) = find_coded_error(&error) {
                    println!("{}", serde_json::to_string_pretty(&coded.envelope())?);
                    return Ok(ExitCode::from(2));
                }
            }
            return Err(error);
        }
    };

    let grid = GridSize::for_surface(args.width, args.height, config.col_size);
    if args.json {
        let report = json!({
            "ok": true,
            "surface": { "width": args.width, "height": args.height },
            "grid": grid,
            "config": config,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(ExitCode::SUCCESS);
    }

    let source = args
        .config
        .config
        .as_ref()
        .map_or_else(|| "built-in defaults".to_owned(), |path| path.display().to_string());
    println!(
        "OK: {source} ({}x{} -> {} columns x {} rows)",
        args.width, args.height, grid.columns, grid.rows
    );
    println!(
        "col_size={} speed={}..{} fade_alpha={} reset_chance={} reentry={:?}",
        config.col_size,
        config.speed_min,
        config.speed_max,
        config.fade_alpha,
        config.reset_chance,
        config.reentry
    );
    println!(
        "trail={} head={} background={} glyphs={} frame_interval={}ms",
        config.trail_color,
        config.head_color,
        config.background_color,
        config.glyphs.len(),
        config.frame_interval_ms
    );
    if let Some(font) = &config.font {
        println!("font={}", font.path.display());
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(feature = "play")]
fn run_play(args: PlayArgs) -> Result<()> {
    let config = args.config.load()?;
    glyphrain::play::run(glyphrain::play::PlayOptions {
        config_path: args.config.config.clone(),
        overrides: args.config.parsed_overrides()?,
        initial_config: config,
        width: args.width,
        height: args.height,
        seed: args.seed,
        start_paused: args.paused,
    })
}
