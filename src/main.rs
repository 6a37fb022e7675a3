#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info};
use std::io::Write;
use std::path::{Path, PathBuf};

use stickerflow::app_config::{Config, LogLevel, ProviderKind};
use stickerflow::app_controller::{Controller, OutputMode};
use stickerflow::language_utils::MarketLanguage;
use stickerflow::models::{ImageBytes, PlatformId, UserInput};
use stickerflow::pipeline::gate::ConfirmMode;

/// CLI wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum CliProvider {
    Gemini,
    Mock,
}

impl From<CliProvider> for ProviderKind {
    fn from(cli_provider: CliProvider) -> Self {
        match cli_provider {
            CliProvider::Gemini => ProviderKind::Gemini,
            CliProvider::Mock => ProviderKind::Mock,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a sticker set from a concept
    Generate(GenerateArgs),

    /// Generate shell completions for stickerflow
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Character concept, e.g. "a sleepy office cat"
    #[arg(value_name = "CONCEPT")]
    concept: String,

    /// Target market: korean, japanese, "traditional chinese" (or ko, ja, zh-TW)
    #[arg(short = 'm', long, default_value = "korean")]
    market: String,

    /// Reference image (PNG) guiding the character
    #[arg(short, long, value_name = "FILE")]
    reference: Option<PathBuf>,

    /// Use the reference image as the main image without generating a character
    #[arg(long, requires = "reference")]
    skip_character: bool,

    /// Approve every checkpoint automatically
    #[arg(short, long)]
    auto: bool,

    /// Print NDJSON events and the final result on stdout
    #[arg(long)]
    json: bool,

    /// Generation provider
    #[arg(short, long, value_enum)]
    provider: Option<CliProvider>,

    /// Metadata languages, comma separated (en, ko, ja, zh-TW, zh-CN)
    #[arg(long, value_delimiter = ',')]
    languages: Vec<String>,

    /// Export platforms, comma separated (ogq_sticker, line_sticker, line_emoji)
    #[arg(long, value_delimiter = ',')]
    platforms: Vec<String>,

    /// Directory receiving the exports
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

/// stickerflow - staged AI generation of sticker sets
#[derive(Parser, Debug)]
#[command(name = "stickerflow")]
#[command(version)]
#[command(about = "Concept-to-sticker-set generation pipeline")]
#[command(long_about = "stickerflow turns a character concept into a market-ready sticker set: \
strategy, key visual, 45 stickers, post-processing, listing metadata and platform exports.

EXAMPLES:
    stickerflow generate \"a sleepy office cat\" --auto
    stickerflow generate \"pastel bunny\" -m ja --languages ja,en
    stickerflow generate \"mascot\" -r mascot.png --skip-character --json
    stickerflow config init
    stickerflow completions zsh > _stickerflow

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file does not
    exist, a default one is created. The Gemini API key can also be given
    through the GEMINI_API_KEY environment variable.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

// Colored logger on stderr; stdout carries NDJSON events
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The level is lowered or raised once the config is known
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();
    if let Some(level) = &cli.log_level {
        log::set_max_level(LogLevel::from(level.clone()).to_level_filter());
    }

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "stickerflow", &mut std::io::stdout());
            Ok(())
        }
        Commands::Config { action } => run_config(action, &cli.config_path),
        Commands::Generate(args) => run_generate(args, &cli.config_path, cli.log_level).await,
    }
}

fn run_config(action: ConfigAction, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = if config_path.exists() {
                Config::load(config_path)?
            } else {
                Config::default()
            };
            let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
            println!("{}", json);
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                return Err(anyhow!(
                    "Config file already exists at {} (use --force to overwrite)",
                    config_path.display()
                ));
            }
            Config::default().write(config_path)?;
            info!("Default configuration written to {}", config_path.display());
        }
    }
    Ok(())
}

async fn run_generate(args: GenerateArgs, config_path: &Path, log_level: Option<CliLogLevel>) -> Result<()> {
    let mut config = Config::load_or_create(config_path)?;

    // Command line options win over the file
    if let Some(provider) = args.provider {
        config.generation.provider = provider.into();
    }
    if args.auto {
        config.confirm_mode = ConfirmMode::Auto;
    }
    if !args.languages.is_empty() {
        config.metadata_languages = args.languages.clone();
    }
    if !args.platforms.is_empty() {
        config.platforms = args
            .platforms
            .iter()
            .map(|p| p.parse::<PlatformId>())
            .collect::<Result<Vec<_>>>()?;
    }
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    match log_level {
        Some(level) => config.log_level = level.into(),
        None => log::set_max_level(config.log_level.to_level_filter()),
    }

    let market: MarketLanguage = args.market.parse()?;
    let mut input = UserInput::new(args.concept, market).skip_character_generation(args.skip_character);
    if let Some(reference) = &args.reference {
        let bytes = std::fs::read(reference)
            .context(format!("Failed to read reference image: {}", reference.display()))?;
        input = input.with_reference_image(ImageBytes::from(bytes));
    }

    let controller = Controller::with_config(config)?;
    let output = if args.json { OutputMode::Json } else { OutputMode::Human };
    let summary = controller.run(input, output).await?;

    if summary.status == stickerflow::pipeline::job::JobStatus::Completed {
        Ok(())
    } else {
        Err(anyhow!("Run ended with status {}", summary.status))
    }
}
