use anidb_identify_cli::commands::{self, OutputFormat};
use anidb_identify_cli::config::{self, CliOverrides, ConfigLoader};
use anidb_identify_cli::discovery::{self, DiscoveredFile, DiscoveryOptions, MediaKind};
use anidb_identify_cli::terminal;
use anidb_identify_core::IdentifyOptions;
use anidb_identify_core::protocol::messages::Viewed;
use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "anidb-identify")]
#[command(about = "Hash local anime files and identify them against AniDB", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging for the pipeline and the CLI
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file to use instead of the platform default
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database to use
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct DiscoveryArgs {
    /// Files or directories to process
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Only take files matching these globs (e.g. "*.mkv")
    #[arg(short = 'i', long = "include", value_name = "GLOB")]
    include_patterns: Vec<String>,

    /// Skip files matching these globs; wins over --include
    #[arg(short = 'e', long = "exclude", value_name = "GLOB")]
    exclude_patterns: Vec<String>,

    /// Take every file, not just known media extensions
    #[arg(long)]
    no_defaults: bool,

    /// Do not descend into subdirectories
    #[arg(long)]
    no_recursive: bool,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,
}

impl DiscoveryArgs {
    fn discover(&self) -> Result<Vec<DiscoveredFile>> {
        let options = DiscoveryOptions {
            include_patterns: self.include_patterns.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            use_defaults: !self.no_defaults,
            recursive: !self.no_recursive,
            follow_links: false,
        };
        let files = discovery::discover(&self.paths, &options).context("File discovery failed")?;

        let counts: Vec<String> = discovery::kind_counts(&files)
            .into_iter()
            .map(|(kind, count)| match kind {
                Some(MediaKind::Video) => format!("{count} video"),
                Some(MediaKind::Subtitle) => format!("{count} subtitle"),
                Some(MediaKind::Audio) => format!("{count} audio"),
                None => format!("{count} other"),
            })
            .collect();
        if !files.is_empty() {
            eprintln!("Found {} file(s): {}", files.len(), counts.join(", "));
        }
        Ok(files)
    }

    fn show_progress(&self) -> bool {
        !self.no_progress && terminal::should_show_progress()
    }
}

#[derive(Args, Debug)]
struct HasherArgs {
    /// Hasher threads; 0 uses one per CPU
    #[arg(short = 'j', long, value_name = "N")]
    threads: Option<usize>,

    /// Let only one hasher read from disk at a time
    #[arg(long)]
    serialize_io: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print ed2k links for local files
    Hash {
        #[command(flatten)]
        discovery: DiscoveryArgs,

        #[command(flatten)]
        hasher: HasherArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Identify local files with AniDB
    Identify {
        #[command(flatten)]
        discovery: DiscoveryArgs,

        #[command(flatten)]
        hasher: HasherArgs,

        /// Add files to the mylist
        #[arg(short, long)]
        add: bool,

        /// Mylist viewed state: 1 unwatched, 2 watched
        #[arg(long, value_name = "STATE", requires = "add")]
        viewed: Option<u8>,

        /// Mylist storage text
        #[arg(long, requires = "add")]
        storage: Option<String>,

        /// Mylist file state code
        #[arg(long, requires = "add")]
        state: Option<u8>,

        /// Also fetch anime and episode details
        #[arg(long)]
        details: bool,

        /// AniDB user name; the password comes from the config or environment
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Show queue and file counts from the database
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Only print where the config file is read from
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_logging(verbose: bool) {
    if verbose {
        env_logger::Builder::from_env(env_logger::Env::default())
            .filter_level(log::LevelFilter::Info)
            .filter_module("anidb_identify_core", log::LevelFilter::Debug)
            .filter_module("anidb_identify_cli", log::LevelFilter::Debug)
            .filter_module("anidb_identify", log::LevelFilter::Debug)
            .format_timestamp_millis()
            .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let mut overrides = CliOverrides::default();
    overrides.storage.database_path = cli.database.clone();

    match cli.command {
        Commands::Hash {
            discovery,
            hasher,
            format,
        } => {
            apply_hasher_args(&mut overrides, &hasher);
            let config = loader.load(&overrides)?;
            let files = discovery.discover()?;
            if files.is_empty() {
                eprintln!("{}", "No matching files found.".yellow());
                return Ok(());
            }
            let run = commands::hash_files(&files, &config.hasher, discovery.show_progress()).await?;
            commands::print_hash_run(&run, format)?;
            if !run.failed.is_empty() {
                bail!("{} file(s) could not be hashed", run.failed.len());
            }
            if !run.stopped.is_empty() {
                bail!("Interrupted before every file was hashed");
            }
        }
        Commands::Identify {
            discovery,
            hasher,
            add,
            viewed,
            storage,
            state,
            details,
            user,
        } => {
            apply_hasher_args(&mut overrides, &hasher);
            overrides.protocol.username = user;
            let config = loader.load(&overrides)?;
            let files = discovery.discover()?;
            if files.is_empty() {
                eprintln!("{}", "No matching files found.".yellow());
                return Ok(());
            }
            let paths: Vec<PathBuf> = files.into_iter().map(|file| file.path).collect();
            let options = IdentifyOptions {
                add_to_mylist: add,
                viewed: viewed.map(Viewed::from_one_based).unwrap_or_default(),
                storage,
                state,
                fetch_details: details,
            };
            let summary =
                commands::identify(&config, &paths, &options, discovery.show_progress()).await?;
            commands::print_summary(&summary);
        }
        Commands::Status { json } => {
            let config = loader.load(&overrides)?;
            let report = commands::collect_status(&config.storage.database_path).await?;
            commands::print_status(&report, json)?;
        }
        Commands::Config { path } => {
            if path {
                println!("{}", loader.config_path().display());
            } else {
                let config = loader.load(&overrides)?;
                eprintln!("# {}", loader.config_path().display());
                print!("{}", config::render(&config)?);
            }
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
        }
    }

    Ok(())
}

fn apply_hasher_args(overrides: &mut CliOverrides, hasher: &HasherArgs) {
    overrides.hasher.max_threads = hasher.threads;
    if hasher.serialize_io {
        overrides.hasher.serialize_io = Some(true);
    }
}
