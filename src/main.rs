//! Block VFS - A memory-resident virtual file system.
//!
//! Runs command scripts against a fresh in-memory space backed by a fixed
//! block pool.

use anyhow::{anyhow, Context, Result};
use block_vfs::shell::Shell;
use block_vfs::{Space, SpaceConfig};
use clap::{ArgAction, Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "block-vfs")]
#[command(author, version, about, long_about = None)]
#[command(
    about = "Memory-resident virtual file system over a block pool",
    long_about = "A VFS that keeps directories, files and symbolic links in a fixed pool of blocks, driven by line-oriented scripts."
)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Block size in bytes (overrides the configuration file)
    #[arg(long, global = true)]
    block_size: Option<usize>,

    /// Number of blocks in the pool (overrides the configuration file)
    #[arg(long, global = true)]
    blocks: Option<usize>,

    /// More log output (-v info, -vv debug, -vvv trace); RUST_LOG wins
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script against a fresh space
    Run {
        /// Script file (default: stdin)
        script: Option<PathBuf>,

        /// Print space information when the script finishes
        #[arg(long)]
        info: bool,
    },

    /// Show the effective configuration and capacity
    Info {
        /// Print the configuration as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Commands::Run { script, info } => cmd_run(config, script, info),
        Commands::Info { json } => cmd_info(&config, json),
    }
}

fn load_config(cli: &Cli) -> Result<SpaceConfig> {
    let mut config = match &cli.config {
        Some(path) => SpaceConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => SpaceConfig::default(),
    };
    if let Some(block_size) = cli.block_size {
        config.block_size = block_size;
    }
    if let Some(blocks) = cli.blocks {
        config.block_count = blocks;
    }
    config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

fn cmd_run(config: SpaceConfig, script: Option<PathBuf>, show_info: bool) -> Result<()> {
    let space = Space::new(config)?;
    let mut shell = Shell::new(space);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let executed = match &script {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
            shell.run_script(BufReader::new(file), &mut out)?
        }
        None => shell.run_script(io::stdin().lock(), &mut out)?,
    };
    out.flush()?;
    info!(commands = executed, "script finished");

    if show_info {
        print_info(shell.space())?;
    }
    Ok(())
}

fn cmd_info(config: &SpaceConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("Block VFS Configuration");
    println!("=======================");
    println!("Block size:       {} bytes", config.block_size);
    println!("Block count:      {}", config.block_count);
    println!("Scratch size:     {} bytes", config.scratch_size);
    println!("Capacity:         {} bytes", config.capacity());

    Ok(())
}

fn print_info(space: &Space) -> Result<()> {
    let info = space.info()?;

    println!();
    println!("Block VFS Information");
    println!("=====================");
    println!("Block size:       {} bytes", info.usage.block_size);
    println!();
    println!("Capacity:");
    println!("  Total:          {} bytes", info.usage.total_bytes());
    println!("  Used:           {} bytes", info.usage.used_bytes());
    println!("  Available:      {} bytes", info.usage.free_bytes());
    println!();
    println!("Contents:");
    println!("  Directories:    {}", info.directory_count);
    println!("  Files:          {}", info.file_count);
    println!("  Links:          {}", info.link_count);
    println!("  Total size:     {} bytes", info.total_file_size);

    Ok(())
}
