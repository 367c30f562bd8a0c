//! Tandem CLI
//!
//! Swap the contents of the lowest- and highest-numbered log files in a
//! directory, in place.

mod config;
mod progress;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tandem_core::{SwapError, Swapper, find_extremes};

use config::Config;
use progress::{SwapProgressBar, format_bytes, format_duration};

/// Tandem - swap two files in place, block by block
#[derive(Parser)]
#[command(name = "tandem")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "configs/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Swap the min- and max-numbered files in a directory
    Swap {
        /// Directory holding the candidate files
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Accept negative file names (-<digits>.log)
        #[arg(long)]
        neg: bool,

        /// Read block size in bytes
        #[arg(long)]
        rbs: Option<usize>,

        /// Write block size in bytes
        #[arg(long)]
        wbs: Option<usize>,

        /// Sink queue capacity in blocks
        #[arg(long)]
        queue_depth: Option<usize>,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Print the files a swap would select
    Locate {
        /// Directory holding the candidate files
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Accept negative file names (-<digits>.log)
        #[arg(long)]
        neg: bool,
    },

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration; init-config writes one, so it starts from defaults
    let mut config = match cli.command {
        Commands::InitConfig { .. } => Config::default(),
        _ => Config::load_or_default(&cli.config)?,
    };

    // Initialize logging; an unknown level is rejected by validate() below
    let level = if cli.verbose {
        "debug"
    } else {
        config.log_level().unwrap_or("info")
    };
    tracing_subscriber::fmt().with_env_filter(level).init();
    if !matches!(cli.command, Commands::InitConfig { .. }) {
        if cli.config.exists() {
            tracing::debug!("Loaded configuration from {:?}", cli.config);
        } else {
            tracing::debug!("No config at {:?}, using defaults", cli.config);
        }
    }

    match cli.command {
        Commands::Swap {
            dir,
            neg,
            rbs,
            wbs,
            queue_depth,
            no_progress,
        } => {
            apply_overrides(&mut config, dir, neg);
            if let Some(rbs) = rbs {
                config.swap.read_block_size = rbs;
            }
            if let Some(wbs) = wbs {
                config.swap.write_block_size = wbs;
            }
            if let Some(depth) = queue_depth {
                config.swap.queue_depth = depth;
            }
            config.validate()?;
            run_swap(&config, no_progress).await?;
        }
        Commands::Locate { dir, neg } => {
            apply_overrides(&mut config, dir, neg);
            config.validate()?;
            locate(&config)?;
        }
        Commands::InitConfig { force } => {
            init_config(&cli.config, force)?;
        }
    }

    Ok(())
}

/// Apply the directory and sign flags shared by `swap` and `locate`
fn apply_overrides(config: &mut Config, dir: Option<PathBuf>, neg: bool) {
    if let Some(dir) = dir {
        config.files.path_to_files = dir;
    }
    if neg {
        config.files.allow_negative_names = true;
    }
}

/// Select the min/max files and print them
fn locate(config: &Config) -> anyhow::Result<(PathBuf, PathBuf)> {
    let dir = &config.files.path_to_files;
    let (min, max) = find_extremes(dir, config.files.allow_negative_names)?;

    println!("File with min value: [{min}], File with max value: [{max}].");

    Ok((dir.join(min), dir.join(max)))
}

/// Locate the two files and swap them
async fn run_swap(config: &Config, no_progress: bool) -> anyhow::Result<()> {
    let (path_min, path_max) = locate(config)?;

    tracing::info!(
        "Swapping {:?} and {:?} (read block {}, write block {}, queue depth {})",
        path_min,
        path_max,
        config.swap.read_block_size,
        config.swap.write_block_size,
        config.swap.queue_depth
    );

    let bar = if no_progress {
        SwapProgressBar::hidden()
    } else {
        let total = file_len(&path_min) + file_len(&path_max);
        let label = format!("{} <-> {}", name_of(&path_min), name_of(&path_max));
        SwapProgressBar::new(total, &label)
    };

    let swapper = {
        let bar = bar.clone();
        Swapper::new(config.swap_config())?.with_progress(move |progress| bar.update(progress))
    };

    let started = Instant::now();
    match swapper.swap(&path_min, &path_max).await {
        Ok(report) => {
            let elapsed = started.elapsed();
            bar.finish_with_message(format!(
                "Swapped {} in {} rounds",
                format_bytes(report.bytes_from_a + report.bytes_from_b),
                report.rounds
            ));

            if !report.reconciled {
                tracing::warn!("File lengths could not be restored; trailing bytes may remain");
            }

            println!("The files was successfully swapped.");
            println!(
                "  {}: {} -> {}",
                name_of(&path_min),
                format_bytes(report.original_size_a),
                format_bytes(report.original_size_b)
            );
            println!(
                "  {}: {} -> {}",
                name_of(&path_max),
                format_bytes(report.original_size_b),
                format_bytes(report.original_size_a)
            );
            println!("Exec time: {}", format_duration(elapsed));
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            report_failure(&e);
            std::process::exit(1);
        }
    }
}

/// Print a swap failure tagged with the stage that raised it
fn report_failure(err: &SwapError) {
    tracing::error!("Swap failed: {}", err);
    eprintln!("{} error: {}", err.stage(), err);
}

/// Write a default config to `path`
fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_swap_flags() {
        let cli = Cli::parse_from([
            "tandem", "swap", "--dir", "/tmp/logs", "--neg", "--rbs", "64", "--wbs", "32",
        ]);
        match cli.command {
            Commands::Swap {
                dir,
                neg,
                rbs,
                wbs,
                queue_depth,
                no_progress,
            } => {
                assert_eq!(dir, Some(PathBuf::from("/tmp/logs")));
                assert!(neg);
                assert_eq!(rbs, Some(64));
                assert_eq!(wbs, Some(32));
                assert_eq!(queue_depth, None);
                assert!(!no_progress);
            }
            _ => panic!("expected swap"),
        }
        assert_eq!(cli.config, PathBuf::from("configs/config.toml"));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        apply_overrides(&mut config, Some(PathBuf::from("elsewhere")), true);
        assert_eq!(config.files.path_to_files, PathBuf::from("elsewhere"));
        assert!(config.files.allow_negative_names);

        // Absent flags keep configured values
        apply_overrides(&mut config, None, false);
        assert_eq!(config.files.path_to_files, PathBuf::from("elsewhere"));
        assert!(config.files.allow_negative_names);
    }

    #[test]
    fn test_locate_joins_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("3.log"), b"x").unwrap();
        std::fs::write(dir.path().join("10.log"), b"y").unwrap();

        let mut config = Config::default();
        config.files.path_to_files = dir.path().to_path_buf();

        let (min, max) = locate(&config).unwrap();
        assert_eq!(min, dir.path().join("3.log"));
        assert_eq!(max, dir.path().join("10.log"));
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();
        assert!(Config::load(&path).is_ok());
    }
}
