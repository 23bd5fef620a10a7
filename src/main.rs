use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use weather_lstm::config::PipelineConfig;
use weather_lstm::pipeline::{run_preprocess, run_training};

#[derive(Parser)]
#[command(name = "weather-lstm", author, version, about = "Clean weather observations and train a daily temperature forecaster", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a raw observation export into a processed CSV
    Preprocess {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// JSON pipeline configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Train the forecaster on a processed CSV
    Train {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Where to write the best checkpoint (.json for JSON, otherwise binary)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        /// Write the training loss curve to this SVG file
        #[arg(long)]
        plot: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Preprocess { input, output, config } => {
            let config = load_config(config.as_ref())?;
            let table = run_preprocess(&input, &output, &config.preprocess)
                .with_context(|| format!("preprocessing {}", input.display()))?;
            info!("Processed {} rows into {}", table.num_rows(), output.display());
        }
        Commands::Train { input, config, checkpoint, plot } => {
            let config = load_config(config.as_ref())?;
            let report = run_training(&input, &config, checkpoint.as_deref(), plot.as_deref())
                .with_context(|| format!("training on {}", input.display()))?;
            info!(
                "Trained for {} epochs on {} windows; final loss {:.6}",
                report.history.len(),
                report.train_windows,
                report.history.last().map_or(f64::NAN, |m| m.train_loss)
            );
            if let Some(loss) = report.test_loss {
                info!("Held-out loss on {} windows: {:.6}", report.test_windows, loss);
            }
        }
    }
    Ok(())
}
