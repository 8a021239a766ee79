//! Point d'entrée CLI pour toponyms-pg

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::Commands;

/// Charge le premier `.env` trouvé: répertoire courant, puis celui du binaire
fn load_env() -> Option<PathBuf> {
    if let Ok(path) = dotenvy::dotenv() {
        return Some(path);
    }
    let path = std::env::current_exe().ok()?.parent()?.join(".env");
    dotenvy::from_path(&path).ok().map(|_| path)
}

/// Charger les toponymes d'un historique OpenStreetMap dans PostGIS
#[derive(Parser)]
#[command(name = "toponyms-pg")]
#[command(author, version)]
#[command(about = "Charger les toponymes d'un historique OpenStreetMap dans PostGIS avec versioning temporel")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Preset (mariupol) ou chemin vers une configuration JSON
    #[arg(long, global = true, default_value = "mariupol")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_file = load_env();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    if let Some(path) = env_file {
        debug!(path = %path.display(), "Loaded environment file");
    }

    match cli.command {
        Commands::VerifySystem { db } => {
            info!("Verifying database");
            cli::cmd_verify_system(&cli.config, db).await?;
        }
        Commands::Extract {
            input,
            output_dir,
            period,
            bz2,
        } => {
            info!(input = %input.display(), output_dir = %output_dir.display(), "Extracting change log");
            cli::cmd_extract(&cli.config, &input, &output_dir, period, bz2)?;
        }
        Commands::Load {
            file,
            query_date,
            period,
            report,
            db,
        } => {
            info!(file = %file.display(), "Loading toponyms into PostGIS");
            cli::cmd_load(&cli.config, &file, query_date, period, report, db).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    // Le pilote PostgreSQL reste discret sauf en -vv
    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if verbose < 2 {
        for noisy in ["tokio_postgres=warn", "deadpool_postgres=warn", "rustls=warn"] {
            if let Ok(directive) = noisy.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    fmt()
        .with_env_filter(filter)
        .with_target(verbose > 0)
        .with_writer(std::io::stderr)
        .init();
}
