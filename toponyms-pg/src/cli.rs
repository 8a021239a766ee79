//! Définition et implémentation des commandes CLI
//!
//! - `verify-system`: connexion, PostGIS et tables du schéma
//! - `extract`: historique → journal filtré (sans base)
//! - `load`: historique ou journal → PostGIS avec versioning

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use clap::{Args, Subcommand};
use tracing::info;

use toponyms_pg::config::parse_instant;
use toponyms_pg::{
    DatabaseConfig, EntitySink, LoadOptions, Period, PipelineConfig, PostgresSink, StoreClient,
};

#[derive(Subcommand)]
pub enum Commands {
    /// Check database connectivity, PostGIS and the toponym tables
    VerifySystem {
        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Write the in-scope versions of a history file to a filtered change log
    Extract {
        /// History file (.osh.pbf) or change log (.jsonl[.bz2])
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for <region>-<period>.osh.jsonl
        #[arg(short, long)]
        output_dir: PathBuf,

        #[command(flatten)]
        period: PeriodArgs,

        /// Compress the change log with bzip2
        #[arg(long)]
        bz2: bool,
    },

    /// Load toponyms into PostGIS with temporal versioning
    Load {
        /// History file (.osh.pbf) or change log (.jsonl[.bz2])
        #[arg(short, long)]
        file: PathBuf,

        /// Validity start for every loaded version (YYYY-MM-DD, default: version timestamp)
        #[arg(long)]
        query_date: Option<String>,

        #[command(flatten)]
        period: PeriodArgs,

        /// Save the load report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        db: DatabaseArgs,
    },
}

/// Période à retenir (une seule option à la fois)
#[derive(Args, Debug, Clone, Default)]
#[group(multiple = false)]
pub struct PeriodArgs {
    /// Versions at or before the configured cutoff
    #[arg(long)]
    pre_cutoff: bool,

    /// Versions after the configured cutoff
    #[arg(long)]
    post_cutoff: bool,

    /// Versions at or before a custom instant (RFC 3339, e.g. 2022-03-01T00:00:00Z)
    #[arg(long, value_name = "TIMESTAMP")]
    custom: Option<String>,

    /// Complete history
    #[arg(long)]
    full: bool,
}

impl PeriodArgs {
    /// Période choisie, `None` si aucune option n'est passée
    fn period(&self) -> Result<Option<Period>> {
        Ok(if self.pre_cutoff {
            Some(Period::PreCutoff)
        } else if self.post_cutoff {
            Some(Period::PostCutoff)
        } else if let Some(custom) = &self.custom {
            Some(Period::Custom(parse_instant(custom)?))
        } else if self.full {
            Some(Period::Full)
        } else {
            None
        })
    }
}

/// Surcharges de connexion (défaut: variables PG* / .env)
#[derive(Args, Debug, Clone, Default)]
pub struct DatabaseArgs {
    /// PostgreSQL host (défaut : env PGHOST / localhost)
    #[arg(long)]
    host: Option<String>,

    /// PostgreSQL port (défaut : env PGPORT / 5432)
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL database name (défaut : env PGDATABASE / mariupol_toponyms)
    #[arg(long)]
    database: Option<String>,

    /// PostgreSQL user (défaut : env PGUSER / mariupol_researcher)
    #[arg(long)]
    user: Option<String>,

    /// PostgreSQL password (défaut : env PGPASSWORD)
    #[arg(long)]
    password: Option<String>,

    /// SSL mode: disable, prefer, require (défaut : env PGSSLMODE / disable)
    #[arg(long)]
    ssl: Option<String>,

    /// Target PostgreSQL schema (défaut : configuration / toponyms)
    #[arg(long)]
    schema: Option<String>,
}

/// Vérifie que la base est prête à recevoir un chargement
pub async fn cmd_verify_system(config_arg: &str, db: DatabaseArgs) -> Result<()> {
    let config = load_pipeline_config(config_arg, db.schema.clone())?;
    let db_config = database_config(&db);

    println!("=== Verify system ===");
    println!("Database: {}", db_config.describe());
    println!("Schema: {}", config.schema);

    let client = StoreClient::connect(&db_config, config.retry.clone(), &config.schema)?;
    let status = client
        .verify()
        .await
        .context("Connection stage failed")?;

    println!("Connected to PostgreSQL");
    println!("Server: {}", status.server_version);
    println!("PostGIS: {}", status.postgis_version);

    if !status.is_ready() {
        anyhow::bail!(
            "Schema '{}' is missing tables: {}",
            status.schema,
            status.missing_tables.join(", ")
        );
    }

    println!("System ready");
    Ok(())
}

/// Écrit le journal filtré d'une période
pub fn cmd_extract(
    config_arg: &str,
    input: &Path,
    output_dir: &Path,
    period: PeriodArgs,
    bz2: bool,
) -> Result<()> {
    let config = load_pipeline_config(config_arg, None)?;
    let period = period.period()?.context(
        "Choose a period: --pre-cutoff, --post-cutoff, --custom TIMESTAMP or --full",
    )?;

    println!("=== Extract {} ===", period.label());
    println!("Input: {}", input.display());
    println!("Region: {}", config.region);
    println!(
        "Bounding box: {},{},{},{}",
        config.bbox.min_lat, config.bbox.min_lon, config.bbox.max_lat, config.bbox.max_lon
    );
    if let Some(cutoff) = config.cutoff {
        println!("Cutoff: {}", cutoff.to_rfc3339());
    }

    let report = toponyms_pg::extract(input, &config, period, output_dir, bz2)?;
    report.display();
    Ok(())
}

/// Charge un fichier dans PostGIS
pub async fn cmd_load(
    config_arg: &str,
    file: &Path,
    query_date: Option<String>,
    period: PeriodArgs,
    report_path: Option<PathBuf>,
    db: DatabaseArgs,
) -> Result<()> {
    let config = load_pipeline_config(config_arg, db.schema.clone())?;

    let query_date = query_date.as_deref().map(parse_query_date).transpose()?;
    let period = period.period()?.unwrap_or(Period::Full);
    let mode = period.temporal_mode(config.cutoff)?;

    let db_config = database_config(&db);

    println!("=== Load {} ===", period.label());
    println!("File: {}", file.display());
    println!("Schema: {}", config.schema);
    println!("Batch size: {}", config.batch_size);
    match query_date {
        Some(date) => println!("Query date: {}", date.format("%Y-%m-%d")),
        None => println!("Query date: version timestamps"),
    }
    println!("Database: {}", db_config.describe());

    let client = StoreClient::connect(&db_config, config.retry.clone(), &config.schema)?;
    let conn = client
        .acquire()
        .await
        .context("Connection stage failed")?;
    drop(conn);
    println!("Connected to PostgreSQL");

    let mut sink = PostgresSink::new(client, config.provenance.clone()).await;
    info!(
        schema = sink.client().schema(),
        supported_types = sink.supported_types().len(),
        "Store ready"
    );

    let options = LoadOptions {
        mode,
        label: period.label(),
        query_date,
    };
    let report = toponyms_pg::load(file, &config, &options, &mut sink).await?;
    report.display();

    if let Some(path) = report_path {
        report
            .save_to_file(&path)
            .with_context(|| format!("Failed to save report: {}", path.display()))?;
        println!("Report saved to {}", path.display());
    }

    if let Some(fatal) = report.fatal_error() {
        anyhow::bail!("{}", fatal.message);
    }

    Ok(())
}

/// Configuration du pipeline, surcharges d'environnement et de schéma appliquées
fn load_pipeline_config(config_arg: &str, schema: Option<String>) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::resolve(config_arg)?;
    config.apply_env()?;
    if let Some(schema) = schema {
        config.schema = schema;
        config.validate()?;
    }
    Ok(config)
}

fn database_config(db: &DatabaseArgs) -> DatabaseConfig {
    let mut config = DatabaseConfig::from_env();
    apply_database_overrides(
        &mut config,
        db.host.clone(),
        db.database.clone(),
        db.user.clone(),
        db.password.clone(),
        db.port,
        db.ssl.clone(),
    );
    config
}

fn apply_database_overrides(
    config: &mut DatabaseConfig,
    host: Option<String>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    port: Option<u16>,
    ssl: Option<String>,
) {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(database) = database {
        config.dbname = database;
    }
    if let Some(user) = user {
        config.user = user;
    }
    if let Some(password) = password {
        config.password = Some(password);
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(ssl) = ssl {
        if let Ok(mode) = ssl.parse() {
            config.ssl_mode = mode;
        }
    }
}

/// Date de requête `YYYY-MM-DD`, à minuit UTC
fn parse_query_date(date: &str) -> Result<DateTime<Utc>> {
    let parsed = match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(parsed) if date.len() == 10 => parsed,
        _ => anyhow::bail!(
            "Invalid date format: '{}'. Expected YYYY-MM-DD (e.g., 2022-02-23)",
            date
        ),
    };

    if !(2004..=2100).contains(&parsed.year()) {
        anyhow::bail!("Year out of range: {}", parsed.year());
    }

    Ok(parsed.and_time(NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use toponyms_pg::store::SslMode;

    #[test]
    fn test_parse_query_date_valid() {
        assert_eq!(
            parse_query_date("2022-02-23").unwrap(),
            parse_instant("2022-02-23T00:00:00Z").unwrap()
        );
        assert!(parse_query_date("2022-12-31").is_ok());
        assert!(parse_query_date("2004-01-01").is_ok());
    }

    #[test]
    fn test_parse_query_date_invalid() {
        assert!(parse_query_date("2022-02").is_err());
        assert!(parse_query_date("2022-2-23").is_err());
        assert!(parse_query_date("2022/02/23").is_err());
        assert!(parse_query_date("23-02-2022").is_err());
        assert!(parse_query_date("2022-02-23T00:00:00Z").is_err());
        assert!(parse_query_date("").is_err());
    }

    #[test]
    fn test_parse_query_date_ranges() {
        assert!(parse_query_date("2022-00-10").is_err());
        assert!(parse_query_date("2022-13-10").is_err());
        assert!(parse_query_date("2022-02-00").is_err());
        assert!(parse_query_date("2022-02-30").is_err());
        assert!(parse_query_date("1999-02-10").is_err());
        assert!(parse_query_date("2101-01-01").is_err());
    }

    #[test]
    fn test_parse_query_date_multibyte_input() {
        assert!(parse_query_date("2022-1é-0").is_err());
        assert!(parse_query_date("２０２２-02-23").is_err());
        assert!(parse_query_date("2022-02-2é").is_err());
    }

    #[test]
    fn test_period_args() {
        assert_eq!(PeriodArgs::default().period().unwrap(), None);

        let pre = PeriodArgs {
            pre_cutoff: true,
            ..Default::default()
        };
        assert_eq!(pre.period().unwrap(), Some(Period::PreCutoff));

        let custom = PeriodArgs {
            custom: Some("2022-03-01T00:00:00Z".into()),
            ..Default::default()
        };
        assert_eq!(
            custom.period().unwrap(),
            Some(Period::Custom(parse_instant("2022-03-01").unwrap()))
        );

        let bad = PeriodArgs {
            custom: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(bad.period().is_err());
    }

    #[test]
    fn test_apply_database_overrides() {
        let mut config = DatabaseConfig::default();
        apply_database_overrides(
            &mut config,
            Some("db.example".into()),
            None,
            Some("loader".into()),
            Some("secret".into()),
            Some(6543),
            Some("require".into()),
        );

        assert_eq!(config.host, "db.example");
        assert_eq!(config.dbname, "mariupol_toponyms");
        assert_eq!(config.user, "loader");
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.port, 6543);
        assert_eq!(config.ssl_mode, SslMode::Require);
    }

    #[test]
    fn test_invalid_ssl_override_is_ignored() {
        let mut config = DatabaseConfig::default();
        apply_database_overrides(&mut config, None, None, None, None, None, Some("bogus".into()));
        assert_eq!(config.ssl_mode, SslMode::Disable);
    }

    #[test]
    fn test_schema_override() {
        let config = load_pipeline_config("mariupol", Some("staging".into())).unwrap();
        assert_eq!(config.schema, "staging");
        assert!(load_pipeline_config("mariupol", Some("bad;name".into())).is_err());
    }
}
