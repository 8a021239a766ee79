//! Pool de connexions PostgreSQL

use anyhow::{Context, Result};
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime, Timeouts};
use std::time::Duration;
use tokio_postgres::NoTls;
use tokio_postgres_rustls::MakeRustlsConnect;

/// Mode SSL pour la connexion PostgreSQL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    /// Pas de SSL (défaut)
    #[default]
    Disable,
    /// SSL préféré mais non requis
    Prefer,
    /// SSL requis
    Require,
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" | "off" | "false" | "no" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" | "on" | "true" | "yes" => Ok(SslMode::Require),
            _ => Err(format!("Invalid SSL mode: {}. Use: disable, prefer, require", s)),
        }
    }
}

/// Configuration de la base de données
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    pub pool_size: usize,
    pub ssl_mode: SslMode,
    /// Délai d'attente d'une connexion libre
    pub wait_timeout: Duration,
    /// Délai d'établissement d'une nouvelle connexion
    pub connect_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            dbname: "mariupol_toponyms".into(),
            user: "mariupol_researcher".into(),
            password: None,
            pool_size: 4,
            ssl_mode: SslMode::Disable,
            wait_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl DatabaseConfig {
    /// Charge la configuration depuis les variables d'environnement
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: var("PGHOST").unwrap_or(defaults.host),
            port: var("PGPORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            dbname: var("PGDATABASE")
                .or_else(|| var("DB_NAME"))
                .unwrap_or(defaults.dbname),
            user: var("PGUSER")
                .or_else(|| var("DB_USER"))
                .unwrap_or(defaults.user),
            password: var("PGPASSWORD").or_else(|| var("DB_PASSWORD")),
            pool_size: var("POOL_SIZE")
                .and_then(|s| s.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.pool_size),
            ssl_mode: var("PGSSLMODE")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            wait_timeout: defaults.wait_timeout,
            connect_timeout: var("PGCONNECT_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
        }
    }

    /// Forme affichable sans mot de passe
    pub fn describe(&self) -> String {
        format!(
            "{}@{}:{}/{} (SSL: {:?})",
            self.user, self.host, self.port, self.dbname, self.ssl_mode
        )
    }
}

/// Crée la configuration TLS pour rustls
fn make_tls_connector() -> MakeRustlsConnect {
    let root_store = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    MakeRustlsConnect::new(config)
}

/// Crée un pool de connexions borné.
///
/// Aucune connexion n'est ouverte ici: la première est établie à la
/// première acquisition.
pub fn create_pool(config: &DatabaseConfig) -> Result<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.dbname.clone());
    cfg.user = Some(config.user.clone());
    cfg.password = config.password.clone();
    cfg.connect_timeout = Some(config.connect_timeout);

    cfg.pool = Some(PoolConfig {
        max_size: config.pool_size,
        timeouts: Timeouts {
            wait: Some(config.wait_timeout),
            create: Some(config.connect_timeout),
            recycle: Some(Duration::from_secs(30)),
        },
        ..Default::default()
    });

    match config.ssl_mode {
        SslMode::Disable => cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create database pool"),
        SslMode::Prefer | SslMode::Require => cfg
            .create_pool(Some(Runtime::Tokio1), make_tls_connector())
            .context("Failed to create database pool with TLS"),
    }
}
