//! Client de stockage: pool borné, retry des erreurs transitoires, lots transactionnels

use deadpool_postgres::{Object, Pool};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::StoreError;
use super::pool::{create_pool, DatabaseConfig};
use super::retry::RetryPolicy;
use super::transaction::{BatchOutcome, BatchTransaction};
use crate::classify::SupportedTypes;
use crate::config::Provenance;
use crate::versioning::{apply_change, EntityChange};

/// Tables attendues dans le schéma cible
pub const REQUIRED_TABLES: [&str; 3] = ["entity_types", "entities", "names"];

/// État de la base rapporté par `verify-system`
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub server_version: String,
    pub postgis_version: String,
    pub schema: String,
    pub missing_tables: Vec<String>,
}

impl SystemStatus {
    pub fn is_ready(&self) -> bool {
        self.missing_tables.is_empty()
    }
}

pub struct StoreClient {
    pool: Pool,
    retry: RetryPolicy,
    schema: String,
}

impl StoreClient {
    pub fn new(pool: Pool, retry: RetryPolicy, schema: impl Into<String>) -> Self {
        Self {
            pool,
            retry,
            schema: schema.into(),
        }
    }

    /// Crée le pool puis le client
    pub fn connect(
        config: &DatabaseConfig,
        retry: RetryPolicy,
        schema: impl Into<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(create_pool(config)?, retry, schema))
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Connexion du pool, rendue au drop quel que soit le chemin de sortie
    pub async fn acquire(&self) -> Result<Object, StoreError> {
        let pool = &self.pool;
        self.retry
            .run("acquire connection", move || async move {
                pool.get().await.map_err(StoreError::from)
            })
            .await
    }

    /// Vérifie la connexion, PostGIS et la présence des tables
    pub async fn verify(&self) -> Result<SystemStatus, StoreError> {
        let client = self.acquire().await?;

        let row = client
            .query_one("SELECT version(), PostGIS_version()", &[])
            .await?;
        let server_version: String = row.get(0);
        let postgis_version: String = row.get(1);

        let mut missing_tables = Vec::new();
        for table in REQUIRED_TABLES {
            let found = client
                .query_opt(
                    "SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2",
                    &[&self.schema, &table],
                )
                .await?;
            if found.is_none() {
                missing_tables.push(table.to_string());
            }
        }

        Ok(SystemStatus {
            server_version,
            postgis_version,
            schema: self.schema.clone(),
            missing_tables,
        })
    }

    /// Types présents dans `entity_types`; toute la taxonomie si la lecture échoue
    pub async fn supported_types(&self) -> SupportedTypes {
        match self.load_type_codes().await {
            Ok(codes) if !codes.is_empty() => {
                let supported = SupportedTypes::from_codes(codes.iter().map(String::as_str));
                debug!(count = supported.len(), "Supported entity types loaded");
                supported
            }
            Ok(_) => {
                warn!("entity_types is empty, accepting the whole taxonomy");
                SupportedTypes::all()
            }
            Err(e) => {
                warn!(error = %e, "Could not read entity_types, accepting the whole taxonomy");
                SupportedTypes::all()
            }
        }
    }

    async fn load_type_codes(&self) -> Result<Vec<String>, StoreError> {
        let client = self.acquire().await?;
        let rows = client
            .query(
                &format!("SELECT type_code FROM {}.entity_types", self.schema),
                &[],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    /// Écrit un lot dans une transaction, rejouée sur erreur transitoire
    pub async fn write_batch(
        &self,
        batch: &[EntityChange],
        provenance: &Provenance,
    ) -> Result<BatchOutcome, StoreError> {
        let outcome = self
            .retry
            .run("write batch", move || async move {
                self.write_once(batch, provenance).await
            })
            .await?;

        info!(
            written = outcome.written.len(),
            failed = outcome.failures.len(),
            "Batch flushed"
        );
        Ok(outcome)
    }

    async fn write_once(
        &self,
        batch: &[EntityChange],
        provenance: &Provenance,
    ) -> Result<BatchOutcome, StoreError> {
        let mut client = self.pool.get().await?;
        let mut tx = BatchTransaction::begin(&mut client).await?;

        for change in batch {
            tx.begin_item().await?;
            match apply_change(tx.transaction(), &self.schema, change, provenance).await {
                Ok(outcome) => tx.complete_item(change, outcome).await?,
                Err(e) if e.is_transient() => {
                    tx.rollback(&e.to_string()).await;
                    return Err(e);
                }
                Err(e) => tx.fail_item(change, &e).await?,
            }
        }

        tx.commit().await
    }
}
