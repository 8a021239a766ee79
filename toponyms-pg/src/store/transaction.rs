//! Transaction de lot avec isolation par primitive
//!
//! Chaque primitive est écrite sous un point de sauvegarde: un échec annule
//! uniquement ses écritures, le reste du lot est commité normalement.

use deadpool_postgres::{Object, Transaction};
use serde::Serialize;
use tracing::{debug, error, warn};

use super::error::StoreError;
use crate::classify::EntityType;
use crate::versioning::{EntityChange, ToponymOutcome};

const ITEM_SAVEPOINT: &str = "toponym_item";

/// Primitive écrite avec succès
#[derive(Debug, Clone)]
pub struct ItemWritten {
    pub osm_ref: String,
    pub entity_type: EntityType,
    pub outcome: ToponymOutcome,
}

/// Primitive dont l'écriture a été annulée
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub osm_ref: String,
    pub entity_type: EntityType,
    pub name: String,
    pub message: String,
}

/// Résultat d'un lot commité
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub written: Vec<ItemWritten>,
    pub failures: Vec<ItemFailure>,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.written.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transaction couvrant un lot de primitives
pub struct BatchTransaction<'a> {
    transaction: Transaction<'a>,
    outcome: BatchOutcome,
}

impl<'a> BatchTransaction<'a> {
    pub async fn begin(client: &'a mut Object) -> Result<Self, StoreError> {
        let transaction = client.transaction().await?;
        Ok(Self {
            transaction,
            outcome: BatchOutcome::default(),
        })
    }

    /// Transaction sous-jacente pour les requêtes
    pub fn transaction(&self) -> &Transaction<'a> {
        &self.transaction
    }

    /// Ouvre le point de sauvegarde de la primitive suivante
    pub async fn begin_item(&self) -> Result<(), StoreError> {
        self.transaction
            .batch_execute(&format!("SAVEPOINT {}", ITEM_SAVEPOINT))
            .await?;
        Ok(())
    }

    /// Valide les écritures de la primitive courante
    pub async fn complete_item(
        &mut self,
        change: &EntityChange,
        outcome: ToponymOutcome,
    ) -> Result<(), StoreError> {
        self.transaction
            .batch_execute(&format!("RELEASE SAVEPOINT {}", ITEM_SAVEPOINT))
            .await?;
        self.outcome.written.push(ItemWritten {
            osm_ref: change.osm_ref(),
            entity_type: change.entity_type(),
            outcome,
        });
        Ok(())
    }

    /// Annule les écritures de la primitive courante et poursuit le lot
    pub async fn fail_item(
        &mut self,
        change: &EntityChange,
        cause: &StoreError,
    ) -> Result<(), StoreError> {
        warn!(
            osm_type = %change.osm_type(),
            osm_id = change.osm_id(),
            version = change.osm_version(),
            name = %change.display_name(),
            error = %cause,
            "Primitive write rolled back"
        );

        self.transaction
            .batch_execute(&format!(
                "ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}",
                ITEM_SAVEPOINT
            ))
            .await?;

        self.outcome.failures.push(ItemFailure {
            osm_ref: change.osm_ref(),
            entity_type: change.entity_type(),
            name: change.display_name().to_string(),
            message: cause.to_string(),
        });
        Ok(())
    }

    pub async fn commit(self) -> Result<BatchOutcome, StoreError> {
        self.transaction.commit().await?;
        debug!(
            written = self.outcome.written.len(),
            failed = self.outcome.failures.len(),
            "Batch committed"
        );
        Ok(self.outcome)
    }

    /// Annule tout le lot (également fait implicitement au drop)
    pub async fn rollback(self, reason: &str) {
        warn!(
            reason = %reason,
            attempted = self.outcome.len(),
            "Rolling back batch"
        );
        if let Err(e) = self.transaction.rollback().await {
            error!(error = %e, "Explicit rollback failed (will rollback on drop anyway)");
        }
    }
}
