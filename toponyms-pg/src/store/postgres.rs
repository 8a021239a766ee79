//! Destination PostgreSQL/PostGIS du pipeline de chargement

use async_trait::async_trait;

use super::client::StoreClient;
use super::error::StoreError;
use super::transaction::BatchOutcome;
use crate::classify::SupportedTypes;
use crate::config::Provenance;
use crate::pipeline::EntitySink;
use crate::versioning::EntityChange;

pub struct PostgresSink {
    client: StoreClient,
    provenance: Provenance,
    supported: SupportedTypes,
}

impl PostgresSink {
    /// Lit les types supportés par la base avant le premier lot
    pub async fn new(client: StoreClient, provenance: Provenance) -> Self {
        let supported = client.supported_types().await;
        Self {
            client,
            provenance,
            supported,
        }
    }

    pub fn client(&self) -> &StoreClient {
        &self.client
    }
}

#[async_trait(?Send)]
impl EntitySink for PostgresSink {
    fn supported_types(&self) -> &SupportedTypes {
        &self.supported
    }

    async fn write_batch(&mut self, batch: &[EntityChange]) -> Result<BatchOutcome, StoreError> {
        self.client.write_batch(batch, &self.provenance).await
    }
}
