//! Upsert d'entités et de noms avec intervalles de validité
//!
//! Une entité est identifiée par sa clé naturelle `(osm_type, osm_id)`. Une
//! version dont la géométrie est inchangée réutilise l'entité courante; une
//! géométrie différente ferme l'entité courante et en ouvre une nouvelle.
//! Les noms suivent la même logique par couple (langue, nature). Une version
//! de suppression ferme l'entité courante et ses noms.

use chrono::{DateTime, Utc};
use deadpool_postgres::Transaction;
use geo::Geometry;
use osmhist::ElementKind;
use serde::Serialize;
use tracing::{debug, trace};
use wkb::geom_to_wkb;

use super::diff::hash_to_hex;
use super::temporal::{
    earliest_end, entity_to_close, names_to_close, plan_entity, plan_name, EntityPlan, Interval,
    NamePlan, StoredEntity, StoredName,
};
use crate::classify::EntityType;
use crate::config::Provenance;
use crate::names::DerivedName;
use crate::store::StoreError;

/// SRID des géométries chargées (WGS84)
pub const SRID: u32 = 4326;

/// Entité à insérer ou mettre à jour
#[derive(Debug, Clone)]
pub struct EntityUpsert {
    pub osm_type: ElementKind,
    pub osm_id: i64,
    pub osm_version: i32,
    pub entity_type: EntityType,
    pub geometry: Geometry<f64>,
    /// Hash de la géométrie pour comparaison
    pub geom_hash: [u8; 32],
    /// Début de validité de cette version
    pub valid_start: DateTime<Utc>,
    pub names: Vec<DerivedName>,
}

impl EntityUpsert {
    /// Référence lisible, ex. `way/1234 v5`
    pub fn osm_ref(&self) -> String {
        format!("{}/{} v{}", self.osm_type, self.osm_id, self.osm_version)
    }

    /// Premier nom, pour les journaux
    pub fn display_name(&self) -> &str {
        self.names.first().map(|n| n.text.as_str()).unwrap_or("")
    }
}

/// Suppression d'une primitive déjà chargée
#[derive(Debug, Clone)]
pub struct EntityDeletion {
    pub osm_type: ElementKind,
    pub osm_id: i64,
    pub osm_version: i32,
    /// Type de la dernière version chargée
    pub entity_type: EntityType,
    /// Fin de validité de l'entité et de ses noms
    pub deleted_at: DateTime<Utc>,
}

/// Écriture demandée pour une version de primitive
#[derive(Debug, Clone)]
pub enum EntityChange {
    Upsert(EntityUpsert),
    Delete(EntityDeletion),
}

impl EntityChange {
    pub fn osm_type(&self) -> ElementKind {
        match self {
            Self::Upsert(e) => e.osm_type,
            Self::Delete(d) => d.osm_type,
        }
    }

    pub fn osm_id(&self) -> i64 {
        match self {
            Self::Upsert(e) => e.osm_id,
            Self::Delete(d) => d.osm_id,
        }
    }

    pub fn osm_version(&self) -> i32 {
        match self {
            Self::Upsert(e) => e.osm_version,
            Self::Delete(d) => d.osm_version,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Upsert(e) => e.entity_type,
            Self::Delete(d) => d.entity_type,
        }
    }

    pub fn osm_ref(&self) -> String {
        format!("{}/{} v{}", self.osm_type(), self.osm_id(), self.osm_version())
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Upsert(e) => e.display_name(),
            Self::Delete(_) => "",
        }
    }
}

impl From<EntityUpsert> for EntityChange {
    fn from(entity: EntityUpsert) -> Self {
        Self::Upsert(entity)
    }
}

impl From<EntityDeletion> for EntityChange {
    fn from(deletion: EntityDeletion) -> Self {
        Self::Delete(deletion)
    }
}

/// Résultat d'un upsert d'entité
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertResult {
    /// Nouvelle entité insérée
    Inserted,
    /// Géométrie modifiée: entité courante fermée, nouvelle version ouverte
    Updated,
    /// Entité existante réutilisée
    Unchanged,
    /// Entité fermée par une suppression
    Closed,
}

/// Compteurs d'écriture des noms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NameCounts {
    pub inserted: usize,
    pub superseded: usize,
    pub closed: usize,
    pub unchanged: usize,
}

impl NameCounts {
    pub fn absorb(&mut self, other: NameCounts) {
        self.inserted += other.inserted;
        self.superseded += other.superseded;
        self.closed += other.closed;
        self.unchanged += other.unchanged;
    }
}

/// Résultat complet pour une primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToponymOutcome {
    /// Entité écrite ou fermée, `None` pour une suppression sans effet
    pub entity_id: Option<i64>,
    pub entity: UpsertResult,
    pub names: NameCounts,
}

/// Applique une écriture dans la transaction courante
pub async fn apply_change(
    tx: &Transaction<'_>,
    schema: &str,
    change: &EntityChange,
    provenance: &Provenance,
) -> Result<ToponymOutcome, StoreError> {
    match change {
        EntityChange::Upsert(entity) => upsert_entity(tx, schema, entity, provenance).await,
        EntityChange::Delete(deletion) => delete_entity(tx, schema, deletion).await,
    }
}

/// Insère ou met à jour une entité et ses noms.
///
/// Doit être appelé dans une transaction: en cas d'erreur, l'appelant
/// annule les écritures partielles de cette primitive.
pub async fn upsert_entity(
    tx: &Transaction<'_>,
    schema: &str,
    entity: &EntityUpsert,
    provenance: &Provenance,
) -> Result<ToponymOutcome, StoreError> {
    let at = entity.valid_start;
    let stored = load_entity_versions(tx, schema, entity.osm_type, entity.osm_id).await?;
    let plan = plan_entity(&stored, &entity.geom_hash, at);

    let (entity_id, result, entity_end) = match plan {
        EntityPlan::Insert { valid_end } => {
            let id = insert_entity(tx, schema, entity, provenance, valid_end).await?;
            debug!(osm = %entity.osm_ref(), entity_id = id, "New entity inserted");
            (id, UpsertResult::Inserted, valid_end)
        }
        EntityPlan::Reuse { entity_id } => {
            trace!(osm = %entity.osm_ref(), entity_id, "Entity unchanged");
            let end = stored
                .iter()
                .find(|e| e.entity_id == entity_id)
                .and_then(|e| e.interval.end);
            (entity_id, UpsertResult::Unchanged, end)
        }
        EntityPlan::Supersede {
            close_id,
            valid_end,
        } => {
            close_entity(tx, schema, close_id, at).await?;
            let id = insert_entity(tx, schema, entity, provenance, valid_end).await?;
            debug!(
                osm = %entity.osm_ref(),
                closed = close_id,
                entity_id = id,
                hash = %hash_to_hex(&entity.geom_hash),
                "Entity geometry superseded"
            );
            (id, UpsertResult::Updated, valid_end)
        }
    };

    let names = upsert_names(tx, schema, entity_id, entity_end, entity, provenance).await?;

    Ok(ToponymOutcome {
        entity_id: Some(entity_id),
        entity: result,
        names,
    })
}

/// Ferme l'entité valide à l'instant de suppression, ainsi que ses noms
pub async fn delete_entity(
    tx: &Transaction<'_>,
    schema: &str,
    deletion: &EntityDeletion,
) -> Result<ToponymOutcome, StoreError> {
    let at = deletion.deleted_at;
    let stored = load_entity_versions(tx, schema, deletion.osm_type, deletion.osm_id).await?;

    let Some(entity_id) = entity_to_close(&stored, at) else {
        trace!(osm_type = %deletion.osm_type, osm_id = deletion.osm_id, "Nothing to close");
        return Ok(ToponymOutcome {
            entity_id: None,
            entity: UpsertResult::Unchanged,
            names: NameCounts::default(),
        });
    };

    let closed = close_entity(tx, schema, entity_id, at).await?;
    debug!(
        osm_type = %deletion.osm_type,
        osm_id = deletion.osm_id,
        version = deletion.osm_version,
        entity_id,
        names = closed,
        "Entity closed by deletion"
    );

    Ok(ToponymOutcome {
        entity_id: Some(entity_id),
        entity: UpsertResult::Closed,
        names: NameCounts {
            closed,
            ..Default::default()
        },
    })
}

async fn upsert_names(
    tx: &Transaction<'_>,
    schema: &str,
    entity_id: i64,
    entity_end: Option<DateTime<Utc>>,
    entity: &EntityUpsert,
    provenance: &Provenance,
) -> Result<NameCounts, StoreError> {
    let at = entity.valid_start;
    let stored = load_names(tx, schema, entity_id).await?;
    let mut counts = NameCounts::default();

    for name in &entity.names {
        let slot: Vec<&StoredName> = stored
            .iter()
            .filter(|n| n.language == name.language && n.kind == name.kind.as_str())
            .collect();

        match plan_name(&slot, &name.text, at) {
            NamePlan::NoOp => counts.unchanged += 1,
            NamePlan::Insert { valid_end } => {
                let end = earliest_end(valid_end, entity_end);
                if insert_name(tx, schema, entity_id, name, at, end, entity, provenance).await? {
                    counts.inserted += 1;
                } else {
                    counts.unchanged += 1;
                }
            }
            NamePlan::Supersede {
                close_id,
                valid_end,
            } => {
                close_name(tx, schema, close_id, at).await?;
                let end = earliest_end(valid_end, entity_end);
                insert_name(tx, schema, entity_id, name, at, end, entity, provenance).await?;
                counts.superseded += 1;
            }
        }
    }

    let incoming: Vec<(String, String)> = entity
        .names
        .iter()
        .map(|n| (n.language.clone(), n.kind.as_str().to_string()))
        .collect();
    for name_id in names_to_close(&stored, &incoming, at) {
        close_name(tx, schema, name_id, at).await?;
        counts.closed += 1;
    }

    Ok(counts)
}

async fn load_entity_versions(
    tx: &Transaction<'_>,
    schema: &str,
    osm_type: ElementKind,
    osm_id: i64,
) -> Result<Vec<StoredEntity>, StoreError> {
    let query = format!(
        "SELECT entity_id, geometry_hash, valid_start, valid_end FROM {}.entities
         WHERE osm_type = $1 AND osm_id = $2
         ORDER BY valid_start",
        schema
    );

    let rows = tx
        .query(&query, &[&osm_type.as_str(), &osm_id])
        .await?;

    Ok(rows
        .iter()
        .map(|row| StoredEntity {
            entity_id: row.get("entity_id"),
            geometry_hash: row.get::<_, Option<Vec<u8>>>("geometry_hash").unwrap_or_default(),
            interval: Interval::new(row.get("valid_start"), row.get("valid_end")),
        })
        .collect())
}

async fn load_names(
    tx: &Transaction<'_>,
    schema: &str,
    entity_id: i64,
) -> Result<Vec<StoredName>, StoreError> {
    let query = format!(
        "SELECT name_id, name_text, language_code, name_kind, valid_start, valid_end FROM {}.names
         WHERE entity_id = $1",
        schema
    );

    let rows = tx.query(&query, &[&entity_id]).await?;

    Ok(rows
        .iter()
        .map(|row| StoredName {
            name_id: row.get("name_id"),
            text: row.get("name_text"),
            language: row.get("language_code"),
            kind: row.get("name_kind"),
            interval: Interval::new(row.get("valid_start"), row.get("valid_end")),
        })
        .collect())
}

/// Insère une nouvelle entité et retourne son identifiant
async fn insert_entity(
    tx: &Transaction<'_>,
    schema: &str,
    entity: &EntityUpsert,
    provenance: &Provenance,
    valid_end: Option<DateTime<Utc>>,
) -> Result<i64, StoreError> {
    let ewkb = geometry_to_ewkb(&entity.geometry, SRID)
        .map_err(|reason| StoreError::geometry(entity.osm_ref(), reason))?;

    let query = format!(
        "INSERT INTO {}.entities
            (entity_type, osm_type, osm_id, osm_version, geometry, centroid, geometry_hash,
             source_authority, valid_start, valid_end)
         VALUES ($1, $2, $3, $4, ST_GeomFromEWKB($5), ST_Centroid(ST_GeomFromEWKB($5)), $6, $7, $8, $9)
         RETURNING entity_id",
        schema
    );

    let row = tx
        .query_one(
            &query,
            &[
                &entity.entity_type.as_str(),
                &entity.osm_type.as_str(),
                &entity.osm_id,
                &entity.osm_version,
                &ewkb,
                &entity.geom_hash.as_slice(),
                &provenance.source_authority,
                &entity.valid_start,
                &valid_end,
            ],
        )
        .await?;

    Ok(row.get(0))
}

/// Ferme une entité à l'instant donné, ainsi que ses noms encore ouverts.
/// Retourne le nombre de noms fermés.
async fn close_entity(
    tx: &Transaction<'_>,
    schema: &str,
    entity_id: i64,
    at: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let entities = format!(
        "UPDATE {}.entities SET valid_end = $2 WHERE entity_id = $1",
        schema
    );
    tx.execute(&entities, &[&entity_id, &at]).await?;

    let names = format!(
        "UPDATE {}.names SET valid_end = $2
         WHERE entity_id = $1 AND valid_start < $2 AND (valid_end IS NULL OR valid_end > $2)",
        schema
    );
    let closed = tx.execute(&names, &[&entity_id, &at]).await?;

    Ok(closed as usize)
}

/// Insère un nom; `false` si la contrainte d'exclusion l'a rendu sans effet
#[allow(clippy::too_many_arguments)]
async fn insert_name(
    tx: &Transaction<'_>,
    schema: &str,
    entity_id: i64,
    name: &DerivedName,
    valid_start: DateTime<Utc>,
    valid_end: Option<DateTime<Utc>>,
    entity: &EntityUpsert,
    provenance: &Provenance,
) -> Result<bool, StoreError> {
    let query = format!(
        "INSERT INTO {}.names
            (entity_id, name_text, normalized_name, language_code, script_code, name_kind,
             valid_start, valid_end, decree_authority, source_type, source_reliability, notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT DO NOTHING",
        schema
    );

    let notes = format!(
        "Imported from OpenStreetMap (OSM ID: {}, Type: {}, Version: {}, Name Tag: {})",
        entity.osm_id, entity.osm_type, entity.osm_version, name.tag_key
    );

    let rows = tx
        .execute(
            &query,
            &[
                &entity_id,
                &name.text,
                &name.normalized,
                &name.language,
                &name.script,
                &name.kind.as_str(),
                &valid_start,
                &valid_end,
                &provenance.source_authority,
                &provenance.source_type,
                &provenance.reliability,
                &notes,
            ],
        )
        .await?;

    Ok(rows > 0)
}

async fn close_name(
    tx: &Transaction<'_>,
    schema: &str,
    name_id: i64,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let query = format!(
        "UPDATE {}.names SET valid_end = $2 WHERE name_id = $1",
        schema
    );
    tx.execute(&query, &[&name_id, &at]).await?;
    Ok(())
}

/// Convertit une géométrie geo en EWKB PostGIS
pub fn geometry_to_ewkb(geom: &Geometry<f64>, srid: u32) -> Result<Vec<u8>, String> {
    let wkb = geom_to_wkb(geom).map_err(|e| format!("Failed to convert geometry to WKB: {:?}", e))?;

    if wkb.len() < 5 {
        return Err(format!("WKB too short ({} bytes)", wkb.len()));
    }

    // Type avec flag SRID (0x20000000), SRID inséré après le type
    let little_endian = wkb[0] == 1;
    let type_bytes = [wkb[1], wkb[2], wkb[3], wkb[4]];
    let mut ewkb = Vec::with_capacity(wkb.len() + 4);
    ewkb.push(wkb[0]);

    if little_endian {
        let geom_type = u32::from_le_bytes(type_bytes) | 0x2000_0000;
        ewkb.extend_from_slice(&geom_type.to_le_bytes());
        ewkb.extend_from_slice(&srid.to_le_bytes());
    } else {
        let geom_type = u32::from_be_bytes(type_bytes) | 0x2000_0000;
        ewkb.extend_from_slice(&geom_type.to_be_bytes());
        ewkb.extend_from_slice(&srid.to_be_bytes());
    }

    ewkb.extend_from_slice(&wkb[5..]);
    Ok(ewkb)
}
