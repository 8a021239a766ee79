//! Pipeline de chargement: lecture → cache → filtre → classification → upsert
//!
//! Une seule passe séquentielle sur le flux. Les écritures sont groupées en
//! lots; l'envoi d'un lot est le seul point de suspension.

pub mod extract;

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo::{Geometry, Point};
use osmhist::{CoordinateCache, ElementKind, Primitive, Tags};
use tracing::{debug, error, info, warn};

use crate::classify::{classify, EntityType, GeometryKind, SupportedTypes};
use crate::config::PipelineConfig;
use crate::filter::{ScopeFilter, TemporalMode};
use crate::names::{derive_names, has_name};
use crate::report::LoadReport;
use crate::store::{BatchOutcome, StoreError};
use crate::versioning::{geometry_hash, EntityChange, EntityDeletion, EntityUpsert};

pub use extract::extract;

/// Destination des lots d'écritures
#[async_trait(?Send)]
pub trait EntitySink {
    /// Types d'entités acceptés par la destination
    fn supported_types(&self) -> &SupportedTypes;

    /// Écrit un lot; une erreur est fatale pour le chargement
    async fn write_batch(&mut self, batch: &[EntityChange]) -> Result<BatchOutcome, StoreError>;
}

/// Paramètres d'un chargement
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub mode: TemporalMode,
    /// Libellé de la période, repris dans le rapport
    pub label: String,
    /// Début de validité imposé à toutes les versions (sinon leur horodatage)
    pub query_date: Option<DateTime<Utc>>,
}

const PROGRESS_EVERY: usize = 500_000;

/// Charge un fichier d'historique dans la destination.
///
/// Les erreurs fatales (flux illisible, lot en échec) interrompent le
/// chargement: elles sont consignées dans le rapport, dont le statut passe à
/// `Failed`. Les lots déjà écrits sont conservés.
pub async fn load<S: EntitySink>(
    path: &Path,
    config: &PipelineConfig,
    options: &LoadOptions,
    sink: &mut S,
) -> Result<LoadReport> {
    let start = Instant::now();
    let decoder = osmhist::open(path)
        .with_context(|| format!("Failed to open input: {}", path.display()))?;

    info!(
        input = %path.display(),
        mode = %options.label,
        batch_size = config.batch_size,
        "Starting load"
    );

    let mut loader = Loader {
        config,
        filter: ScopeFilter::from_config(config, options.mode),
        query_date: options.query_date,
        supported: sink.supported_types().clone(),
        cache: CoordinateCache::new(),
        loaded: HashMap::new(),
        batch: Vec::with_capacity(config.batch_size),
        report: LoadReport::new(&path.display().to_string(), &options.label),
    };

    for item in decoder {
        let primitive = match item {
            Ok(primitive) => primitive,
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Input stream is unreadable, aborting");
                loader.report.record_fatal(&format!("Decode stage failed: {}", e));
                break;
            }
            Err(e) => {
                warn!(error = %e, "Skipping corrupt record");
                loader.report.record_corrupt(&e.to_string());
                continue;
            }
        };

        loader.report.processed += 1;
        if loader.report.processed % PROGRESS_EVERY == 0 {
            info!(
                processed = loader.report.processed,
                accepted = loader.report.accepted,
                cached_nodes = loader.cache.len(),
                "Progress"
            );
        }

        if let Some(change) = loader.process(primitive) {
            loader.batch.push(change);
            if loader.batch.len() >= config.batch_size && !loader.flush(sink).await {
                break;
            }
        }
    }

    if !loader.has_failed() {
        loader.flush(sink).await;
    }

    let mut report = loader.report;
    report.set_duration(start.elapsed());
    report.finalize();

    info!(summary = %report.summary(), "Load finished");
    Ok(report)
}

struct Loader<'a> {
    config: &'a PipelineConfig,
    filter: ScopeFilter,
    query_date: Option<DateTime<Utc>>,
    supported: SupportedTypes,
    cache: CoordinateCache,
    /// Primitives déjà envoyées au stockage, avec leur dernier type
    loaded: HashMap<(ElementKind, i64), EntityType>,
    batch: Vec<EntityChange>,
    report: LoadReport,
}

impl Loader<'_> {
    /// Met à jour le cache et retourne l'écriture à effectuer si la version
    /// est retenue.
    ///
    /// Une version sans nom n'est retenue que pour une primitive déjà chargée:
    /// elle ferme alors ses noms. Une version de suppression ferme l'entité.
    fn process(&mut self, primitive: Primitive) -> Option<EntityChange> {
        let ts = primitive.timestamp();
        let key = (primitive.kind(), primitive.meta().id);

        if !primitive.meta().visible {
            if let Primitive::Point(node) = &primitive {
                self.cache.evict(node.meta.id);
            }
            return self.deletion(&primitive, key);
        }

        let named = has_name(primitive.tags());
        let tracked = self.loaded.contains_key(&key);

        let geometry = match &primitive {
            Primitive::Point(node) => {
                if self.filter.bbox().contains(node.lon, node.lat)
                    && self.filter.admits_geometry(ts)
                {
                    self.cache.put(node.meta.id, node.lon, node.lat);
                }
                if !self.filter.accepts_point(ts, node.lon, node.lat) || !(named || tracked) {
                    return None;
                }
                Geometry::Point(Point::from(node.coord()))
            }
            Primitive::Way(way) => {
                let resolved = self.cache.resolve_way(&way.node_refs);
                let centroid = resolved.centroid();
                if let Some(c) = centroid {
                    self.cache.put_way_centroid(way.meta.id, c);
                }
                if !self.filter.accepts_way(ts, centroid) || !(named || tracked) {
                    return None;
                }
                match resolved.line() {
                    Some(line) => Geometry::LineString(line),
                    None if !named => return None,
                    None => {
                        self.report.accepted += 1;
                        let osm_ref = osm_ref(&primitive);
                        debug!(osm = %osm_ref, resolved = resolved.coords.len(), "Way without line geometry");
                        self.report.record_geometry_error(
                            osm_ref,
                            &format!(
                                "fewer than 2 resolved coordinates ({} missing)",
                                resolved.missing
                            ),
                        );
                        return None;
                    }
                }
            }
            Primitive::Relation(relation) => {
                let centroid = self.cache.member_centroid(&relation.members);
                // Le mot-clé peut disparaître avec le nom: une relation déjà
                // chargée reste suivie
                let in_scope = self.filter.accepts_relation(ts, centroid, &relation.tags)
                    || (tracked && self.filter.temporal_ok(ts));
                if !in_scope || !(named || tracked) {
                    return None;
                }
                let at = centroid.unwrap_or_else(|| self.filter.bbox().center());
                Geometry::Point(Point::from(at))
            }
        };

        self.report.accepted += 1;

        let Some(valid_start) = self.query_date.or(ts) else {
            self.report.skipped_no_timestamp += 1;
            return None;
        };

        let entity = self.build(&primitive, geometry, valid_start);
        if !named {
            debug!(osm = %entity.osm_ref(), "Names removed from a loaded primitive");
        }
        self.loaded.insert(key, entity.entity_type);
        Some(entity.into())
    }

    /// Suppression d'une primitive chargée pendant ce passage
    fn deletion(
        &mut self,
        primitive: &Primitive,
        key: (ElementKind, i64),
    ) -> Option<EntityChange> {
        let entity_type = *self.loaded.get(&key)?;
        let ts = primitive.timestamp();
        if !self.filter.temporal_ok(ts) {
            return None;
        }
        let Some(deleted_at) = self.query_date.or(ts) else {
            self.report.skipped_no_timestamp += 1;
            return None;
        };

        self.loaded.remove(&key);
        self.report.deletions += 1;
        debug!(osm = %osm_ref(primitive), "Loaded primitive deleted");

        Some(
            EntityDeletion {
                osm_type: key.0,
                osm_id: key.1,
                osm_version: primitive.meta().version,
                entity_type,
                deleted_at,
            }
            .into(),
        )
    }

    fn build(
        &mut self,
        primitive: &Primitive,
        geometry: Geometry<f64>,
        valid_start: DateTime<Utc>,
    ) -> EntityUpsert {
        let tags: &Tags = primitive.tags();
        let kind = primitive.kind();
        let classified = classify(tags, GeometryKind::of(&geometry), kind);
        let (entity_type, coerced) = self.supported.coerce(classified);
        if coerced {
            self.report.coerced_types += 1;
            debug!(
                osm = %osm_ref(primitive),
                classified = %classified,
                "Entity type not supported by the store, using unknown"
            );
        }

        EntityUpsert {
            osm_type: kind,
            osm_id: primitive.meta().id,
            osm_version: primitive.meta().version,
            entity_type,
            geom_hash: geometry_hash(&geometry),
            geometry,
            valid_start,
            names: derive_names(tags, &self.config.primary_language),
        }
    }

    /// Envoie le lot courant; `false` si l'écriture a échoué
    async fn flush<S: EntitySink>(&mut self, sink: &mut S) -> bool {
        if self.batch.is_empty() {
            return true;
        }

        match sink.write_batch(&self.batch).await {
            Ok(outcome) => {
                self.report.record_batch(&outcome);
                self.batch.clear();
                true
            }
            Err(e) => {
                error!(error = %e, pending = self.batch.len(), "Batch write failed, aborting");
                self.report.record_fatal(&format!("Store stage failed: {}", e));
                false
            }
        }
    }

    fn has_failed(&self) -> bool {
        self.report.fatal_error().is_some()
    }
}

fn osm_ref(primitive: &Primitive) -> String {
    let meta = primitive.meta();
    format!("{}/{} v{}", primitive.kind(), meta.id, meta.version)
}
