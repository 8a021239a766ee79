//! # toponyms-pg
//!
//! Chargement des toponymes d'un historique OpenStreetMap dans PostGIS avec
//! intervalles de validité.
//!
//! ## Features
//!
//! - Lecture en une passe d'un historique `.osh.pbf` (crate `osmhist`)
//! - Filtre par emprise et par période (avant / après un instant de coupure)
//! - Classification des tags dans une taxonomie fermée de types d'entités
//! - Noms multilingues versionnés, sans chevauchement d'intervalles
//! - Écritures par lots avec retry des erreurs transitoires
//!
//! ## Usage CLI
//!
//! ```bash
//! # Vérifier la base
//! toponyms-pg verify-system
//!
//! # Extraire la période d'avant la coupure dans un journal filtré
//! toponyms-pg extract --pre-cutoff --input ukraine.osh.pbf --output-dir ./data
//!
//! # Charger un journal avec une date de validité imposée
//! toponyms-pg load --file ./data/mariupol-pre-cutoff.osh.jsonl --query-date 2022-02-23
//! ```

pub mod classify;
pub mod config;
pub mod filter;
pub mod names;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod versioning;

pub use classify::{classify, EntityType, GeometryKind, SupportedTypes};
pub use config::{BoundingBox, PipelineConfig};
pub use filter::{Period, ScopeFilter, TemporalMode};
pub use pipeline::{extract, load, EntitySink, LoadOptions};
pub use report::{ExtractReport, LoadReport, LoadStatus};
pub use store::{create_pool, DatabaseConfig, PostgresSink, RetryPolicy, StoreClient, StoreError};
