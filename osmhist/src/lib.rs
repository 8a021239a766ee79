//! # osmhist
//!
//! Lecture en flux des historiques OpenStreetMap (`.osh.pbf`) et des journaux
//! filtrés produits à partir de ceux-ci.
//!
//! ## Features
//!
//! - Décodage PBF bloc par bloc avec `osmpbf`, sans index ni accès aléatoire
//! - Toutes les versions de chaque primitive, dans l'ordre physique du fichier
//! - Blobs corrompus signalés et ignorés, flux tronqué signalé comme fatal
//! - Cache de coordonnées pour résoudre la géométrie des chemins
//! - Journal JSON lines (bzip2 optionnel) en écriture et en lecture
//!
//! ## Usage
//!
//! ```rust,ignore
//! use osmhist::{open, CoordinateCache, Primitive};
//! use std::path::Path;
//!
//! let mut cache = CoordinateCache::new();
//! for item in open(Path::new("region.osh.pbf"))? {
//!     match item {
//!         Ok(Primitive::Point(node)) => cache.put(node.meta.id, node.lon, node.lat),
//!         Ok(Primitive::Way(way)) => {
//!             let resolved = cache.resolve_way(&way.node_refs);
//!             println!("way {}: {} coords", way.meta.id, resolved.coords.len());
//!         }
//!         Ok(Primitive::Relation(_)) => {}
//!         Err(e) if !e.is_fatal() => eprintln!("skipped: {}", e),
//!         Err(e) => return Err(e.into()),
//!     }
//! }
//! ```

pub mod cache;
pub mod decoder;
pub mod error;
pub mod types;
pub mod writer;

pub use cache::{CoordinateCache, ResolvedWay};
pub use decoder::{Decoder, InputFormat};
pub use error::OsmHistError;
pub use types::{ElementKind, Member, Meta, Node, Primitive, Relation, Tags, Way};
pub use writer::ChangelogWriter;

use std::path::Path;

/// Ouvre un flux de primitives.
///
/// Le format est déduit du nom de fichier: `*.pbf` pour les extraits PBF,
/// `*.jsonl` / `*.ndjson` (éventuellement `.bz2`) pour les journaux filtrés.
/// Le flux n'avance que vers l'avant; pour relire, rouvrir le chemin.
///
/// # Errors
///
/// Retourne `OsmHistError` si le fichier est absent, illisible ou d'un format
/// non reconnu.
pub fn open(path: &Path) -> Result<Decoder, OsmHistError> {
    Decoder::open(path)
}
