//! Filtre spatial et temporel appliqué pendant la lecture
//!
//! Le flux n'offre ni accès direct ni index: chaque version est jugée une
//! seule fois, à son passage, à partir de son horodatage et de la position
//! déjà connue (nœud, centroïde de chemin, centroïde des membres).

use anyhow::Result;
use chrono::{DateTime, Utc};
use geo::Coord;
use osmhist::Tags;

use crate::config::{BoundingBox, PipelineConfig};

/// Sélection temporelle des versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalMode {
    /// Tout l'historique
    Full,
    /// Versions antérieures ou égales à l'instant (état de référence)
    Before(DateTime<Utc>),
    /// Versions strictement postérieures à l'instant
    After(DateTime<Utc>),
}

impl TemporalMode {
    /// Une version sans horodatage passe toujours
    pub fn admits(&self, timestamp: Option<DateTime<Utc>>) -> bool {
        let Some(ts) = timestamp else {
            return true;
        };
        match self {
            TemporalMode::Full => true,
            TemporalMode::Before(cutoff) => ts <= *cutoff,
            TemporalMode::After(cutoff) => ts > *cutoff,
        }
    }
}

/// Période demandée sur la ligne de commande
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    PreCutoff,
    PostCutoff,
    Custom(DateTime<Utc>),
    Full,
}

impl Period {
    /// Mode temporel correspondant; l'instant de coupure doit être configuré
    /// pour `PreCutoff` et `PostCutoff`
    pub fn temporal_mode(&self, cutoff: Option<DateTime<Utc>>) -> Result<TemporalMode> {
        let require = || {
            cutoff.ok_or_else(|| {
                anyhow::anyhow!("No cutoff configured (set it in the config file or TOPONYM_CUTOFF)")
            })
        };
        Ok(match self {
            Period::PreCutoff => TemporalMode::Before(require()?),
            Period::PostCutoff => TemporalMode::After(require()?),
            Period::Custom(at) => TemporalMode::Before(*at),
            Period::Full => TemporalMode::Full,
        })
    }

    /// Suffixe des fichiers extraits
    pub fn label(&self) -> String {
        match self {
            Period::PreCutoff => "pre-cutoff".to_string(),
            Period::PostCutoff => "post-cutoff".to_string(),
            Period::Custom(at) => at.format("%Y-%m-%d").to_string(),
            Period::Full => "full".to_string(),
        }
    }
}

/// Filtre d'emprise et de période
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    bbox: BoundingBox,
    mode: TemporalMode,
    keywords: Vec<String>,
}

impl ScopeFilter {
    pub fn new(bbox: BoundingBox, mode: TemporalMode, keywords: &[String]) -> Self {
        Self {
            bbox,
            mode,
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &PipelineConfig, mode: TemporalMode) -> Self {
        Self::new(config.bbox, mode, &config.keywords)
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn temporal_ok(&self, timestamp: Option<DateTime<Utc>>) -> bool {
        self.mode.admits(timestamp)
    }

    /// Un nœud dans l'emprise entre-t-il dans le cache ?
    ///
    /// En mode `After`, toutes les versions y entrent pour que les chemins
    /// postérieurs à la coupure puissent résoudre leurs nœuds inchangés.
    pub fn admits_geometry(&self, timestamp: Option<DateTime<Utc>>) -> bool {
        match self.mode {
            TemporalMode::Before(_) => self.mode.admits(timestamp),
            TemporalMode::Full | TemporalMode::After(_) => true,
        }
    }

    pub fn accepts_point(&self, timestamp: Option<DateTime<Utc>>, lon: f64, lat: f64) -> bool {
        self.temporal_ok(timestamp) && self.bbox.contains(lon, lat)
    }

    pub fn accepts_way(&self, timestamp: Option<DateTime<Utc>>, centroid: Option<Coord<f64>>) -> bool {
        self.temporal_ok(timestamp) && centroid.map_or(false, |c| self.bbox.contains_coord(c))
    }

    /// Relation: centroïde des membres dans l'emprise, ou mot-clé dans un tag
    pub fn accepts_relation(
        &self,
        timestamp: Option<DateTime<Utc>>,
        centroid: Option<Coord<f64>>,
        tags: &Tags,
    ) -> bool {
        if !self.temporal_ok(timestamp) {
            return false;
        }
        centroid.map_or(false, |c| self.bbox.contains_coord(c)) || self.matches_keyword(tags)
    }

    pub fn matches_keyword(&self, tags: &Tags) -> bool {
        if self.keywords.is_empty() {
            return false;
        }
        tags.values().any(|value| {
            let value = value.to_lowercase();
            self.keywords.iter().any(|k| value.contains(k.as_str()))
        })
    }
}
