//! Configuration du pipeline
//!
//! Sources, dans l'ordre d'application: preset embarqué (`mariupol`) ou
//! fichier JSON, puis surcharges `TOPONYM_*` de l'environnement.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::store::retry::RetryPolicy;

/// Emprise géographique (degrés WGS84, bornes incluses)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Result<Self> {
        let bbox = Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn validate(&self) -> Result<()> {
        let values = [self.min_lat, self.min_lon, self.max_lat, self.max_lon];
        if values.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("Bounding box contains a non-finite value: {:?}", self);
        }
        if self.min_lat > self.max_lat || self.min_lon > self.max_lon {
            anyhow::bail!("Bounding box minimum exceeds maximum: {:?}", self);
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 {
            anyhow::bail!("Latitude out of range: {:?}", self);
        }
        if self.min_lon < -180.0 || self.max_lon > 180.0 {
            anyhow::bail!("Longitude out of range: {:?}", self);
        }
        Ok(())
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    pub fn contains_coord(&self, coord: Coord<f64>) -> bool {
        self.contains(coord.x, coord.y)
    }

    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: (self.min_lon + self.max_lon) / 2.0,
            y: (self.min_lat + self.max_lat) / 2.0,
        }
    }
}

/// Format `min_lat,min_lon,max_lat,max_lon`
impl FromStr for BoundingBox {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .with_context(|| format!("Invalid bounding box: '{}'", s))?;

        match parts.as_slice() {
            [min_lat, min_lon, max_lat, max_lon] => {
                Self::new(*min_lat, *min_lon, *max_lat, *max_lon)
            }
            _ => anyhow::bail!(
                "Invalid bounding box: '{}'. Expected min_lat,min_lon,max_lat,max_lon",
                s
            ),
        }
    }
}

/// Langue et écriture attribuées au tag `name` sans suffixe
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PrimaryLanguage {
    pub language: String,
    pub script: String,
}

impl Default for PrimaryLanguage {
    fn default() -> Self {
        Self {
            language: "ukr".into(),
            script: "Cyrl".into(),
        }
    }
}

/// Provenance inscrite sur chaque ligne chargée
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Provenance {
    pub source_authority: String,
    pub source_type: String,
    pub reliability: String,
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            source_authority: "OpenStreetMap".into(),
            source_type: "osm_data".into(),
            reliability: "high".into(),
        }
    }
}

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Identifiant court de la zone d'étude (préfixe des fichiers extraits)
    pub region: String,

    pub bbox: BoundingBox,

    /// Instant de coupure (événement de référence)
    #[serde(default)]
    pub cutoff: Option<DateTime<Utc>>,

    /// Mots-clés de repli pour les relations hors emprise
    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Schéma PostgreSQL cible
    #[serde(default = "default_schema")]
    pub schema: String,

    #[serde(default)]
    pub primary_language: PrimaryLanguage,

    #[serde(default)]
    pub provenance: Provenance,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_batch_size() -> usize {
    1000
}

fn default_schema() -> String {
    "toponyms".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // Le preset embarqué est validé par les tests
        Self::from_preset("mariupol").unwrap_or_else(|_| Self {
            region: "mariupol".into(),
            bbox: BoundingBox {
                min_lat: 47.0002828,
                min_lon: 37.2942822,
                max_lat: 47.2294948,
                max_lon: 37.7554739,
            },
            cutoff: None,
            keywords: Vec::new(),
            batch_size: default_batch_size(),
            schema: default_schema(),
            primary_language: PrimaryLanguage::default(),
            provenance: Provenance::default(),
            retry: RetryPolicy::default(),
        })
    }
}

impl PipelineConfig {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "mariupol" => Self::load_embedded(include_str!("presets/mariupol.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: mariupol", preset),
        }
    }

    /// Preset embarqué ou chemin vers un fichier JSON
    pub fn resolve(preset_or_path: &str) -> Result<Self> {
        match preset_or_path {
            "mariupol" => Self::from_preset(preset_or_path),
            _ => Self::load(Path::new(preset_or_path)),
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }

    /// Applique les surcharges `TOPONYM_*` de l'environnement
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(bbox) = var("TOPONYM_BBOX") {
            self.bbox = bbox.parse()?;
        }
        if let Some(cutoff) = var("TOPONYM_CUTOFF") {
            self.cutoff = Some(parse_instant(&cutoff)?);
        }
        if let Some(keywords) = var("TOPONYM_KEYWORDS") {
            self.keywords = keywords
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }
        if let Some(size) = var("TOPONYM_BATCH_SIZE") {
            self.batch_size = size
                .parse()
                .with_context(|| format!("Invalid TOPONYM_BATCH_SIZE: {}", size))?;
        }
        if let Some(schema) = var("TOPONYM_SCHEMA") {
            self.schema = schema;
        }
        if let Some(attempts) = var("TOPONYM_RETRY_ATTEMPTS") {
            self.retry.max_attempts = attempts
                .parse()
                .with_context(|| format!("Invalid TOPONYM_RETRY_ATTEMPTS: {}", attempts))?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        self.bbox.validate()?;
        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("Retry policy needs at least one attempt");
        }
        if self.schema.is_empty()
            || !self
                .schema
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            anyhow::bail!("Invalid schema name: '{}'", self.schema);
        }
        Ok(())
    }
}

/// Accepte un instant RFC 3339 ou une date `YYYY-MM-DD` (minuit UTC)
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    let date = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| {
        format!(
            "Invalid instant: '{}'. Expected YYYY-MM-DD or RFC 3339 (e.g., 2022-02-23T23:59:59Z)",
            value
        )
    })?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_mariupol_preset() {
        let config = PipelineConfig::from_preset("mariupol").unwrap();
        assert_eq!(config.region, "mariupol");
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.schema, "toponyms");
        assert_eq!(config.keywords.len(), 9);
        assert_eq!(
            config.cutoff,
            Some(parse_instant("2022-02-23T23:59:59Z").unwrap())
        );
        assert_eq!(config.retry.max_attempts, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_preset() {
        assert!(PipelineConfig::from_preset("kyiv").is_err());
    }

    #[test]
    fn test_bbox_parse() {
        let bbox: BoundingBox = "47.0002828,37.2942822,47.2294948,37.7554739".parse().unwrap();
        assert_eq!(bbox.min_lat, 47.0002828);
        assert_eq!(bbox.max_lon, 37.7554739);
        assert!(bbox.contains(37.5, 47.1));
        assert!(!bbox.contains(47.1, 37.5));

        assert!("1,2,3".parse::<BoundingBox>().is_err());
        assert!("a,b,c,d".parse::<BoundingBox>().is_err());
        assert!("48,37,47,38".parse::<BoundingBox>().is_err());
    }

    #[test]
    fn test_bbox_edges_are_inclusive() {
        let bbox = BoundingBox::new(47.0, 37.0, 48.0, 38.0).unwrap();
        assert!(bbox.contains(37.0, 47.0));
        assert!(bbox.contains(38.0, 48.0));
        assert!(!bbox.contains(38.000001, 48.0));
        assert_eq!(bbox.center(), Coord { x: 37.5, y: 47.5 });
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TOPONYM_BBOX", "10,20,11,21"),
            ("TOPONYM_CUTOFF", "2020-01-01"),
            ("TOPONYM_KEYWORDS", "foo, bar,,"),
            ("TOPONYM_BATCH_SIZE", "50"),
        ]);
        let mut config = PipelineConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.bbox.min_lat, 10.0);
        assert_eq!(config.cutoff, Some(parse_instant("2020-01-01T00:00:00Z").unwrap()));
        assert_eq!(config.keywords, vec!["foo", "bar"]);
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn test_invalid_batch_size_rejected() {
        let mut config = PipelineConfig::default();
        let result = config.apply_overrides(|k| (k == "TOPONYM_BATCH_SIZE").then(|| "0".into()));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_instant() {
        let midnight = parse_instant("2022-02-23").unwrap();
        assert_eq!(midnight.to_rfc3339(), "2022-02-23T00:00:00+00:00");

        let with_offset = parse_instant("2022-02-24T02:00:00+02:00").unwrap();
        assert_eq!(with_offset.to_rfc3339(), "2022-02-24T00:00:00+00:00");

        assert!(parse_instant("23/02/2022").is_err());
        assert!(parse_instant("2022-13-01").is_err());
    }
}
