//! Rapports de chargement et d'extraction
//!
//! Les erreurs non fatales (enregistrement illisible, géométrie invalide,
//! écriture annulée) sont comptées et listées sans interrompre le traitement.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::store::{BatchOutcome, ItemFailure, ItemWritten};
use crate::versioning::{NameCounts, UpsertResult};

/// Statut global d'un chargement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadStatus {
    /// Chargement complet sans erreur
    Success,
    /// Chargement complet avec des erreurs non fatales
    PartialSuccess,
    /// Chargement interrompu
    Failed,
}

/// Niveau de sévérité des erreurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorLevel {
    /// Erreur fatale: chargement abandonné
    Fatal,
    /// Primitive non chargée
    Error,
    /// Enregistrement ignoré
    Warning,
}

/// Erreur rencontrée pendant le chargement
#[derive(Debug, Clone, Serialize)]
pub struct LoadError {
    pub level: ErrorLevel,
    /// Référence OSM, ex. `way/42 v3`
    pub osm_ref: Option<String>,
    pub entity_type: Option<String>,
    pub message: String,
    pub details: Option<String>,
}

/// Statistiques par type d'entité
#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub closed: usize,
    pub errors: usize,
}

impl TypeStats {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged + self.closed
    }
}

/// Rapport complet d'un chargement
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    /// Fichier source
    pub input: String,
    /// Période chargée
    pub mode: String,
    pub duration_secs: f64,
    pub status: LoadStatus,

    /// Versions lues
    pub processed: usize,
    /// Versions retenues par le filtre, nommées ou d'une primitive déjà chargée
    pub accepted: usize,
    /// Versions de suppression d'une primitive déjà chargée
    pub deletions: usize,
    /// Enregistrements illisibles ignorés
    pub corrupt: usize,
    /// Chemins retenus avec moins de deux positions résolues
    pub geometry_errors: usize,
    /// Versions sans horodatage ni date de requête
    pub skipped_no_timestamp: usize,
    /// Types remplacés par `unknown` faute de support en base
    pub coerced_types: usize,
    pub batches: usize,

    pub entities_inserted: usize,
    pub entities_updated: usize,
    pub entities_unchanged: usize,
    /// Entités fermées par une version de suppression
    pub entities_closed: usize,
    pub entities_failed: usize,
    pub names: NameCounts,

    pub by_type: HashMap<String, TypeStats>,
    pub errors: Vec<LoadError>,
}

impl LoadReport {
    pub fn new(input: &str, mode: &str) -> Self {
        Self {
            input: input.to_string(),
            mode: mode.to_string(),
            duration_secs: 0.0,
            status: LoadStatus::Success,
            processed: 0,
            accepted: 0,
            deletions: 0,
            corrupt: 0,
            geometry_errors: 0,
            skipped_no_timestamp: 0,
            coerced_types: 0,
            batches: 0,
            entities_inserted: 0,
            entities_updated: 0,
            entities_unchanged: 0,
            entities_closed: 0,
            entities_failed: 0,
            names: NameCounts::default(),
            by_type: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Intègre le résultat d'un lot commité
    pub fn record_batch(&mut self, outcome: &BatchOutcome) {
        self.batches += 1;
        for item in &outcome.written {
            self.record_written(item);
        }
        for failure in &outcome.failures {
            self.record_failure(failure);
        }
    }

    pub fn record_written(&mut self, item: &ItemWritten) {
        let stats = self
            .by_type
            .entry(item.entity_type.as_str().to_string())
            .or_default();
        match item.outcome.entity {
            UpsertResult::Inserted => {
                self.entities_inserted += 1;
                stats.inserted += 1;
            }
            UpsertResult::Updated => {
                self.entities_updated += 1;
                stats.updated += 1;
            }
            UpsertResult::Unchanged => {
                self.entities_unchanged += 1;
                stats.unchanged += 1;
            }
            UpsertResult::Closed => {
                self.entities_closed += 1;
                stats.closed += 1;
            }
        }
        self.names.absorb(item.outcome.names);
    }

    pub fn record_failure(&mut self, failure: &ItemFailure) {
        self.entities_failed += 1;
        self.by_type
            .entry(failure.entity_type.as_str().to_string())
            .or_default()
            .errors += 1;
        self.errors.push(LoadError {
            level: ErrorLevel::Error,
            osm_ref: Some(failure.osm_ref.clone()),
            entity_type: Some(failure.entity_type.as_str().to_string()),
            message: failure.message.clone(),
            details: (!failure.name.is_empty()).then(|| failure.name.clone()),
        });
    }

    /// Chemin nommé sans géométrie exploitable
    pub fn record_geometry_error(&mut self, osm_ref: String, message: &str) {
        self.geometry_errors += 1;
        self.errors.push(LoadError {
            level: ErrorLevel::Warning,
            osm_ref: Some(osm_ref),
            entity_type: None,
            message: message.to_string(),
            details: None,
        });
    }

    /// Enregistrement illisible dans le flux
    pub fn record_corrupt(&mut self, message: &str) {
        self.corrupt += 1;
        self.errors.push(LoadError {
            level: ErrorLevel::Warning,
            osm_ref: None,
            entity_type: None,
            message: message.to_string(),
            details: None,
        });
    }

    pub fn record_fatal(&mut self, message: &str) {
        self.errors.push(LoadError {
            level: ErrorLevel::Fatal,
            osm_ref: None,
            entity_type: None,
            message: message.to_string(),
            details: None,
        });
    }

    /// Première erreur fatale, s'il y en a une
    pub fn fatal_error(&self) -> Option<&LoadError> {
        self.errors.iter().find(|e| e.level == ErrorLevel::Fatal)
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let has_fatal = self.fatal_error().is_some();
        let has_errors = !self.errors.is_empty();
        let has_success = self.total_entities() > 0;

        self.status = if has_fatal {
            LoadStatus::Failed
        } else if has_errors && has_success {
            LoadStatus::PartialSuccess
        } else if has_errors && self.entities_failed > 0 {
            LoadStatus::Failed
        } else if has_errors {
            LoadStatus::PartialSuccess
        } else {
            LoadStatus::Success
        };
    }

    pub fn total_entities(&self) -> usize {
        self.entities_inserted
            + self.entities_updated
            + self.entities_unchanged
            + self.entities_closed
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("LOAD REPORT - {} ({})", self.input, self.mode);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Primitives: {} processed, {} accepted, {} deletions, {} skipped (no timestamp)",
            self.processed, self.accepted, self.deletions, self.skipped_no_timestamp
        );
        println!(
            "Stream: {} corrupt records, {} geometry errors, {} coerced types",
            self.corrupt, self.geometry_errors, self.coerced_types
        );
        println!(
            "Entities: {} inserted, {} updated, {} unchanged, {} closed, {} failed ({} batches)",
            self.entities_inserted,
            self.entities_updated,
            self.entities_unchanged,
            self.entities_closed,
            self.entities_failed,
            self.batches
        );
        println!(
            "Names: {} inserted, {} superseded, {} closed, {} unchanged",
            self.names.inserted, self.names.superseded, self.names.closed, self.names.unchanged
        );

        if !self.by_type.is_empty() {
            println!("\n--- BY TYPE ---");
            let mut types: Vec<_> = self.by_type.iter().collect();
            types.sort_by_key(|(k, _)| k.as_str());
            for (type_name, stats) in types {
                println!(
                    "  {}: {} inserted, {} updated, {} unchanged, {} closed, {} errors",
                    type_name,
                    stats.inserted,
                    stats.updated,
                    stats.unchanged,
                    stats.closed,
                    stats.errors
                );
            }
        }

        if !self.errors.is_empty() {
            println!("\n--- ERRORS ({}) ---", self.errors.len());
            for e in self.errors.iter().take(20) {
                let location = e
                    .osm_ref
                    .as_ref()
                    .map(|r| format!("[{}]", r))
                    .unwrap_or_default();
                println!("  {:?} {} {}", e.level, location, e.message);
            }
            if self.errors.len() > 20 {
                println!("  ... and {} more", self.errors.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} processed, {} accepted, {} inserted, {} updated, {} unchanged, {} closed, {} skipped, {} corrupt, {} geometry errors, {} coerced",
            self.mode,
            self.processed,
            self.accepted,
            self.entities_inserted,
            self.entities_updated,
            self.entities_unchanged,
            self.entities_closed,
            self.skipped_no_timestamp,
            self.corrupt,
            self.geometry_errors,
            self.coerced_types
        )
    }
}

/// Rapport d'une extraction vers un journal filtré
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractReport {
    pub input: String,
    pub output: String,
    pub period: String,
    pub duration_secs: f64,
    /// Versions lues (dernière passe)
    pub processed: usize,
    /// Versions écrites
    pub extracted: usize,
    /// Nœuds antérieurs à la coupure écrits pour résoudre des chemins
    pub support_nodes: usize,
    pub corrupt: usize,
}

impl ExtractReport {
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("EXTRACT REPORT - {} ({})", self.input, self.period);
        println!("{}", "=".repeat(60));
        println!("Output: {}", self.output);
        println!("Duration: {:.2}s", self.duration_secs);
        println!(
            "Primitives: {} processed, {} extracted ({} support nodes), {} corrupt",
            self.processed, self.extracted, self.support_nodes, self.corrupt
        );
        println!("{}", "=".repeat(60));
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} processed, {} extracted",
            self.period, self.processed, self.extracted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::EntityType;
    use crate::versioning::ToponymOutcome;

    fn written(entity_type: EntityType, entity: UpsertResult, names: usize) -> ItemWritten {
        ItemWritten {
            osm_ref: "node/1 v1".into(),
            entity_type,
            outcome: ToponymOutcome {
                entity_id: Some(1),
                entity,
                names: NameCounts {
                    inserted: names,
                    ..Default::default()
                },
            },
        }
    }

    #[test]
    fn test_report_new() {
        let report = LoadReport::new("mariupol.osh.pbf", "pre-cutoff");
        assert_eq!(report.status, LoadStatus::Success);
        assert_eq!(report.processed, 0);
        assert_eq!(report.total_entities(), 0);
    }

    #[test]
    fn test_record_batch() {
        let mut report = LoadReport::new("in", "full");
        report.record_batch(&BatchOutcome {
            written: vec![
                written(EntityType::City, UpsertResult::Inserted, 2),
                written(EntityType::City, UpsertResult::Unchanged, 0),
                written(EntityType::Street, UpsertResult::Updated, 1),
                written(EntityType::Street, UpsertResult::Closed, 0),
            ],
            failures: vec![ItemFailure {
                osm_ref: "way/7 v2".into(),
                entity_type: EntityType::Street,
                name: "MainSt".into(),
                message: "exclusion violation".into(),
            }],
        });

        assert_eq!(report.batches, 1);
        assert_eq!(report.entities_inserted, 1);
        assert_eq!(report.entities_unchanged, 1);
        assert_eq!(report.entities_updated, 1);
        assert_eq!(report.entities_closed, 1);
        assert_eq!(report.entities_failed, 1);
        assert_eq!(report.names.inserted, 3);
        assert_eq!(report.by_type.get("city").unwrap().total(), 2);
        assert_eq!(report.by_type.get("street").unwrap().errors, 1);
        assert_eq!(report.by_type.get("street").unwrap().closed, 1);
        assert_eq!(report.errors[0].details.as_deref(), Some("MainSt"));
    }

    #[test]
    fn test_finalize_partial_success() {
        let mut report = LoadReport::new("in", "full");
        report.record_written(&written(EntityType::City, UpsertResult::Inserted, 1));
        report.record_geometry_error("way/1 v1".into(), "fewer than 2 coordinates");
        report.finalize();

        assert_eq!(report.status, LoadStatus::PartialSuccess);
        assert_eq!(report.geometry_errors, 1);
    }

    #[test]
    fn test_finalize_failed() {
        let mut report = LoadReport::new("in", "full");
        report.record_written(&written(EntityType::City, UpsertResult::Inserted, 1));
        report.record_fatal("write batch failed after 10 attempts");
        report.finalize();

        assert_eq!(report.status, LoadStatus::Failed);
        assert!(report.fatal_error().unwrap().message.contains("10 attempts"));
    }

    #[test]
    fn test_finalize_success() {
        let mut report = LoadReport::new("in", "full");
        report.record_written(&written(EntityType::Park, UpsertResult::Inserted, 1));
        report.finalize();

        assert_eq!(report.status, LoadStatus::Success);
    }

    #[test]
    fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut report = LoadReport::new("in", "post-cutoff");
        report.record_corrupt("blob at offset 1024: invalid data");
        report.save_to_file(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["mode"], "post-cutoff");
        assert_eq!(json["corrupt"], 1);
        assert_eq!(json["errors"][0]["level"], "Warning");
    }

    #[test]
    fn test_summary() {
        let mut report = LoadReport::new("in", "pre-cutoff");
        report.processed = 100;
        report.entities_inserted = 5;

        let summary = report.summary();
        assert!(summary.starts_with("pre-cutoff"));
        assert!(summary.contains("100 processed"));
        assert!(summary.contains("5 inserted"));

        let extract = ExtractReport {
            period: "full".into(),
            processed: 10,
            extracted: 4,
            ..Default::default()
        };
        assert_eq!(extract.summary(), "full: 10 processed, 4 extracted");
    }
}
