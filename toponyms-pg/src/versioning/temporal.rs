//! Intervalles de validité et planification des écritures versionnées
//!
//! Les intervalles sont semi-ouverts `[valid_start, valid_end)`, `None`
//! signifiant une fin ouverte. Pour un couple (entité, langue, nature), les
//! intervalles des noms ne se chevauchent jamais: les fonctions de ce module
//! décident quoi écrire pour préserver cette propriété, sans accès à la base.

use chrono::{DateTime, Utc};

use super::diff::hash_matches;

/// Intervalle de validité semi-ouvert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// L'instant `at` appartient à l'intervalle
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && self.end.map_or(true, |end| at < end)
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        let starts_before_other_ends = other.end.map_or(true, |end| self.start < end);
        let other_starts_before_end = self.end.map_or(true, |end| other.start < end);
        starts_before_other_ends && other_starts_before_end
    }
}

/// Plus proche des deux fins (une fin ouverte est la plus lointaine)
pub fn earliest_end(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

/// Début le plus proche strictement postérieur à `at`
fn next_start<'a>(
    starts: impl Iterator<Item = &'a DateTime<Utc>>,
    at: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    starts.filter(|s| **s > at).min().copied()
}

/// Version d'entité déjà stockée pour une même primitive OSM
#[derive(Debug, Clone)]
pub struct StoredEntity {
    pub entity_id: i64,
    pub geometry_hash: Vec<u8>,
    pub interval: Interval,
}

/// Écriture à effectuer pour l'entité
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityPlan {
    /// Nouvelle ligne `[at, valid_end)`
    Insert { valid_end: Option<DateTime<Utc>> },
    /// Ligne existante réutilisée telle quelle
    Reuse { entity_id: i64 },
    /// Fermer `close_id` à `at` puis insérer `[at, valid_end)`
    Supersede {
        close_id: i64,
        valid_end: Option<DateTime<Utc>>,
    },
}

/// Décide de l'écriture d'entité pour une version valide à partir de `at`.
///
/// Les lignes stockées ne sont jamais modifiées sur place: à instant de début
/// égal, la première version écrite est conservée, comme pour les noms.
pub fn plan_entity(stored: &[StoredEntity], hash: &[u8; 32], at: DateTime<Utc>) -> EntityPlan {
    let Some(current) = stored.iter().find(|e| e.interval.covers(at)) else {
        return EntityPlan::Insert {
            valid_end: next_start(stored.iter().map(|e| &e.interval.start), at),
        };
    };

    if hash_matches(&current.geometry_hash, hash) || current.interval.start == at {
        EntityPlan::Reuse {
            entity_id: current.entity_id,
        }
    } else {
        EntityPlan::Supersede {
            close_id: current.entity_id,
            valid_end: current.interval.end,
        }
    }
}

/// Entité à fermer à `at` pour une version de suppression.
///
/// `None` si aucune ligne n'est valide à `at`, ou si la ligne valide commence
/// à `at` (la première version écrite à cet instant est conservée).
pub fn entity_to_close(stored: &[StoredEntity], at: DateTime<Utc>) -> Option<i64> {
    stored
        .iter()
        .find(|e| e.interval.covers(at) && e.interval.start < at)
        .map(|e| e.entity_id)
}

/// Nom déjà stocké pour une entité
#[derive(Debug, Clone)]
pub struct StoredName {
    pub name_id: i64,
    pub text: String,
    pub language: String,
    pub kind: String,
    pub interval: Interval,
}

/// Écriture à effectuer pour un nom
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePlan {
    /// Nouvelle ligne `[at, valid_end)`
    Insert { valid_end: Option<DateTime<Utc>> },
    /// Fermer `close_id` à `at` puis insérer `[at, valid_end)`
    Supersede {
        close_id: i64,
        valid_end: Option<DateTime<Utc>>,
    },
    /// Déjà présent, ou conflit au même instant: rien à écrire
    NoOp,
}

/// Décide de l'écriture d'un nom.
///
/// `slot` ne contient que les noms stockés de même entité, langue et nature.
pub fn plan_name(slot: &[&StoredName], text: &str, at: DateTime<Utc>) -> NamePlan {
    match slot.iter().find(|n| n.interval.covers(at)) {
        Some(current) if current.text == text || current.interval.start == at => NamePlan::NoOp,
        Some(current) => NamePlan::Supersede {
            close_id: current.name_id,
            valid_end: current.interval.end,
        },
        None => NamePlan::Insert {
            valid_end: next_start(slot.iter().map(|n| &n.interval.start), at),
        },
    }
}

/// Noms valides à `at` dont le couple (langue, nature) a disparu de la
/// nouvelle version: à fermer à `at`. Une version sans aucun nom les ferme
/// tous.
pub fn names_to_close(
    stored: &[StoredName],
    incoming: &[(String, String)],
    at: DateTime<Utc>,
) -> Vec<i64> {
    stored
        .iter()
        .filter(|n| n.interval.covers(at) && n.interval.start < at)
        .filter(|n| {
            !incoming
                .iter()
                .any(|(lang, kind)| *lang == n.language && *kind == n.kind)
        })
        .map(|n| n.name_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, d, 0, 0, 0).unwrap()
    }

    fn name(id: i64, text: &str, start: u32, end: Option<u32>) -> StoredName {
        StoredName {
            name_id: id,
            text: text.into(),
            language: "ukr".into(),
            kind: "official".into(),
            interval: Interval::new(day(start), end.map(day)),
        }
    }

    fn entity(id: i64, hash: u8, start: u32, end: Option<u32>) -> StoredEntity {
        StoredEntity {
            entity_id: id,
            geometry_hash: vec![hash; 32],
            interval: Interval::new(day(start), end.map(day)),
        }
    }

    #[test]
    fn test_interval_covers_half_open() {
        let interval = Interval::new(day(1), Some(day(10)));
        assert!(interval.covers(day(1)));
        assert!(interval.covers(day(9)));
        assert!(!interval.covers(day(10)));
        assert!(Interval::new(day(1), None).covers(day(28)));
    }

    #[test]
    fn test_interval_overlaps() {
        let a = Interval::new(day(1), Some(day(10)));
        assert!(a.overlaps(&Interval::new(day(9), None)));
        assert!(!a.overlaps(&Interval::new(day(10), None)));
        assert!(Interval::new(day(1), None).overlaps(&Interval::new(day(20), Some(day(21)))));
    }

    #[test]
    fn test_earliest_end() {
        assert_eq!(earliest_end(Some(day(3)), Some(day(2))), Some(day(2)));
        assert_eq!(earliest_end(None, Some(day(2))), Some(day(2)));
        assert_eq!(earliest_end(Some(day(3)), None), Some(day(3)));
        assert_eq!(earliest_end(None, None), None);
    }

    #[test]
    fn test_name_same_text_is_noop() {
        let stored = name(1, "Foo", 1, None);
        assert_eq!(plan_name(&[&stored], "Foo", day(1)), NamePlan::NoOp);
        assert_eq!(plan_name(&[&stored], "Foo", day(15)), NamePlan::NoOp);
    }

    #[test]
    fn test_name_change_supersedes() {
        let stored = name(1, "Foo", 1, None);
        assert_eq!(
            plan_name(&[&stored], "Bar", day(24)),
            NamePlan::Supersede {
                close_id: 1,
                valid_end: None
            }
        );
    }

    #[test]
    fn test_name_conflict_at_same_start_is_noop() {
        let stored = name(1, "Foo", 5, None);
        assert_eq!(plan_name(&[&stored], "Bar", day(5)), NamePlan::NoOp);
    }

    #[test]
    fn test_name_before_existing_is_bounded() {
        let later = name(1, "Foo", 20, None);
        assert_eq!(
            plan_name(&[&later], "Bar", day(2)),
            NamePlan::Insert {
                valid_end: Some(day(20))
            }
        );
        assert_eq!(
            plan_name(&[], "Bar", day(2)),
            NamePlan::Insert { valid_end: None }
        );
    }

    #[test]
    fn test_planned_names_never_overlap() {
        // Rejouer une séquence de changements et vérifier l'exclusivité
        let mut stored: Vec<StoredName> = Vec::new();
        let events = [(10, "A"), (3, "B"), (20, "C"), (10, "D"), (15, "C"), (3, "B")];
        let mut next_id = 1;

        for (d, text) in events {
            let slot: Vec<&StoredName> = stored.iter().collect();
            match plan_name(&slot, text, day(d)) {
                NamePlan::NoOp => {}
                NamePlan::Insert { valid_end } => {
                    stored.push(StoredName {
                        interval: Interval::new(day(d), valid_end),
                        ..name(next_id, text, d, None)
                    });
                    next_id += 1;
                }
                NamePlan::Supersede { close_id, valid_end } => {
                    if let Some(old) = stored.iter_mut().find(|n| n.name_id == close_id) {
                        old.interval.end = Some(day(d));
                    }
                    stored.push(StoredName {
                        interval: Interval::new(day(d), valid_end),
                        ..name(next_id, text, d, None)
                    });
                    next_id += 1;
                }
            }
        }

        for (i, a) in stored.iter().enumerate() {
            for b in stored.iter().skip(i + 1) {
                assert!(!a.interval.overlaps(&b.interval), "{:?} overlaps {:?}", a, b);
            }
        }
        assert_eq!(stored.len(), 4);
    }

    #[test]
    fn test_names_to_close() {
        let stored = vec![
            name(1, "Foo", 1, None),
            StoredName {
                language: "rus".into(),
                ..name(2, "Фу", 1, None)
            },
            StoredName {
                language: "eng".into(),
                ..name(3, "Foo", 24, None)
            },
        ];
        let incoming = vec![("ukr".to_string(), "official".to_string())];

        assert_eq!(names_to_close(&stored, &incoming, day(24)), vec![2]);
    }

    #[test]
    fn test_names_to_close_when_all_names_dropped() {
        let stored = vec![
            name(1, "Foo", 1, None),
            StoredName {
                language: "rus".into(),
                ..name(2, "Фу", 1, None)
            },
            name(3, "Old", 1, Some(10)),
        ];

        assert_eq!(names_to_close(&stored, &[], day(24)), vec![1, 2]);
        // Même instant de début: rien à fermer
        assert!(names_to_close(&stored, &[], day(1)).is_empty());
    }

    #[test]
    fn test_entity_plans() {
        let hash = [7u8; 32];

        assert_eq!(
            plan_entity(&[], &hash, day(1)),
            EntityPlan::Insert { valid_end: None }
        );

        let same = entity(10, 7, 1, None);
        assert_eq!(
            plan_entity(&[same], &hash, day(20)),
            EntityPlan::Reuse { entity_id: 10 }
        );

        let moved = entity(11, 1, 1, None);
        assert_eq!(
            plan_entity(&[moved], &hash, day(20)),
            EntityPlan::Supersede {
                close_id: 11,
                valid_end: None
            }
        );

        let later = entity(12, 1, 20, None);
        assert_eq!(
            plan_entity(&[later], &hash, day(2)),
            EntityPlan::Insert {
                valid_end: Some(day(20))
            }
        );
    }

    #[test]
    fn test_same_start_keeps_first_writer() {
        // Avec une date de requête, toutes les versions commencent au même instant
        let first = entity(7, 1, 5, None);
        let first_name = name(70, "Жданов", 5, None);

        let newer_hash = [9u8; 32];
        assert_eq!(
            plan_entity(&[first], &newer_hash, day(5)),
            EntityPlan::Reuse { entity_id: 7 }
        );
        assert_eq!(
            plan_name(&[&first_name], "Маріуполь", day(5)),
            NamePlan::NoOp
        );
    }

    #[test]
    fn test_entity_to_close() {
        let closed = entity(1, 1, 1, Some(10));
        let open = entity(2, 2, 10, None);
        let stored = vec![closed, open];

        assert_eq!(entity_to_close(&stored, day(24)), Some(2));
        assert_eq!(entity_to_close(&stored, day(5)), Some(1));
        // Suppression au début de la ligne courante: première écriture conservée
        assert_eq!(entity_to_close(&stored, day(10)), None);
        assert_eq!(entity_to_close(&[], day(24)), None);
    }
}
