//! Classification des tags OSM dans la taxonomie des toponymes
//!
//! Table de règles ordonnée par nature de primitive, première règle
//! satisfaite gagnante, puis repli sur la nature de la géométrie produite.
//! La fonction est pure et totale.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use geo::Geometry;
use osmhist::{ElementKind, Tags};
use serde::{Deserialize, Serialize};

/// Types d'entités (codes de la table `entity_types`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Region,
    District,
    Street,
    Square,
    Park,
    Building,
    City,
    Waterway,
    PointOfInterest,
    Area,
    Path,
    /// Type fourre-tout
    Unknown,
}

impl EntityType {
    pub const ALL: [EntityType; 12] = [
        EntityType::Region,
        EntityType::District,
        EntityType::Street,
        EntityType::Square,
        EntityType::Park,
        EntityType::Building,
        EntityType::City,
        EntityType::Waterway,
        EntityType::PointOfInterest,
        EntityType::Area,
        EntityType::Path,
        EntityType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Region => "region",
            EntityType::District => "district",
            EntityType::Street => "street",
            EntityType::Square => "square",
            EntityType::Park => "park",
            EntityType::Building => "building",
            EntityType::City => "city",
            EntityType::Waterway => "waterway",
            EntityType::PointOfInterest => "point_of_interest",
            EntityType::Area => "area",
            EntityType::Path => "path",
            EntityType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == code)
            .ok_or_else(|| format!("Unknown entity type: {}", s))
    }
}

/// Nature de la géométrie stockée pour une primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    Line,
    Area,
}

impl GeometryKind {
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => GeometryKind::Point,
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                GeometryKind::Line
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => GeometryKind::Area,
            Geometry::GeometryCollection(_) => GeometryKind::Point,
        }
    }
}

struct Rule {
    primitive: ElementKind,
    entity_type: EntityType,
    matches: fn(&Tags) -> bool,
}

fn tag<'a>(tags: &'a Tags, key: &str) -> Option<&'a str> {
    tags.get(key).map(String::as_str)
}

fn has(tags: &Tags, key: &str) -> bool {
    tags.contains_key(key)
}

fn is_multipolygon(tags: &Tags) -> bool {
    tag(tags, "type") == Some("multipolygon")
}

static RULES: &[Rule] = &[
    // Chemins
    Rule {
        primitive: ElementKind::Way,
        entity_type: EntityType::Square,
        matches: |t| tag(t, "place") == Some("square"),
    },
    Rule {
        primitive: ElementKind::Way,
        entity_type: EntityType::Street,
        matches: |t| has(t, "highway"),
    },
    Rule {
        primitive: ElementKind::Way,
        entity_type: EntityType::Waterway,
        matches: |t| has(t, "waterway"),
    },
    Rule {
        primitive: ElementKind::Way,
        entity_type: EntityType::Path,
        matches: |t| has(t, "footway") || has(t, "path"),
    },
    // Relations
    Rule {
        primitive: ElementKind::Relation,
        entity_type: EntityType::District,
        matches: |t| matches!(tag(t, "admin_level"), Some("8" | "9" | "10")),
    },
    Rule {
        primitive: ElementKind::Relation,
        entity_type: EntityType::Region,
        matches: |t| tag(t, "boundary") == Some("administrative"),
    },
    Rule {
        primitive: ElementKind::Relation,
        entity_type: EntityType::Park,
        matches: |t| is_multipolygon(t) && tag(t, "landuse") == Some("park"),
    },
    Rule {
        primitive: ElementKind::Relation,
        entity_type: EntityType::Building,
        matches: |t| is_multipolygon(t) && (has(t, "building") || has(t, "amenity")),
    },
    Rule {
        primitive: ElementKind::Relation,
        entity_type: EntityType::Area,
        matches: is_multipolygon,
    },
    // Nœuds
    Rule {
        primitive: ElementKind::Node,
        entity_type: EntityType::City,
        matches: |t| tag(t, "place") == Some("city"),
    },
    Rule {
        primitive: ElementKind::Node,
        entity_type: EntityType::Square,
        matches: |t| tag(t, "place") == Some("square"),
    },
    Rule {
        primitive: ElementKind::Node,
        entity_type: EntityType::Building,
        matches: |t| has(t, "building"),
    },
    Rule {
        primitive: ElementKind::Node,
        entity_type: EntityType::PointOfInterest,
        matches: |t| has(t, "amenity") || has(t, "shop") || has(t, "leisure"),
    },
    Rule {
        primitive: ElementKind::Node,
        entity_type: EntityType::District,
        matches: |t| {
            matches!(
                tag(t, "place"),
                Some("town" | "village" | "hamlet" | "suburb" | "borough" | "neighbourhood")
            )
        },
    },
];

/// Repli par nature géométrique quand aucune règle ne s'applique
fn fallback(geometry: GeometryKind) -> EntityType {
    match geometry {
        GeometryKind::Point => EntityType::PointOfInterest,
        GeometryKind::Line => EntityType::Path,
        GeometryKind::Area => EntityType::Area,
    }
}

/// Classe un jeu de tags.
///
/// Les règles portent sur la nature de la primitive OSM; le repli porte sur
/// la géométrie effectivement produite (une relation est stockée en point).
pub fn classify(tags: &Tags, geometry: GeometryKind, primitive: ElementKind) -> EntityType {
    RULES
        .iter()
        .find(|rule| rule.primitive == primitive && (rule.matches)(tags))
        .map(|rule| rule.entity_type)
        .unwrap_or_else(|| fallback(geometry))
}

/// Sous-ensemble de la taxonomie accepté par le stockage
#[derive(Debug, Clone)]
pub struct SupportedTypes {
    types: HashSet<EntityType>,
}

impl Default for SupportedTypes {
    fn default() -> Self {
        Self::all()
    }
}

impl SupportedTypes {
    pub fn all() -> Self {
        Self {
            types: EntityType::ALL.iter().copied().collect(),
        }
    }

    /// Construit l'ensemble depuis des codes texte; les codes inconnus sont
    /// ignorés et le type fourre-tout est toujours présent
    pub fn from_codes<'a>(codes: impl IntoIterator<Item = &'a str>) -> Self {
        let mut types: HashSet<EntityType> =
            codes.into_iter().filter_map(|c| c.parse().ok()).collect();
        types.insert(EntityType::Unknown);
        Self { types }
    }

    pub fn contains(&self, entity_type: EntityType) -> bool {
        self.types.contains(&entity_type)
    }

    /// Retourne le type accepté et `true` s'il a fallu le remplacer
    pub fn coerce(&self, entity_type: EntityType) -> (EntityType, bool) {
        if self.contains(entity_type) {
            (entity_type, false)
        } else {
            (EntityType::Unknown, true)
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
