//! Types de données pour le crate osmhist

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use geo::Coord;
use serde::{Deserialize, Serialize};

/// Tags d'une primitive (clés uniques, ordre déterministe)
pub type Tags = BTreeMap<String, String>;

/// Nature d'une primitive OSM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Métadonnées communes à toutes les versions de primitives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Identifiant OSM (unique par nature de primitive)
    pub id: i64,

    /// Numéro de version, croissant pour un même identifiant
    pub version: i32,

    /// Horodatage de la version (absent si le fichier n'a pas de métadonnées)
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Identifiant du contributeur
    #[serde(default)]
    pub author_id: Option<i64>,

    /// Identifiant du changeset
    #[serde(default)]
    pub change_group_id: i64,

    /// `false` pour les versions de suppression d'un historique
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl Meta {
    pub fn new(id: i64, version: i32) -> Self {
        Self {
            id,
            version,
            timestamp: None,
            author_id: None,
            change_group_id: 0,
            visible: true,
        }
    }
}

/// Version d'un nœud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub meta: Meta,
    #[serde(default)]
    pub tags: Tags,
    pub lon: f64,
    pub lat: f64,
}

impl Node {
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}

/// Version d'un chemin (liste ordonnée de références de nœuds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Way {
    pub meta: Meta,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub node_refs: Vec<i64>,
}

/// Membre d'une relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_type: ElementKind,
    pub member_id: i64,
    #[serde(default)]
    pub role: String,
}

/// Version d'une relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub meta: Meta,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub members: Vec<Member>,
}

/// Une version de primitive, dans l'ordre physique du fichier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Primitive {
    #[serde(rename = "node")]
    Point(Node),
    Way(Way),
    Relation(Relation),
}

impl Primitive {
    pub fn kind(&self) -> ElementKind {
        match self {
            Primitive::Point(_) => ElementKind::Node,
            Primitive::Way(_) => ElementKind::Way,
            Primitive::Relation(_) => ElementKind::Relation,
        }
    }

    pub fn meta(&self) -> &Meta {
        match self {
            Primitive::Point(n) => &n.meta,
            Primitive::Way(w) => &w.meta,
            Primitive::Relation(r) => &r.meta,
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Primitive::Point(n) => &n.tags,
            Primitive::Way(w) => &w.tags,
            Primitive::Relation(r) => &r.tags,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.meta().timestamp
    }
}
