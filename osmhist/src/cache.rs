//! Cache de coordonnées construit pendant la lecture
//!
//! Les chemins ne référencent leurs nœuds que par identifiant: le cache garde
//! la dernière position connue de chaque nœud retenu pour pouvoir résoudre
//! les géométries des chemins rencontrés plus loin dans le flux.
//!
//! Le cache n'est jamais purgé pendant une passe. Compter environ 40 octets
//! par nœud retenu (table de hachage comprise): une extraction régionale tient
//! en mémoire, un historique planétaire non filtré non.

use std::collections::HashMap;

use geo::{Centroid, Coord, LineString};

use crate::types::{ElementKind, Member};

/// Résultat de la résolution des références d'un chemin
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedWay {
    /// Coordonnées résolues, dans l'ordre des références
    pub coords: Vec<Coord<f64>>,
    /// Références absentes du cache (ignorées)
    pub missing: usize,
}

impl ResolvedWay {
    /// Une ligne exige au moins deux positions
    pub fn is_line(&self) -> bool {
        self.coords.len() >= 2
    }

    pub fn line(&self) -> Option<LineString<f64>> {
        self.is_line().then(|| LineString::new(self.coords.clone()))
    }

    /// Centroïde pondéré par la longueur, ou la position unique
    pub fn centroid(&self) -> Option<Coord<f64>> {
        match self.coords.len() {
            0 => None,
            1 => Some(self.coords[0]),
            _ => LineString::new(self.coords.clone())
                .centroid()
                .map(|p| p.0)
                .or_else(|| Some(self.coords[0])),
        }
    }
}

/// Cache identifiant de nœud → position
#[derive(Debug, Default)]
pub struct CoordinateCache {
    nodes: HashMap<i64, Coord<f64>>,
    way_centroids: HashMap<i64, Coord<f64>>,
}

impl CoordinateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enregistre (ou remplace) la position d'un nœud
    pub fn put(&mut self, node_id: i64, lon: f64, lat: f64) {
        self.nodes.insert(node_id, Coord { x: lon, y: lat });
    }

    pub fn resolve(&self, node_id: i64) -> Option<Coord<f64>> {
        self.nodes.get(&node_id).copied()
    }

    /// Retire un nœud supprimé
    pub fn evict(&mut self, node_id: i64) {
        self.nodes.remove(&node_id);
    }

    pub fn resolve_way(&self, node_refs: &[i64]) -> ResolvedWay {
        let mut resolved = ResolvedWay {
            coords: Vec::with_capacity(node_refs.len()),
            missing: 0,
        };
        for id in node_refs {
            match self.nodes.get(id) {
                Some(coord) => resolved.coords.push(*coord),
                None => resolved.missing += 1,
            }
        }
        resolved
    }

    /// Mémorise le centroïde d'un chemin pour les relations qui le référencent
    pub fn put_way_centroid(&mut self, way_id: i64, centroid: Coord<f64>) {
        self.way_centroids.insert(way_id, centroid);
    }

    pub fn way_centroid(&self, way_id: i64) -> Option<Coord<f64>> {
        self.way_centroids.get(&way_id).copied()
    }

    /// Moyenne des positions connues des membres (nœuds et chemins)
    pub fn member_centroid(&self, members: &[Member]) -> Option<Coord<f64>> {
        let (mut sum_x, mut sum_y, mut count) = (0.0, 0.0, 0usize);
        for member in members {
            let coord = match member.member_type {
                ElementKind::Node => self.resolve(member.member_id),
                ElementKind::Way => self.way_centroid(member.member_id),
                ElementKind::Relation => None,
            };
            if let Some(c) = coord {
                sum_x += c.x;
                sum_y += c.y;
                count += 1;
            }
        }
        (count > 0).then(|| Coord {
            x: sum_x / count as f64,
            y: sum_y / count as f64,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_before_put_is_none() {
        let mut cache = CoordinateCache::new();
        assert_eq!(cache.resolve(10), None);

        cache.put(10, 37.5, 47.1);
        assert_eq!(cache.resolve(10), Some(Coord { x: 37.5, y: 47.1 }));
        assert_eq!(cache.resolve(11), None);
    }

    #[test]
    fn test_newer_version_replaces_position() {
        let mut cache = CoordinateCache::new();
        cache.put(1, 37.0, 47.0);
        cache.put(1, 37.1, 47.1);
        assert_eq!(cache.resolve(1), Some(Coord { x: 37.1, y: 47.1 }));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evict() {
        let mut cache = CoordinateCache::new();
        cache.put(1, 37.0, 47.0);
        cache.evict(1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_resolve_way_drops_missing() {
        let mut cache = CoordinateCache::new();
        cache.put(1, 0.0, 0.0);
        cache.put(3, 2.0, 0.0);

        let resolved = cache.resolve_way(&[1, 2, 3]);
        assert_eq!(resolved.coords.len(), 2);
        assert_eq!(resolved.missing, 1);
        assert!(resolved.is_line());
        assert_eq!(resolved.centroid(), Some(Coord { x: 1.0, y: 0.0 }));
    }

    #[test]
    fn test_single_coordinate_is_not_a_line() {
        let mut cache = CoordinateCache::new();
        cache.put(1, 5.0, 6.0);

        let resolved = cache.resolve_way(&[1, 2]);
        assert!(!resolved.is_line());
        assert!(resolved.line().is_none());
        assert_eq!(resolved.centroid(), Some(Coord { x: 5.0, y: 6.0 }));
    }

    #[test]
    fn test_member_centroid() {
        let mut cache = CoordinateCache::new();
        cache.put(1, 0.0, 0.0);
        cache.put_way_centroid(20, Coord { x: 2.0, y: 4.0 });

        let members = vec![
            Member {
                member_type: ElementKind::Node,
                member_id: 1,
                role: "label".into(),
            },
            Member {
                member_type: ElementKind::Way,
                member_id: 20,
                role: "outer".into(),
            },
            Member {
                member_type: ElementKind::Relation,
                member_id: 300,
                role: "subarea".into(),
            },
        ];

        assert_eq!(
            cache.member_centroid(&members),
            Some(Coord { x: 1.0, y: 2.0 })
        );
        assert_eq!(cache.member_centroid(&members[2..]), None);
    }
}
