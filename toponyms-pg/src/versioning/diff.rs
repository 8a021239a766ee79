//! Calcul de hash pour comparaison de géométries
//!
//! Deux versions successives d'une primitive dont la géométrie n'a pas bougé
//! (au dixième de mètre près) produisent le même hash: la nouvelle version
//! réutilise alors l'entité existante.

use blake3::Hasher;
use geo::{CoordsIter, Geometry};

/// Calcule un hash stable d'une géométrie
pub fn geometry_hash(geom: &Geometry<f64>) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(geometry_tag(geom));
    for coord in geom.coords_iter() {
        hash_coord(&mut hasher, coord.x, coord.y);
    }
    *hasher.finalize().as_bytes()
}

fn geometry_tag(geom: &Geometry<f64>) -> &'static [u8] {
    match geom {
        Geometry::Point(_) => b"POINT",
        Geometry::Line(_) => b"LINE",
        Geometry::LineString(_) => b"LINESTRING",
        Geometry::Polygon(_) => b"POLYGON",
        Geometry::MultiPoint(_) => b"MULTIPOINT",
        Geometry::MultiLineString(_) => b"MULTILINESTRING",
        Geometry::MultiPolygon(_) => b"MULTIPOLYGON",
        Geometry::GeometryCollection(_) => b"COLLECTION",
        Geometry::Rect(_) => b"RECT",
        Geometry::Triangle(_) => b"TRIANGLE",
    }
}

/// Hash une coordonnée avec arrondi pour stabilité
fn hash_coord(hasher: &mut Hasher, x: f64, y: f64) {
    // 6 décimales en degrés, environ 10 cm
    let x = (x * 1_000_000.0).round() as i64;
    let y = (y * 1_000_000.0).round() as i64;
    hasher.update(&x.to_le_bytes());
    hasher.update(&y.to_le_bytes());
}

/// Compare un hash stocké en base avec un hash calculé
pub fn hash_matches(stored: &[u8], computed: &[u8; 32]) -> bool {
    stored == computed.as_slice()
}

/// Convertit un hash en hexadécimal
pub fn hash_to_hex(hash: &[u8; 32]) -> String {
    hex::encode(hash)
}
