//! Décodeurs de flux de primitives

pub mod jsonl;
pub mod pbf;

use std::path::Path;

use crate::types::Primitive;
use crate::OsmHistError;

pub use jsonl::JsonlDecoder;
pub use pbf::PbfDecoder;

/// Format d'entrée déduit du nom de fichier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Extrait PBF (.osm.pbf ou .osh.pbf)
    Pbf,
    /// Journal JSON lines, éventuellement compressé en bzip2
    Jsonl { compressed: bool },
}

impl InputFormat {
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let (stem, compressed) = match name.strip_suffix(".bz2") {
            Some(stem) => (stem, true),
            None => (name.as_str(), false),
        };

        if stem.ends_with(".pbf") && !compressed {
            Some(Self::Pbf)
        } else if stem.ends_with(".jsonl") || stem.ends_with(".ndjson") {
            Some(Self::Jsonl { compressed })
        } else {
            None
        }
    }
}

/// Flux de primitives, quel que soit le format d'entrée
pub enum Decoder {
    Pbf(PbfDecoder),
    Jsonl(JsonlDecoder),
}

impl Decoder {
    pub fn open(path: &Path) -> Result<Self, OsmHistError> {
        if !path.exists() {
            return Err(OsmHistError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }

        match InputFormat::detect(path) {
            Some(InputFormat::Pbf) => Ok(Self::Pbf(PbfDecoder::open(path)?)),
            Some(InputFormat::Jsonl { compressed }) => {
                Ok(Self::Jsonl(JsonlDecoder::open(path, compressed)?))
            }
            None => Err(OsmHistError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Nombre d'enregistrements ignorés depuis l'ouverture
    pub fn corrupt_records(&self) -> usize {
        match self {
            Self::Pbf(d) => d.corrupt_records(),
            Self::Jsonl(d) => d.corrupt_records(),
        }
    }
}

impl Iterator for Decoder {
    type Item = Result<Primitive, OsmHistError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Pbf(d) => d.next(),
            Self::Jsonl(d) => d.next(),
        }
    }
}
