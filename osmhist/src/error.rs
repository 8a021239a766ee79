//! Types d'erreurs pour le crate osmhist

use std::path::PathBuf;

use thiserror::Error;

/// Erreurs pouvant survenir lors de la lecture d'un historique OSM
#[derive(Debug, Error)]
pub enum OsmHistError {
    /// Erreur d'I/O à l'ouverture ou à l'écriture d'un fichier
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Flux tronqué ou illisible: la lecture s'arrête
    #[error("Unreadable stream {path}: {reason}")]
    Stream { path: PathBuf, reason: String },

    /// Enregistrement isolé mal formé: ignoré, la lecture continue
    #[error("Malformed record at byte {offset}: {cause}")]
    Decode { offset: u64, cause: String },

    /// Extension de fichier non reconnue
    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(PathBuf),

    /// Échec de sérialisation d'une primitive
    #[error("Failed to encode primitive {kind}/{id}: {reason}")]
    Encode {
        kind: &'static str,
        id: i64,
        reason: String,
    },
}

impl OsmHistError {
    /// Crée une erreur de flux avec contexte
    pub fn stream(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Stream {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de décodage d'enregistrement
    pub fn decode(offset: u64, cause: impl Into<String>) -> Self {
        Self::Decode {
            offset,
            cause: cause.into(),
        }
    }

    /// Une erreur fatale termine l'itération; les autres sont comptées puis ignorées
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_is_recoverable() {
        let err = OsmHistError::decode(4096, "zlib stream corrupted");
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Malformed record at byte 4096: zlib stream corrupted"
        );
    }

    #[test]
    fn test_stream_is_fatal() {
        let err = OsmHistError::stream("region.osh.pbf", "unexpected end of file");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("region.osh.pbf"));
    }
}
