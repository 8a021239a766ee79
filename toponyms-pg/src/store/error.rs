//! Erreurs de la couche de stockage et leur classement transitoire / définitif

use std::error::Error as _;
use std::io;

use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Erreurs pouvant survenir lors des écritures PostgreSQL
#[derive(Debug, Error)]
pub enum StoreError {
    /// Erreur remontée par PostgreSQL ou par la connexion
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Erreur d'acquisition d'une connexion du pool
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// Base injoignable (toujours considérée transitoire)
    #[error("Database unavailable: {0}")]
    Unavailable(String),

    /// Géométrie impossible à encoder
    #[error("Invalid geometry for {osm_ref}: {reason}")]
    Geometry { osm_ref: String, reason: String },

    /// Tentatives épuisées sur une erreur transitoire
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last: Box<StoreError>,
    },
}

/// Codes SQLSTATE signalant une indisponibilité passagère
/// (classes 08, 53300, 57P01-57P03)
fn is_transient_state(code: &SqlState) -> bool {
    matches!(
        code.code(),
        "08000" | "08001" | "08003" | "08004" | "08006" | "53300" | "57P01" | "57P02" | "57P03"
    )
}

impl StoreError {
    pub fn geometry(osm_ref: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Geometry {
            osm_ref: osm_ref.into(),
            reason: reason.into(),
        }
    }

    /// Vrai si l'opération peut être rejouée (connexion refusée, coupée, expirée)
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(e) => is_transient_pg(e),
            Self::Pool(deadpool_postgres::PoolError::Timeout(_)) => true,
            Self::Pool(deadpool_postgres::PoolError::Backend(e)) => is_transient_pg(e),
            Self::Pool(_) => false,
            Self::Unavailable(_) => true,
            Self::Geometry { .. } | Self::RetryExhausted { .. } => false,
        }
    }
}

fn is_transient_pg(error: &tokio_postgres::Error) -> bool {
    if error.is_closed() {
        return true;
    }
    if let Some(code) = error.code() {
        return is_transient_state(code);
    }

    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return is_transient_io(io_error.kind());
        }
        source = cause.source();
    }
    false
}

fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
    )
}
