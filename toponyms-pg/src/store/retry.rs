//! Politique de nouvelle tentative à délai exponentiel borné

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::StoreError;

/// Paramètres de retry (délais en millisecondes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Nombre total d'appels, premier essai compris
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Délai avant la tentative suivant l'échec numéro `attempt` (1-indexé)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_backoff_ms as f64;
        let multiplied = base * self.backoff_multiplier.powi(exponent);
        let clamped = multiplied.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(clamped as u64)
    }

    /// Exécute `op` jusqu'au succès, à une erreur non transitoire, ou à
    /// épuisement des `max_attempts` appels
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(StoreError::RetryExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        last: Box::new(e),
                    })
                }
                Err(e) => {
                    let delay = self.backoff_for_attempt(attempt);
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient storage error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
