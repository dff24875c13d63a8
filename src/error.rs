// src/error.rs

use thiserror::Error;

/// Błąd egzekucji kary. `NotPermitted` wraca do przepływu jako dane
/// (ustrukturyzowany wynik), nigdy jako panic/throw.
#[derive(Debug, Error)]
pub enum EnforceError {
    #[error("not permitted: {0}")]
    NotPermitted(String),
    #[error("transport: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("no classifier credentials configured")]
    NoCredentials,
    #[error("transport: {0}")]
    Transport(String),
    #[error("malformed verdict payload: {0}")]
    BadPayload(String),
}

/// Naruszenie kontraktu wejścia – odrzucane synchronicznie,
/// zanim cokolwiek zostanie zapisane.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("reason must not be empty")]
    EmptyReason,
    #[error("points must be at least 1")]
    ZeroPoints,
    #[error("threshold must be at least 1")]
    ZeroThreshold,
}
