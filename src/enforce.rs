// src/enforce.rs

use std::time::Duration;

use async_trait::async_trait;

use crate::error::EnforceError;

/// Zdolności egzekucyjne konsumowane od platformy czatowej.
/// Każda może zwrócić `NotPermitted` – łapane i raportowane, nigdy panic.
#[async_trait]
pub trait Enforcement: Send + Sync {
    /// Czasowa blokada komunikacji. `None` zdejmuje aktywną blokadę.
    async fn timeout(
        &self,
        user_id: u64,
        duration: Option<Duration>,
        reason: &str,
    ) -> Result<(), EnforceError>;

    /// Usunięcie ze społeczności (użytkownik może wrócić).
    async fn kick(&self, user_id: u64, reason: &str) -> Result<(), EnforceError>;

    /// Permanentne usunięcie.
    async fn ban(&self, user_id: u64, reason: &str) -> Result<(), EnforceError>;
}
