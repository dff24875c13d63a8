// src/ledger.rs

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/* =========================================
   Kontrakty danych
   ========================================= */

/// Jedno zdarzenie karne. Niemutowalne po utworzeniu; znika tylko
/// przy `clear_punishments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub reason: String,
    pub points: u32,
    pub date: DateTime<Utc>,
    pub moderator: String,
}

impl Warning {
    /// Walidacja kontraktu PRZED jakąkolwiek mutacją stanu.
    pub fn new(
        reason: impl Into<String>,
        points: u32,
        moderator: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(ValidationError::EmptyReason);
        }
        if points == 0 {
            return Err(ValidationError::ZeroPoints);
        }
        Ok(Self {
            reason,
            points,
            date: Utc::now(),
            moderator: moderator.into(),
        })
    }
}

/// Agregat per użytkownik. Niezmiennik: `points == suma punktów ostrzeżeń`
/// po każdej mutacji (naruszany tylko przejściowo wewnątrz jednej
/// atomowej aktualizacji).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserReputation {
    pub user_id: u64,
    pub points: u32,
    /// Kolejność wstawiania = chronologiczna.
    pub warnings: Vec<Warning>,
}

impl UserReputation {
    pub fn consistent(&self) -> bool {
        self.points == self.warnings.iter().map(|w| w.points).sum::<u32>()
    }
}

/* =========================================
   Seam ledgera
   ========================================= */

#[async_trait]
pub trait ReputationLedger: Send + Sync {
    /// Dopisz ostrzeżenie i zwróć zaktualizowany agregat (świeża suma).
    async fn add_warning(&self, user_id: u64, warning: Warning) -> Result<UserReputation>;

    /// Brak wpisu = zerowa reputacja, nie błąd.
    async fn get_user(&self, user_id: u64) -> Result<UserReputation>;

    /// Wyzeruj punkty i usuń wszystkie ostrzeżenia. Idempotentne.
    async fn clear_punishments(&self, user_id: u64) -> Result<()>;
}

/* =========================================
   Implementacja pamięciowa
   ========================================= */

/// Domyślny collaborator bez trwałego magazynu (trwały store jest
/// zewnętrzny wobec tego crate'a). Mutacja odbywa się w całości pod
/// jednym guardem wpisu – czytelnik nigdy nie widzi stanu pośredniego.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    users: DashMap<u64, UserReputation>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReputationLedger for MemoryLedger {
    async fn add_warning(&self, user_id: u64, warning: Warning) -> Result<UserReputation> {
        let mut entry = self.users.entry(user_id).or_insert_with(|| UserReputation {
            user_id,
            ..Default::default()
        });
        entry.points += warning.points;
        entry.warnings.push(warning);
        Ok(entry.clone())
    }

    async fn get_user(&self, user_id: u64) -> Result<UserReputation> {
        Ok(self
            .users
            .get(&user_id)
            .map(|u| u.clone())
            .unwrap_or_else(|| UserReputation { user_id, ..Default::default() }))
    }

    async fn clear_punishments(&self, user_id: u64) -> Result<()> {
        self.users.remove(&user_id);
        Ok(())
    }
}
