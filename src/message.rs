// src/message.rs

use anyhow::Result;
use async_trait::async_trait;

/// Opakowanie odpowiedzi publicznej – pozwala ją później wygasić
/// (samokasująca się wiadomość).
#[async_trait]
pub trait ReplyHandle: Send + Sync {
    async fn expire(&self) -> Result<()>;
}

/// Nieprzezroczysty uchwyt na wiadomość źródłową. Batcher i gate nie znają
/// transportu – tylko reagowanie/kasowanie/odpowiadanie.
#[async_trait]
pub trait MessageHandle: Send + Sync {
    fn id(&self) -> u64;
    fn channel_id(&self) -> u64;
    fn author_id(&self) -> u64;
    fn author_name(&self) -> &str;
    fn content(&self) -> &str;

    /// Lekki znacznik „widziane” (reakcja). Best-effort.
    async fn mark_seen(&self) -> Result<()>;

    async fn delete(&self) -> Result<()>;

    /// Publiczna odpowiedź przypięta do tej wiadomości.
    async fn reply(&self, content: &str) -> Result<Box<dyn ReplyHandle>>;
}
