// src/notify.rs

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

/* =========================================
   Wpis audytowy
   ========================================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditColor {
    Blue,
    Green,
    Orange,
    Red,
    Grey,
}

/// Dokąd trafia wpis: log moderacyjny vs log ogólny.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    Moderation,
    Monitor,
    System,
}

#[derive(Debug, Clone)]
pub struct AuditField {
    pub name: String,
    pub value: String,
}

impl AuditField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub title: String,
    pub description: String,
    pub color: AuditColor,
    pub kind: AuditKind,
    pub fields: Vec<AuditField>,
}

impl AuditEntry {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        color: AuditColor,
        kind: AuditKind,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            color,
            kind,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(AuditField::new(name, value));
        self
    }
}

/// Prosta wiadomość DM (adapter renderuje ją jako embed z polami).
#[derive(Debug, Clone)]
pub struct DirectMessage {
    pub title: String,
    pub body: String,
    pub fields: Vec<AuditField>,
}

impl DirectMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { title: title.into(), body: body.into(), fields: Vec::new() }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(AuditField::new(name, value));
        self
    }
}

/* =========================================
   Seam dostarczania
   ========================================= */

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Best-effort DM. `false` = nie dostarczono (zamknięte DM itp.) –
    /// to NIE jest błąd przepływu.
    async fn direct_message(&self, user_id: u64, message: DirectMessage) -> bool;

    async fn audit_log(&self, entry: AuditEntry) -> Result<()>;
}

/// Wyślij wpis audytowy jako odłączone zadanie z własną granicą błędu –
/// gorąca ścieżka nie czeka na log-kanał.
pub fn audit_detached(notifier: Arc<dyn Notifier>, entry: AuditEntry) {
    tokio::spawn(async move {
        if let Err(e) = notifier.audit_log(entry).await {
            tracing::warn!(error=?e, "detached audit send failed");
        }
    });
}
