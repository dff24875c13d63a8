// src/warn.rs

use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use crate::config::SharedConfig;
use crate::enforce::Enforcement;
use crate::escalate::{EscalationEngine, EscalationOutcome};
use crate::ledger::{ReputationLedger, Warning};
use crate::notify::{AuditColor, AuditEntry, AuditKind, DirectMessage, Notifier};

pub const SYSTEM_NAME: &str = "Vigil Warn System";

/* =========================================
   Żądanie / raport
   ========================================= */

#[derive(Debug, Clone)]
pub struct WarnRequest {
    pub user_id: u64,
    /// Czytelny tag do podsumowania/audytu.
    pub user_tag: String,
    pub points: u32,
    pub reason: String,
    pub moderator: String,
}

#[derive(Debug, Clone)]
pub struct PunishmentReport {
    pub total_points: u32,
    pub escalation: EscalationOutcome,
    /// Moderator ZAWSZE dostaje czytelne podsumowanie – łącznie z tym,
    /// czy auto-eskalacja zadziałała.
    pub summary: String,
}

/* =========================================
   Przepływ kar
   ========================================= */

pub struct PunishmentFlow {
    ledger: Arc<dyn ReputationLedger>,
    engine: Arc<EscalationEngine>,
    notifier: Arc<dyn Notifier>,
    enforcement: Arc<dyn Enforcement>,
    config: SharedConfig,
}

impl PunishmentFlow {
    pub fn new(
        ledger: Arc<dyn ReputationLedger>,
        engine: Arc<EscalationEngine>,
        notifier: Arc<dyn Notifier>,
        enforcement: Arc<dyn Enforcement>,
        config: SharedConfig,
    ) -> Self {
        Self { ledger, engine, notifier, enforcement, config }
    }

    /// Pełny przepływ ostrzeżenia: walidacja -> ledger -> audyt -> DM ->
    /// eskalacja -> podsumowanie.
    pub async fn process_punishment(&self, req: WarnRequest) -> Result<PunishmentReport> {
        // Kontrakt odrzucany synchronicznie, zanim cokolwiek zapiszemy.
        let warning = Warning::new(req.reason.clone(), req.points, req.moderator.clone())?;

        let user = self.ledger.add_warning(req.user_id, warning).await?;

        let entry = AuditEntry::new(
            "User Warned",
            format!("User <@{}> was warned by {}", req.user_id, req.moderator),
            AuditColor::Orange,
            AuditKind::Moderation,
        )
        .field("Reason", req.reason.clone())
        .field("Points", format!("+{} (Total: {})", req.points, user.points));
        if let Err(e) = self.notifier.audit_log(entry).await {
            warn!(error=?e, "warn audit send failed");
        }

        // DM best-effort; zamknięte DM nie są błędem.
        let _ = self
            .notifier
            .direct_message(
                req.user_id,
                DirectMessage::new("You have been warned", "")
                    .field("Reason", req.reason.clone())
                    .field("Points Added", req.points.to_string())
                    .field("Total Points", user.points.to_string()),
            )
            .await;

        // Eskalacja widzi już świeżą sumę.
        let cfg = self.config.snapshot();
        let escalation = self.engine.evaluate(req.user_id, user.points, &cfg).await;

        let summary = format!(
            "✅ Warned {} for \"{}\" (+{} points). Total: {}.{}",
            req.user_tag,
            req.reason,
            req.points,
            user.points,
            escalation.summary_suffix()
        );

        Ok(PunishmentReport { total_points: user.points, escalation, summary })
    }

    /// Wyzeruj punkty i historię, zdejmij aktywną blokadę. Idempotentne.
    pub async fn clear_punishments(
        &self,
        user_id: u64,
        user_tag: &str,
        moderator: &str,
    ) -> Result<String> {
        self.ledger.clear_punishments(user_id).await?;
        self.engine.reset_marker(user_id);

        // Best-effort: jeśli nie mamy uprawnień, czyszczenie i tak się liczy.
        if let Err(e) = self
            .enforcement
            .timeout(user_id, None, "Punishments cleared")
            .await
        {
            warn!(user_id, error=%e, "could not lift active restriction on clear");
        }

        let entry = AuditEntry::new(
            "Punishments Cleared",
            format!("Punishments for {user_tag} were cleared by {moderator}"),
            AuditColor::Green,
            AuditKind::Moderation,
        )
        .field("User", format!("<@{user_id}> ({user_id})"))
        .field("Moderator", moderator.to_string());
        if let Err(e) = self.notifier.audit_log(entry).await {
            warn!(error=?e, "clear audit send failed");
        }

        Ok(format!("✅ Cleared points and active timeouts for {user_tag}."))
    }
}
