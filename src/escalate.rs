// src/escalate.rs

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::config::ModerationConfig;
use crate::enforce::Enforcement;
use crate::notify::{AuditColor, AuditEntry, AuditKind, DirectMessage, Notifier};
use crate::rules::{RuleAction, RuleStore, select_rule};

pub const SYSTEM_NAME: &str = "Vigil Escalation Engine";

/// Reguła mute bez czasu dostaje godzinę (zachowanie źródłowe).
const DEFAULT_MUTE_MINUTES: u32 = 60;

/* =========================================
   Wynik ewaluacji
   ========================================= */

#[derive(Debug, Clone, PartialEq)]
pub enum EscalationOutcome {
    /// Żaden próg nie pasuje – brak akcji, brak wpisu audytowego.
    None,
    Applied {
        action: RuleAction,
        threshold: u32,
        /// Minuty; tylko dla mute.
        duration_min: Option<u32>,
        default_rule: bool,
    },
    /// Ten sam próg był już zastosowany dla tego użytkownika –
    /// powtórna ewaluacja jest no-opem (guard na podwójną egzekucję).
    AlreadyApplied { threshold: u32 },
    /// Egzekucja się nie powiodła (brak uprawnień itp.). Nie rzucamy –
    /// wynik wraca do wywołującego moderatora, wpis audytowy już jest.
    Failed {
        action: RuleAction,
        threshold: u32,
        reason: String,
    },
}

impl EscalationOutcome {
    /// Dopisek do podsumowania dla moderatora.
    pub fn summary_suffix(&self) -> String {
        match self {
            EscalationOutcome::None => String::new(),
            EscalationOutcome::Applied { action, duration_min, default_rule, .. } => {
                let tail = if *default_rule { " (default rule)" } else { "" };
                match action {
                    RuleAction::Mute => format!(
                        "\n**User was also auto-muted for {} minutes{}.**",
                        duration_min.unwrap_or(1),
                        tail
                    ),
                    RuleAction::Kick => format!("\n**User was also auto-kicked{}.**", tail),
                    RuleAction::Ban => format!("\n**User was also auto-banned{}.**", tail),
                }
            }
            EscalationOutcome::AlreadyApplied { threshold } => {
                format!("\n*(escalation tier {threshold} already applied)*")
            }
            EscalationOutcome::Failed { action, reason, .. } => {
                format!("\n**(Auto-{} failed: {})**", action.label(), reason)
            }
        }
    }
}

/// Wewnętrzna postać wybranego progu (własna reguła albo default).
struct Tier {
    threshold: u32,
    action: RuleAction,
    duration_min: Option<u32>,
    rule_name: Option<String>,
    default_rule: bool,
}

/* =========================================
   Silnik
   ========================================= */

pub struct EscalationEngine {
    rules: Arc<dyn RuleStore>,
    enforcement: Arc<dyn Enforcement>,
    notifier: Arc<dyn Notifier>,
    /// user_id -> ostatnio zastosowany próg.
    last_applied: DashMap<u64, u32>,
}

impl EscalationEngine {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        enforcement: Arc<dyn Enforcement>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { rules, enforcement, notifier, last_applied: DashMap::new() }
    }

    /// `clear_punishments` zeruje marker – użytkownik może ponownie
    /// dobić do progu i ponownie dostać karę.
    pub fn reset_marker(&self, user_id: u64) {
        self.last_applied.remove(&user_id);
    }

    /// Wejście: suma punktów PO utrwaleniu wywołującego ostrzeżenia.
    pub async fn evaluate(
        &self,
        user_id: u64,
        new_total: u32,
        cfg: &ModerationConfig,
    ) -> EscalationOutcome {
        let Some(tier) = self.pick_tier(new_total, cfg).await else {
            return EscalationOutcome::None;
        };

        if self
            .last_applied
            .get(&user_id)
            .is_some_and(|t| *t == tier.threshold)
        {
            debug!(user_id, threshold = tier.threshold, "tier already applied; skipping");
            return EscalationOutcome::AlreadyApplied { threshold: tier.threshold };
        }

        let reason = if tier.default_rule {
            format!("Auto-punish (default): reached {} points", tier.threshold)
        } else {
            format!("Auto-punish: reached {} points", tier.threshold)
        };

        let result = match tier.action {
            RuleAction::Mute => {
                let minutes = tier.duration_min.unwrap_or(DEFAULT_MUTE_MINUTES).max(1) as u64;
                self.enforcement
                    .timeout(user_id, Some(Duration::from_secs(minutes * 60)), &reason)
                    .await
            }
            RuleAction::Kick => self.enforcement.kick(user_id, &reason).await,
            RuleAction::Ban => self.enforcement.ban(user_id, &reason).await,
        };

        match result {
            Ok(()) => {
                self.last_applied.insert(user_id, tier.threshold);
                // Dokładnie jeden wpis audytowy o zastosowanej akcji.
                self.audit_applied(user_id, new_total, &tier).await;
                // Best-effort DM – brak dostarczenia nie blokuje przepływu.
                let _ = self
                    .notifier
                    .direct_message(
                        user_id,
                        DirectMessage::new(
                            "Auto-Punishment Triggered",
                            format!(
                                "You have been {} for reaching {} points.",
                                action_description(&tier),
                                new_total
                            ),
                        ),
                    )
                    .await;
                EscalationOutcome::Applied {
                    action: tier.action,
                    threshold: tier.threshold,
                    duration_min: if tier.action == RuleAction::Mute {
                        Some(tier.duration_min.unwrap_or(DEFAULT_MUTE_MINUTES).max(1))
                    } else {
                        None
                    },
                    default_rule: tier.default_rule,
                }
            }
            Err(e) => {
                warn!(user_id, error=%e, "auto-punishment failed");
                self.audit_failed(user_id, &tier, &e.to_string()).await;
                EscalationOutcome::Failed {
                    action: tier.action,
                    threshold: tier.threshold,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn pick_tier(&self, total: u32, cfg: &ModerationConfig) -> Option<Tier> {
        let rules = match self.rules.list().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error=?e, "rule store unavailable; falling back to default rule");
                Vec::new()
            }
        };

        if let Some(rule) = select_rule(&rules, total) {
            return Some(Tier {
                threshold: rule.threshold,
                action: rule.action,
                duration_min: rule.duration,
                rule_name: rule.name.clone(),
                default_rule: false,
            });
        }

        // Globalna reguła domyślna: zawsze mute, tylko gdy próg > 0.
        if cfg.auto_mute_threshold > 0 && total >= cfg.auto_mute_threshold {
            return Some(Tier {
                threshold: cfg.auto_mute_threshold,
                action: RuleAction::Mute,
                duration_min: Some(cfg.auto_mute_duration.max(1)),
                rule_name: None,
                default_rule: true,
            });
        }
        None
    }

    async fn audit_applied(&self, user_id: u64, total: u32, tier: &Tier) {
        let title = match tier.action {
            RuleAction::Mute => "Auto-Mute",
            RuleAction::Kick => "Auto-Kick",
            RuleAction::Ban => "Auto-Ban",
        };
        let mut entry = AuditEntry::new(
            title,
            format!("User <@{user_id}> reached {total} points."),
            AuditColor::Red,
            AuditKind::Moderation,
        )
        .field("Action", action_description(tier))
        .field(
            "Rule",
            tier.rule_name.clone().unwrap_or_else(|| {
                if tier.default_rule {
                    "Default threshold".to_string()
                } else {
                    "Threshold rule".to_string()
                }
            }),
        );
        entry = entry.field("Threshold", tier.threshold.to_string());
        if let Err(e) = self.notifier.audit_log(entry).await {
            warn!(error=?e, "audit log send failed");
        }
    }

    async fn audit_failed(&self, user_id: u64, tier: &Tier, reason: &str) {
        let entry = AuditEntry::new(
            "Auto-Punishment Failed",
            format!(
                "Failed to apply {} to <@{user_id}>. Check enforcement permissions.",
                tier.action.label()
            ),
            AuditColor::Red,
            AuditKind::Moderation,
        )
        .field("Threshold", tier.threshold.to_string())
        .field("Error", reason.to_string());
        if let Err(e) = self.notifier.audit_log(entry).await {
            warn!(error=?e, "audit log send failed");
        }
    }
}

fn action_description(tier: &Tier) -> String {
    match tier.action {
        RuleAction::Mute => format!(
            "Muted for {} minutes",
            tier.duration_min.unwrap_or(DEFAULT_MUTE_MINUTES).max(1)
        ),
        RuleAction::Kick => "Kicked".to_string(),
        RuleAction::Ban => "Banned".to_string(),
    }
}
