// src/alert.rs

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::classifier::Verdict;
use crate::config::{AlertAction, ModerationConfig};
use crate::message::MessageHandle;
use crate::notify::{AuditColor, AuditEntry, AuditKind, Notifier};

pub const COOLDOWN_WINDOW: Duration = Duration::from_millis(15_000);
pub const REPLY_TTL: Duration = Duration::from_millis(15_000);

/// Powyżej tego rozmiaru mapa stempli jest przy okazji odchudzana
/// z wpisów starszych niż okno (inaczej rośnie przez całe życie procesu).
const SWEEP_WATERMARK: usize = 256;

/* =========================================
   Gate + obsługa grupy naruszeń
   ========================================= */

/// Per-user limiter publicznych call-outów + zamiana zgrupowanego
/// naruszenia na obserwowalne efekty.
pub struct AlertGate {
    notifier: Arc<dyn Notifier>,
    last_alert: DashMap<u64, Instant>,
    window: Duration,
    reply_ttl: Duration,
}

impl AlertGate {
    pub fn new(notifier: Arc<dyn Notifier>) -> Arc<Self> {
        Self::with_tuning(notifier, COOLDOWN_WINDOW, REPLY_TTL)
    }

    pub fn with_tuning(
        notifier: Arc<dyn Notifier>,
        window: Duration,
        reply_ttl: Duration,
    ) -> Arc<Self> {
        Arc::new(Self { notifier, last_alert: DashMap::new(), window, reply_ttl })
    }

    /// Atomowy check-and-stamp: dwa wyścigujące się wsady tego samego
    /// autora nie przejdą oba przez bramkę.
    fn admit(&self, user_id: u64, now: Instant) -> bool {
        if self.last_alert.len() > SWEEP_WATERMARK {
            let window = self.window;
            self.last_alert
                .retain(|_, at| now.duration_since(*at) < window);
        }
        match self.last_alert.entry(user_id) {
            Entry::Occupied(mut e) => {
                if now.duration_since(*e.get()) < self.window {
                    false
                } else {
                    e.insert(now);
                    true
                }
            }
            Entry::Vacant(v) => {
                v.insert(now);
                true
            }
        }
    }

    pub async fn handle_group_violation(
        &self,
        author_id: u64,
        author_name: &str,
        messages: &[Arc<dyn MessageHandle>],
        verdict: Option<&Verdict>,
        cfg: &ModerationConfig,
    ) {
        let Some(verdict) = verdict else { return };
        let Some(last) = messages.last() else { return };

        if verdict.severity < cfg.ai_threshold {
            // Poniżej progu: celowo bez śladu audytowego (tylko debug).
            debug!(
                author_id,
                severity = verdict.severity,
                threshold = cfg.ai_threshold,
                "sub-threshold verdict dropped"
            );
            return;
        }

        // Znacznik „widziane” na każdej wiadomości grupy, best-effort.
        for msg in messages {
            if let Err(e) = msg.mark_seen().await {
                debug!(message_id = msg.id(), error=?e, "mark_seen failed");
            }
        }

        let admitted = self.admit(author_id, Instant::now());
        if admitted {
            // Jedna publiczna odpowiedź, przypięta do OSTATNIEJ wiadomości.
            let content = compose_alert(author_id, verdict, cfg.ai_ping_user);
            match last.reply(&content).await {
                Ok(reply) => {
                    // Samokasowanie po stałym czasie; podwójny delete jest
                    // tolerowany jako no-op.
                    let ttl = self.reply_ttl;
                    tokio::spawn(async move {
                        tokio::time::sleep(ttl).await;
                        if let Err(e) = reply.expire().await {
                            debug!(error=?e, "alert reply already gone");
                        }
                    });
                }
                Err(e) => warn!(author_id, error=?e, "failed to send alert reply"),
            }
        } else {
            debug!(author_id, "alert suppressed by cooldown");
        }

        // Kasowanie działa niezależnie od cooldownu; jedna porażka nie
        // przerywa reszty grupy.
        if cfg.ai_action == AlertAction::Delete {
            for msg in messages {
                if let Err(e) = msg.delete().await {
                    warn!(message_id = msg.id(), error=?e, "could not delete flagged message");
                }
            }
        }

        // Zawsze dokładnie jeden wpis audytowy o grupie.
        let mode = match cfg.ai_action {
            AlertAction::Log => "log",
            AlertAction::Delete => "delete",
        };
        let sample = clamp(last.content(), 200);
        let mut entry = AuditEntry::new(
            "AI Monitor Violation",
            format!("{author_name} (<@{author_id}>)"),
            AuditColor::Red,
            AuditKind::Monitor,
        )
        .field("Reason", verdict.reason.clone())
        .field("Severity", format!("{}/100", verdict.severity))
        .field("Messages", messages.len().to_string())
        .field("Sample", sample)
        .field("Mode", mode);
        if !admitted {
            entry = entry.field("Public reply", "suppressed (cooldown)");
        }
        if let Err(e) = self.notifier.audit_log(entry).await {
            warn!(error=?e, "violation audit send failed");
        }
    }
}

fn compose_alert(author_id: u64, verdict: &Verdict, ping: bool) -> String {
    let mention = if ping {
        format!("<@{author_id}> ")
    } else {
        String::new()
    };
    match &verdict.comment {
        Some(comment) => format!(
            "{mention}⚠️ **AI Monitor**\n> *\"{comment}\"*\n\n**Reason:** {} (Severity: {}/100)",
            verdict.reason, verdict.severity
        ),
        None => format!(
            "{mention}⚠️ **AI Monitor Alert**\nReason: {}\nSeverity: {}/100",
            verdict.reason, verdict.severity
        ),
    }
}

fn clamp(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
