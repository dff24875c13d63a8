// src/rules.rs

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ValidationError;

/* =========================================
   Tabela progów eskalacji
   ========================================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Mute,
    Kick,
    Ban,
}

impl RuleAction {
    pub fn label(&self) -> &'static str {
        match self {
            RuleAction::Mute => "mute",
            RuleAction::Kick => "kick",
            RuleAction::Ban => "ban",
        }
    }
}

/// Jeden próg kary. `duration` ma znaczenie tylko dla `Mute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRule {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub threshold: u32,
    pub action: RuleAction,
    #[serde(default)]
    pub duration: Option<u32>,
}

impl EscalationRule {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.threshold == 0 {
            return Err(ValidationError::ZeroThreshold);
        }
        Ok(())
    }
}

/// Reguła aktywna dla sumy `total`: najwyższy próg nieprzekraczający sumy.
/// Przy równych progach wygrywa późniejszy wpis.
pub fn select_rule(rules: &[EscalationRule], total: u32) -> Option<&EscalationRule> {
    rules
        .iter()
        .filter(|r| r.threshold >= 1 && total >= r.threshold)
        .max_by_key(|r| r.threshold)
}

/* =========================================
   Seam źródła reguł
   ========================================= */

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Tylko-do-odczytu w trakcie ewaluacji; edycja przychodzi z dashboardu.
    async fn list(&self) -> Result<Vec<EscalationRule>>;
}

#[derive(Debug, Default)]
pub struct MemoryRules {
    rules: RwLock<Vec<EscalationRule>>,
}

impl MemoryRules {
    pub fn new(rules: Vec<EscalationRule>) -> Self {
        Self { rules: RwLock::new(sanitize(rules)) }
    }

    pub async fn replace(&self, rules: Vec<EscalationRule>) {
        *self.rules.write().await = sanitize(rules);
    }
}

/// Wpisy łamiące kontrakt progu odpadają na granicy, nie w ewaluacji.
fn sanitize(rules: Vec<EscalationRule>) -> Vec<EscalationRule> {
    rules
        .into_iter()
        .filter(|r| match r.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(rule_id = r.id, error=%e, "dropping invalid escalation rule");
                false
            }
        })
        .collect()
}

#[async_trait]
impl RuleStore for MemoryRules {
    async fn list(&self) -> Result<Vec<EscalationRule>> {
        Ok(self.rules.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: i64, threshold: u32, action: RuleAction) -> EscalationRule {
        EscalationRule { id, name: None, threshold, action, duration: Some(60) }
    }

    #[test]
    fn picks_highest_satisfied_threshold() {
        let rules = vec![
            rule(1, 10, RuleAction::Mute),
            rule(2, 20, RuleAction::Kick),
        ];
        // 15 pkt: mute(10), nie kick(20)
        let chosen = select_rule(&rules, 15).unwrap();
        assert_eq!(chosen.id, 1);

        let chosen = select_rule(&rules, 20).unwrap();
        assert_eq!(chosen.id, 2);

        assert!(select_rule(&rules, 9).is_none());
    }

    #[test]
    fn equal_thresholds_prefer_later_entry() {
        let rules = vec![
            rule(1, 10, RuleAction::Mute),
            rule(2, 10, RuleAction::Kick),
        ];
        assert_eq!(select_rule(&rules, 12).unwrap().id, 2);
    }

    #[tokio::test]
    async fn zero_threshold_rules_are_dropped_at_the_boundary() {
        let store = MemoryRules::new(vec![
            rule(1, 0, RuleAction::Ban),
            rule(2, 5, RuleAction::Mute),
        ]);
        let rules = store.list().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, 2);
    }
}
