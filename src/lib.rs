// src/lib.rs

pub mod alert;
pub mod batcher;
pub mod classifier;
pub mod config;
pub mod discord;
pub mod enforce;
pub mod error;
pub mod escalate;
pub mod ledger;
pub mod logging;
pub mod message;
pub mod notify;
pub mod rules;
pub mod warn;
pub mod watch;

use std::sync::Arc;

use anyhow::{Result, bail};

use crate::alert::AlertGate;
use crate::batcher::MessageBatcher;
use crate::classifier::Classifier;
use crate::config::{Settings, SettingsStore, SharedConfig};
use crate::enforce::Enforcement;
use crate::escalate::EscalationEngine;
use crate::ledger::ReputationLedger;
use crate::notify::Notifier;
use crate::rules::RuleStore;
use crate::warn::PunishmentFlow;
use crate::watch::Monitor;

/// Zewnętrzni współpracownicy wpinani w seamy pipeline'u. Trwały magazyn,
/// klasyfikator i dostarczanie są wymienne – crate niczego o nich nie
/// zakłada poza kontraktem traitów.
pub struct Collaborators {
    pub ledger: Arc<dyn ReputationLedger>,
    pub rules: Arc<dyn RuleStore>,
    pub store: Arc<dyn SettingsStore>,
    pub classifier: Arc<dyn Classifier>,
    pub notifier: Arc<dyn Notifier>,
    pub enforcement: Arc<dyn Enforcement>,
}

/// Globalny kontekst aplikacji: ustawienia procesu, typowana konfiguracja
/// moderacji i zmontowane komponenty pipeline'u.
pub struct AppContext {
    pub settings: Settings,
    pub config: SharedConfig,
    store: Arc<dyn SettingsStore>,
    engine: Arc<EscalationEngine>,
    flow: Arc<PunishmentFlow>,
    gate: Arc<AlertGate>,
    batcher: Arc<MessageBatcher>,
    monitor: Arc<Monitor>,
}

impl AppContext {
    /// Bootstrap całej aplikacji:
    /// - logi
    /// - typowana konfiguracja z worka ustawień (parsowana raz)
    /// - kontrola poświadczeń (brak = odmowa startu)
    /// - montaż komponentów
    pub async fn bootstrap(settings: Settings, ext: Collaborators) -> Result<Arc<Self>> {
        logging::init(&settings);

        let config = SharedConfig::default();
        config.reload(ext.store.as_ref()).await;

        if config.snapshot().ai_enabled && settings.classifier.api_keys.is_empty() {
            bail!("classifier credentials missing; configure classifier.api_keys or set aiEnabled=false");
        }

        let engine = Arc::new(EscalationEngine::new(
            ext.rules.clone(),
            ext.enforcement.clone(),
            ext.notifier.clone(),
        ));
        let flow = Arc::new(PunishmentFlow::new(
            ext.ledger.clone(),
            engine.clone(),
            ext.notifier.clone(),
            ext.enforcement.clone(),
            config.clone(),
        ));
        let gate = AlertGate::new(ext.notifier.clone());
        let batcher = MessageBatcher::new(ext.classifier.clone(), gate.clone(), config.clone());
        let monitor = Arc::new(Monitor::new(
            batcher.clone(),
            ext.ledger.clone(),
            config.clone(),
        ));

        Ok(Arc::new(Self {
            settings,
            config,
            store: ext.store,
            engine,
            flow,
            gate,
            batcher,
            monitor,
        }))
    }

    pub fn flow(&self) -> Arc<PunishmentFlow> {
        self.flow.clone()
    }

    pub fn engine(&self) -> Arc<EscalationEngine> {
        self.engine.clone()
    }

    pub fn alert_gate(&self) -> Arc<AlertGate> {
        self.gate.clone()
    }

    pub fn batcher(&self) -> Arc<MessageBatcher> {
        self.batcher.clone()
    }

    pub fn monitor(&self) -> Arc<Monitor> {
        self.monitor.clone()
    }

    /// Przeładuj typowaną konfigurację po zmianie ustawień w dashboardzie.
    pub async fn reload_config(&self) {
        self.config.reload(self.store.as_ref()).await;
    }

    /// Środowisko: "production" | "development".
    /// Czytamy z ENV `VG_ENV`; brak → "development".
    #[inline]
    pub fn env(&self) -> String {
        std::env::var("VG_ENV").unwrap_or_else(|_| "development".to_string())
    }
}
