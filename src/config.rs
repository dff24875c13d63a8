// src/config.rs

use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/* =========================================
   Ustawienia procesu (figment)
   ========================================= */

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub env: String,
    pub app: App,
    pub classifier: ClassifierSettings,
    pub discord: Discord,
    pub logging: Logging,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct App {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierSettings {
    pub endpoint: String,
    pub model: String,
    /// Pula kluczy – rotowane round-robin przy każdym wywołaniu.
    pub api_keys: Vec<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Discord {
    pub token: String,
    pub guild_id: Option<u64>,
    pub log_channel_id: Option<u64>,
    pub mod_log_channel_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    pub json: Option<bool>,
    pub level: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Które środowisko?
        let env = std::env::var("VG_ENV").unwrap_or_else(|_| "development".to_string());

        // Załaduj .env.<env> i .env (jeśli są)
        let _ = dotenvy::from_filename(format!(".env.{}", env));
        let _ = dotenvy::dotenv();

        // Domyślne wartości
        #[derive(Deserialize, Serialize)]
        struct Defaults {
            env: String,
            app: App,
            classifier: ClassifierSettings,
            discord: Discord,
            logging: Logging,
        }

        let defaults = Defaults {
            env: env.clone(),
            app: App { name: "Vigil Guard".into() },
            classifier: ClassifierSettings {
                endpoint: "https://openrouter.ai/api/v1/chat/completions".into(),
                model: "tngtech/deepseek-r1t2-chimera:free".into(),
                api_keys: vec![],
                timeout_secs: Some(15),
            },
            discord: Discord {
                token: "".into(),
                guild_id: None,
                log_channel_id: None,
                mod_log_channel_id: None,
            },
            logging: Logging { json: Some(false), level: Some("info".into()) },
        };

        // Warstwy: domyślne -> plik TOML -> zmienne środowiskowe VG_*
        let figment = Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(format!("config/{}.toml", env)))
            // VG_CLASSIFIER_ENDPOINT => classifier.endpoint itd.
            .merge(Env::prefixed("VG_").split("_"));

        let mut s: Settings = figment.extract()?;
        s.env = env;
        Ok(s)
    }
}

/* =========================================
   Seam magazynu ustawień (dashboard)
   ========================================= */

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemorySettings {
    values: DashMap<String, String>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(pairs: &[(&str, &str)]) -> Self {
        let store = Self::default();
        for (k, v) in pairs {
            store.values.insert((*k).to_string(), (*v).to_string());
        }
        store
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/* =========================================
   Typowana konfiguracja moderacji
   ========================================= */

/// Tryb reakcji na naruszenie wykryte przez klasyfikator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertAction {
    Log,
    Delete,
}

/// Wartości z luźnego worka klucz/wartość sparsowane RAZ na granicy.
/// Zepsuta wartość => default + warn, nigdy koercja per-odczyt.
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationConfig {
    pub auto_mute_threshold: u32,
    /// Minuty.
    pub auto_mute_duration: u32,
    pub ai_enabled: bool,
    /// Skala 0–100.
    pub ai_threshold: u8,
    pub ai_action: AlertAction,
    pub ai_ping_user: bool,
    pub ai_rules: Option<String>,
    pub ai_prompt: Option<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            auto_mute_threshold: 20,
            auto_mute_duration: 60,
            ai_enabled: true,
            ai_threshold: 60,
            ai_action: AlertAction::Log,
            ai_ping_user: true,
            ai_rules: None,
            ai_prompt: None,
        }
    }
}

impl ModerationConfig {
    pub async fn from_store(store: &dyn SettingsStore) -> Self {
        let def = Self::default();
        Self {
            auto_mute_threshold: read_u32(store, "autoMuteThreshold", def.auto_mute_threshold)
                .await,
            auto_mute_duration: read_u32(store, "autoMuteDuration", def.auto_mute_duration)
                .await
                .max(1),
            ai_enabled: read_bool(store, "aiEnabled", def.ai_enabled).await,
            ai_threshold: read_u32(store, "aiThreshold", def.ai_threshold as u32)
                .await
                .min(100) as u8,
            ai_action: read_action(store, "aiAction", def.ai_action).await,
            ai_ping_user: read_bool(store, "aiPingUser", def.ai_ping_user).await,
            ai_rules: read_text(store, "aiRules").await,
            ai_prompt: read_text(store, "aiPrompt").await,
        }
    }
}

async fn read_raw(store: &dyn SettingsStore, key: &str) -> Option<String> {
    match store.get(key).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(key, error=?e, "settings store read failed; using default");
            None
        }
    }
}

async fn read_text(store: &dyn SettingsStore, key: &str) -> Option<String> {
    read_raw(store, key)
        .await
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn read_bool(store: &dyn SettingsStore, key: &str, default: bool) -> bool {
    match read_raw(store, key).await.as_deref().map(str::trim) {
        None | Some("") => default,
        Some("true") => true,
        Some("false") => false,
        Some(other) => {
            tracing::warn!(key, value = other, "malformed bool setting; using default");
            default
        }
    }
}

async fn read_u32(store: &dyn SettingsStore, key: &str, default: u32) -> u32 {
    match read_raw(store, key).await.as_deref().map(str::trim) {
        None | Some("") => default,
        Some(raw) => match raw.parse::<u32>() {
            Ok(n) => n,
            Err(_) => {
                tracing::warn!(key, value = raw, "malformed numeric setting; using default");
                default
            }
        },
    }
}

async fn read_action(store: &dyn SettingsStore, key: &str, default: AlertAction) -> AlertAction {
    match read_raw(store, key).await.as_deref().map(str::trim) {
        None | Some("") => default,
        Some("log") => AlertAction::Log,
        Some("delete") => AlertAction::Delete,
        Some(other) => {
            tracing::warn!(key, value = other, "unknown aiAction; using default");
            default
        }
    }
}

/* =========================================
   Wymienialna migawka konfiguracji
   ========================================= */

/// Komponenty czytają spójną migawkę; dashboard podmienia całość
/// po przeładowaniu worka ustawień.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<ModerationConfig>>>,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(ModerationConfig::default())
    }
}

impl SharedConfig {
    pub fn new(config: ModerationConfig) -> Self {
        Self { inner: Arc::new(RwLock::new(Arc::new(config))) }
    }

    pub fn snapshot(&self) -> Arc<ModerationConfig> {
        self.inner.read().expect("config lock poisoned").clone()
    }

    pub fn replace(&self, config: ModerationConfig) {
        *self.inner.write().expect("config lock poisoned") = Arc::new(config);
    }

    pub async fn reload(&self, store: &dyn SettingsStore) {
        self.replace(ModerationConfig::from_store(store).await);
    }
}
