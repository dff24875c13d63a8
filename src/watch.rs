// src/watch.rs

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use moka::sync::Cache;
use tokio::time::Instant;
use tracing::debug;

use crate::batcher::{MessageBatcher, QueuedMessage};
use crate::classifier::ContextLine;
use crate::config::SharedConfig;
use crate::ledger::ReputationLedger;
use crate::message::MessageHandle;

pub const CONTEXT_LIMIT: usize = 20;
pub const CONTEXT_SNIPPET: usize = 5;
const CONTEXT_MAX_AGE: Duration = Duration::from_secs(10 * 60);
const CONTEXT_CHANNELS: u64 = 512;

/* =========================================
   Rejestr obserwowanych celów
   ========================================= */

#[derive(Debug, Clone, Copy)]
pub struct WatchFlags {
    pub detoxify: bool,
}

/// Przełączniki monitoringu per użytkownik i per kanał (dashboard /
/// komenda moderatora). Dopasowanie użytkownika ma pierwszeństwo.
#[derive(Debug, Default)]
pub struct WatchTargets {
    users: DashMap<u64, WatchFlags>,
    channels: DashMap<u64, WatchFlags>,
}

impl WatchTargets {
    pub fn set_user(&self, user_id: u64, enabled: bool, detoxify: bool) {
        if enabled {
            self.users.insert(user_id, WatchFlags { detoxify });
        } else {
            self.users.remove(&user_id);
        }
    }

    pub fn set_channel(&self, channel_id: u64, enabled: bool, detoxify: bool) {
        if enabled {
            self.channels.insert(channel_id, WatchFlags { detoxify });
        } else {
            self.channels.remove(&channel_id);
        }
    }

    pub fn flags_for(&self, author_id: u64, channel_id: u64) -> Option<WatchFlags> {
        self.users
            .get(&author_id)
            .map(|f| *f)
            .or_else(|| self.channels.get(&channel_id).map(|f| *f))
    }
}

/* =========================================
   Ograniczony cache kontekstu kanału
   ========================================= */

struct CachedLine {
    message_id: u64,
    at: Instant,
    line: ContextLine,
}

/// Per-kanałowy ring ostatnich wiadomości. Moka ogranicza liczbę kanałów
/// (LRU) i wygasza nieaktywne; ring sam przycina długość i wiek linii.
pub struct ContextCache {
    channels: Cache<u64, Arc<Mutex<VecDeque<CachedLine>>>>,
    limit: usize,
    max_age: Duration,
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(CONTEXT_LIMIT, CONTEXT_MAX_AGE)
    }
}

impl ContextCache {
    pub fn new(limit: usize, max_age: Duration) -> Self {
        let channels = Cache::builder()
            .max_capacity(CONTEXT_CHANNELS)
            .time_to_idle(max_age)
            .build();
        Self { channels, limit, max_age }
    }

    pub fn record(&self, channel_id: u64, message_id: u64, author: &str, content: &str) {
        // Pustych wiadomości nie cache'ujemy (np. same załączniki).
        if content.is_empty() {
            return;
        }
        let ring = self
            .channels
            .get_with(channel_id, || Arc::new(Mutex::new(VecDeque::new())));
        let mut ring = ring.lock().expect("context ring poisoned");
        ring.push_back(CachedLine {
            message_id,
            at: Instant::now(),
            line: ContextLine { author: author.to_string(), content: content.to_string() },
        });
        if let Some(cutoff) = Instant::now().checked_sub(self.max_age) {
            while ring.front().is_some_and(|l| l.at < cutoff) {
                ring.pop_front();
            }
        }
        while ring.len() > self.limit {
            ring.pop_front();
        }
    }

    /// Ostatnie `limit` linii sprzed wiadomości `before_id`
    /// (chronologicznie, najstarsza pierwsza).
    pub fn before(&self, channel_id: u64, before_id: u64, limit: usize) -> Vec<ContextLine> {
        let Some(ring) = self.channels.get(&channel_id) else {
            return Vec::new();
        };
        let ring = ring.lock().expect("context ring poisoned");
        let upto = ring
            .iter()
            .position(|l| l.message_id == before_id)
            .unwrap_or(ring.len());
        let skip = upto.saturating_sub(limit);
        ring.iter()
            .take(upto)
            .skip(skip)
            .map(|l| l.line.clone())
            .collect()
    }
}

/* =========================================
   Wejście pipeline'u monitoringu
   ========================================= */

pub struct Monitor {
    targets: WatchTargets,
    context: ContextCache,
    batcher: Arc<MessageBatcher>,
    ledger: Arc<dyn ReputationLedger>,
    config: SharedConfig,
}

impl Monitor {
    pub fn new(
        batcher: Arc<MessageBatcher>,
        ledger: Arc<dyn ReputationLedger>,
        config: SharedConfig,
    ) -> Self {
        Self {
            targets: WatchTargets::default(),
            context: ContextCache::default(),
            batcher,
            ledger,
            config,
        }
    }

    pub fn targets(&self) -> &WatchTargets {
        &self.targets
    }

    /// Każda wiadomość zasila kontekst; do klasyfikacji trafia tylko ruch
    /// obserwowany (użytkownik lub kanał) przy włączonym AI.
    pub async fn ingest(&self, message: Arc<dyn MessageHandle>) {
        let channel_id = message.channel_id();
        let author_id = message.author_id();
        self.context
            .record(channel_id, message.id(), message.author_name(), message.content());

        let Some(flags) = self.targets.flags_for(author_id, channel_id) else {
            return;
        };
        let cfg = self.config.snapshot();
        if !cfg.ai_enabled {
            return;
        }
        if message.content().is_empty() {
            // nic do analizy
            return;
        }

        let points_snapshot = match self.ledger.get_user(author_id).await {
            Ok(user) => user.points,
            Err(e) => {
                debug!(author_id, error=?e, "ledger read failed; snapshot=0");
                0
            }
        };
        let context = self.context.before(channel_id, message.id(), CONTEXT_SNIPPET);

        self.batcher.add(QueuedMessage {
            message,
            context,
            detoxify: flags.detoxify,
            points_snapshot,
            rules: cfg.ai_rules.clone(),
            prompt: cfg.ai_prompt.clone(),
            enqueued_at: Instant::now(),
        });
    }
}
