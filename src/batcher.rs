// src/batcher.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::alert::AlertGate;
use crate::classifier::{BatchItem, Classifier, ClassifyOptions, ContextLine, Verdict};
use crate::config::SharedConfig;
use crate::message::MessageHandle;

pub const BATCH_SIZE: usize = 5;
pub const DEBOUNCE: Duration = Duration::from_millis(3000);

/* =========================================
   Wpis kolejki monitoringu
   ========================================= */

pub struct QueuedMessage {
    pub message: Arc<dyn MessageHandle>,
    /// Migawka kontekstu kanału sprzed tej wiadomości (ograniczona).
    pub context: Vec<ContextLine>,
    pub detoxify: bool,
    /// Migawka reputacji autora w chwili zakolejkowania.
    pub points_snapshot: u32,
    pub rules: Option<String>,
    pub prompt: Option<String>,
    pub enqueued_at: Instant,
}

#[derive(Default)]
struct ChannelQueue {
    entries: Vec<QueuedMessage>,
    /// Znacznik ważności timera debounce. Każdy `add` wydaje nowy –
    /// timer z nieaktualnym znacznikiem jest no-opem (anulowanie).
    generation: u64,
}

/* =========================================
   Batcher
   ========================================= */

/// Skleja szybkie serie monitorowanych wiadomości per kanał w jedno
/// żądanie klasyfikacji. Stany kanału: Idle / Accumulating; flush po
/// debounce od OSTATNIEJ wiadomości albo natychmiast po dobiciu do
/// rozmiaru wsadu.
pub struct MessageBatcher {
    queues: DashMap<u64, ChannelQueue>,
    classifier: Arc<dyn Classifier>,
    gate: Arc<AlertGate>,
    config: SharedConfig,
    batch_size: usize,
    debounce: Duration,
    generations: AtomicU64,
}

impl MessageBatcher {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        gate: Arc<AlertGate>,
        config: SharedConfig,
    ) -> Arc<Self> {
        Self::with_tuning(classifier, gate, config, BATCH_SIZE, DEBOUNCE)
    }

    pub fn with_tuning(
        classifier: Arc<dyn Classifier>,
        gate: Arc<AlertGate>,
        config: SharedConfig,
        batch_size: usize,
        debounce: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            queues: DashMap::new(),
            classifier,
            gate,
            config,
            batch_size: batch_size.max(1),
            debounce,
            generations: AtomicU64::new(0),
        })
    }

    fn next_generation(&self) -> u64 {
        // Globalnie unikatowe – znacznik nigdy nie koliduje po odtworzeniu
        // wpisu kanału.
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Synchroniczna mutacja bufora – całość pod jednym guardem wpisu,
    /// żaden punkt zawieszenia nie rozcina read-modify-write.
    pub fn add(self: &Arc<Self>, msg: QueuedMessage) {
        let channel_id = msg.message.channel_id();
        let mut size_snapshot: Option<Vec<QueuedMessage>> = None;
        let mut timer_generation: Option<u64> = None;

        {
            let mut q = self.queues.entry(channel_id).or_default();
            q.entries.push(msg);
            let generation = self.next_generation();
            q.generation = generation;
            if q.entries.len() >= self.batch_size {
                // Flush rozmiarowy: migawka + wyczyszczenie jeszcze pod
                // guardem; nowy znacznik uśmierca wiszący timer.
                size_snapshot = Some(std::mem::take(&mut q.entries));
            } else {
                timer_generation = Some(generation);
            }
        }

        if let Some(batch) = size_snapshot {
            let this = self.clone();
            tokio::spawn(async move {
                this.process(channel_id, batch).await;
            });
        } else if let Some(generation) = timer_generation {
            let this = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(this.debounce).await;
                this.flush_expired(channel_id, generation).await;
            });
        }
    }

    /// Flush czasowy – odpala tylko jeśli od ustawienia timera nic nie
    /// doszło (debounce) i bufor nie został już opróżniony.
    async fn flush_expired(&self, channel_id: u64, generation: u64) {
        let snapshot = {
            let Some(mut q) = self.queues.get_mut(&channel_id) else {
                return;
            };
            if q.generation != generation || q.entries.is_empty() {
                return;
            }
            q.generation = self.next_generation();
            std::mem::take(&mut q.entries)
        };
        // Puste wpisy nie muszą żyć do końca procesu.
        self.queues.remove_if(&channel_id, |_, q| q.entries.is_empty());
        self.process(channel_id, snapshot).await;
    }

    async fn process(&self, channel_id: u64, batch: Vec<QueuedMessage>) {
        if batch.is_empty() {
            return;
        }
        debug!(channel_id, count = batch.len(), "processing message batch");

        // Kontekst i reguły bierzemy z PIERWSZEJ wiadomości wsadu –
        // świadome uproszczenie, sam wsad niesie resztę wiadomości.
        let options = ClassifyOptions {
            rules: batch[0].rules.clone(),
            prompt: batch[0].prompt.clone(),
            context: batch[0].context.clone(),
        };
        let items: Vec<BatchItem> = batch
            .iter()
            .map(|entry| BatchItem {
                message_id: entry.message.id(),
                author: entry.message.author_name().to_string(),
                content: entry.message.content().to_string(),
                detoxify: entry.detoxify,
                author_points: entry.points_snapshot,
            })
            .collect();

        let verdicts = match self.classifier.analyze_batch(&items, &options).await {
            Ok(v) => v,
            Err(e) => {
                // Fail open: niedostępność klasyfikatora nie blokuje ruchu,
                // wsad przepada bez retry i bez częściowej egzekucji.
                warn!(channel_id, error=%e, "classifier failed; dropping batch");
                return;
            }
        };

        // Grupuj naruszenia per autor; reprezentatywny werdykt = najwyższa
        // severity, remis rozstrzyga późniejsza wiadomość.
        struct Group {
            author_name: String,
            messages: Vec<Arc<dyn MessageHandle>>,
            best: Verdict,
        }
        let mut groups: Vec<(u64, Group)> = Vec::new();
        for entry in &batch {
            let Some(verdict) = verdicts.get(&entry.message.id()) else {
                continue;
            };
            if !verdict.violation {
                continue;
            }
            let author_id = entry.message.author_id();
            match groups.iter_mut().find(|(id, _)| *id == author_id) {
                Some((_, group)) => {
                    group.messages.push(entry.message.clone());
                    if verdict.severity >= group.best.severity {
                        group.best = verdict.clone();
                    }
                }
                None => groups.push((
                    author_id,
                    Group {
                        author_name: entry.message.author_name().to_string(),
                        messages: vec![entry.message.clone()],
                        best: verdict.clone(),
                    },
                )),
            }
        }

        let cfg = self.config.snapshot();
        for (author_id, group) in groups {
            self.gate
                .handle_group_violation(
                    author_id,
                    &group.author_name,
                    &group.messages,
                    Some(&group.best),
                    &cfg,
                )
                .await;
        }
    }
}
