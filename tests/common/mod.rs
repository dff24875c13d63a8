// Wspólne atrapy seamów dla testów integracyjnych.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use vigil_guard::classifier::{BatchItem, Classifier, ClassifyOptions, ImageData, Verdict};
use vigil_guard::enforce::Enforcement;
use vigil_guard::error::{ClassifierError, EnforceError};
use vigil_guard::message::{MessageHandle, ReplyHandle};
use vigil_guard::notify::{AuditEntry, DirectMessage, Notifier};

/* ===================== Notifier ===================== */

#[derive(Default)]
pub struct RecordingNotifier {
    pub audits: Mutex<Vec<AuditEntry>>,
    pub dms: Mutex<Vec<(u64, DirectMessage)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn audit_titles(&self) -> Vec<String> {
        self.audits.lock().unwrap().iter().map(|e| e.title.clone()).collect()
    }

    pub fn audit_count(&self) -> usize {
        self.audits.lock().unwrap().len()
    }

    pub fn dm_count(&self) -> usize {
        self.dms.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn direct_message(&self, user_id: u64, message: DirectMessage) -> bool {
        self.dms.lock().unwrap().push((user_id, message));
        true
    }

    async fn audit_log(&self, entry: AuditEntry) -> Result<()> {
        self.audits.lock().unwrap().push(entry);
        Ok(())
    }
}

/* ===================== Enforcement ===================== */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnforcementCall {
    Timeout { user_id: u64, minutes: Option<u64> },
    Kick(u64),
    Ban(u64),
}

#[derive(Default)]
pub struct MockEnforcer {
    pub calls: Mutex<Vec<EnforcementCall>>,
    deny_reason: Mutex<Option<String>>,
}

impl MockEnforcer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Od teraz każda akcja kończy się `NotPermitted`.
    pub fn deny(&self, reason: &str) {
        *self.deny_reason.lock().unwrap() = Some(reason.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn check_denied(&self) -> Result<(), EnforceError> {
        if let Some(reason) = self.deny_reason.lock().unwrap().clone() {
            return Err(EnforceError::NotPermitted(reason));
        }
        Ok(())
    }
}

#[async_trait]
impl Enforcement for MockEnforcer {
    async fn timeout(
        &self,
        user_id: u64,
        duration: Option<Duration>,
        _reason: &str,
    ) -> Result<(), EnforceError> {
        self.check_denied()?;
        self.calls.lock().unwrap().push(EnforcementCall::Timeout {
            user_id,
            minutes: duration.map(|d| d.as_secs() / 60),
        });
        Ok(())
    }

    async fn kick(&self, user_id: u64, _reason: &str) -> Result<(), EnforceError> {
        self.check_denied()?;
        self.calls.lock().unwrap().push(EnforcementCall::Kick(user_id));
        Ok(())
    }

    async fn ban(&self, user_id: u64, _reason: &str) -> Result<(), EnforceError> {
        self.check_denied()?;
        self.calls.lock().unwrap().push(EnforcementCall::Ban(user_id));
        Ok(())
    }
}

/* ===================== Classifier ===================== */

#[derive(Default)]
pub struct ScriptedClassifier {
    verdicts: Mutex<HashMap<u64, Verdict>>,
    /// Identyfikatory wiadomości z każdego wywołania wsadowego.
    pub batch_calls: Mutex<Vec<Vec<u64>>>,
    fail: AtomicBool,
}

impl ScriptedClassifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, message_id: u64, severity: u8, reason: &str) {
        self.verdicts.lock().unwrap().insert(
            message_id,
            Verdict {
                violation: true,
                reason: reason.to_string(),
                severity,
                comment: None,
            },
        );
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.batch_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn analyze_one(
        &self,
        _text: &str,
        _image: Option<&ImageData>,
        _options: &ClassifyOptions,
    ) -> Result<Verdict, ClassifierError> {
        Ok(Verdict { violation: false, reason: "ok".into(), severity: 0, comment: None })
    }

    async fn analyze_batch(
        &self,
        items: &[BatchItem],
        _options: &ClassifyOptions,
    ) -> Result<HashMap<u64, Verdict>, ClassifierError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(ClassifierError::Transport("scripted outage".into()));
        }
        let ids: Vec<u64> = items.iter().map(|i| i.message_id).collect();
        self.batch_calls.lock().unwrap().push(ids.clone());
        let verdicts = self.verdicts.lock().unwrap();
        Ok(ids
            .into_iter()
            .filter_map(|id| verdicts.get(&id).map(|v| (id, v.clone())))
            .collect())
    }
}

/* ===================== Wiadomości ===================== */

pub struct TestReply {
    pub content: String,
    pub expired: AtomicBool,
}

struct TestReplyHandle(Arc<TestReply>);

#[async_trait]
impl ReplyHandle for TestReplyHandle {
    async fn expire(&self) -> Result<()> {
        self.0.expired.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct TestMessage {
    pub id: u64,
    pub channel: u64,
    pub author: u64,
    pub author_name: String,
    pub content: String,
    pub seen_marks: AtomicUsize,
    pub deleted: AtomicBool,
    pub replies: Mutex<Vec<Arc<TestReply>>>,
}

impl TestMessage {
    pub fn new(id: u64, channel: u64, author: u64, content: &str) -> Arc<Self> {
        Arc::new(Self {
            id,
            channel,
            author,
            author_name: format!("user-{author}"),
            content: content.to_string(),
            seen_marks: AtomicUsize::new(0),
            deleted: AtomicBool::new(false),
            replies: Mutex::new(Vec::new()),
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    pub fn reply_count(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    pub fn last_reply(&self) -> Option<Arc<TestReply>> {
        self.replies.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MessageHandle for TestMessage {
    fn id(&self) -> u64 {
        self.id
    }

    fn channel_id(&self) -> u64 {
        self.channel
    }

    fn author_id(&self) -> u64 {
        self.author
    }

    fn author_name(&self) -> &str {
        &self.author_name
    }

    fn content(&self) -> &str {
        &self.content
    }

    async fn mark_seen(&self) -> Result<()> {
        self.seen_marks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        self.deleted.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn reply(&self, content: &str) -> Result<Box<dyn ReplyHandle>> {
        let reply = Arc::new(TestReply {
            content: content.to_string(),
            expired: AtomicBool::new(false),
        });
        self.replies.lock().unwrap().push(reply.clone());
        Ok(Box::new(TestReplyHandle(reply)))
    }
}
