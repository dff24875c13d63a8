// src/discord/mod.rs
//
// Adapter dostarczania dla Discorda: implementuje seamy Notifier /
// Enforcement / MessageHandle nad czystym `Http` (bez gatewaya –
// połączenie eventowe jest collaboratorem spoza tego crate'a).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serenity::all::*;
use serenity::http::Http;

use crate::config::Discord as DiscordSettings;
use crate::enforce::Enforcement;
use crate::error::EnforceError;
use crate::message::{MessageHandle, ReplyHandle};
use crate::notify::{AuditColor, AuditEntry, AuditKind, DirectMessage, Notifier};

const SYSTEM_NAME: &str = "Vigil Guard System™";

fn colour(c: AuditColor) -> Colour {
    match c {
        AuditColor::Blue => Colour::new(0x3498DB),
        AuditColor::Green => Colour::new(0x2ECC71),
        AuditColor::Orange => Colour::new(0xE67E22),
        AuditColor::Red => Colour::new(0xE74C3C),
        AuditColor::Grey => Colour::new(0x95A5A6),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut t = s[..max.saturating_sub(1)].to_string();
        t.push('…');
        t
    }
}

/* =========================================
   Notifier
   ========================================= */

pub struct DiscordNotifier {
    http: Arc<Http>,
    log_channel: Option<ChannelId>,
    mod_log_channel: Option<ChannelId>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>, settings: &DiscordSettings) -> Self {
        Self {
            http,
            log_channel: settings.log_channel_id.map(ChannelId::new),
            mod_log_channel: settings.mod_log_channel_id.map(ChannelId::new),
        }
    }

    /// Akcje moderacyjne idą na osobny kanał (jeśli skonfigurowany).
    fn route(&self, kind: AuditKind) -> Option<ChannelId> {
        match kind {
            AuditKind::Moderation => self.mod_log_channel.or(self.log_channel),
            AuditKind::Monitor | AuditKind::System => self.log_channel,
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn direct_message(&self, user_id: u64, message: DirectMessage) -> bool {
        let mut e = CreateEmbed::new()
            .title(message.title.clone())
            .colour(colour(AuditColor::Orange))
            .footer(CreateEmbedFooter::new(SYSTEM_NAME));
        if !message.body.is_empty() {
            e = e.description(truncate(&message.body, 1400));
        }
        for f in &message.fields {
            e = e.field(f.name.clone(), truncate(&f.value, 900), false);
        }

        match UserId::new(user_id).create_dm_channel(&self.http).await {
            Ok(ch) => ch
                .id
                .send_message(&self.http, CreateMessage::new().embed(e))
                .await
                .is_ok(),
            Err(_) => false,
        }
    }

    async fn audit_log(&self, entry: AuditEntry) -> Result<()> {
        let Some(channel) = self.route(entry.kind) else {
            // Brak kanału logów nie jest błędem przepływu.
            return Ok(());
        };

        let mut e = CreateEmbed::new()
            .title(entry.title.clone())
            .description(truncate(&entry.description, 3500))
            .colour(colour(entry.color))
            .timestamp(Timestamp::now())
            .footer(CreateEmbedFooter::new(SYSTEM_NAME));
        for f in &entry.fields {
            e = e.field(f.name.clone(), truncate(&f.value, 900), true);
        }

        channel
            .send_message(&self.http, CreateMessage::new().embed(e))
            .await?;
        Ok(())
    }
}

/* =========================================
   Enforcement
   ========================================= */

pub struct DiscordEnforcer {
    http: Arc<Http>,
    guild_id: GuildId,
}

impl DiscordEnforcer {
    pub fn new(http: Arc<Http>, guild_id: u64) -> Self {
        Self { http, guild_id: GuildId::new(guild_id) }
    }
}

fn map_enforce_err(e: serenity::Error) -> EnforceError {
    if let serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(resp)) = &e {
        if resp.status_code.as_u16() == 403 {
            return EnforceError::NotPermitted(resp.error.message.clone());
        }
    }
    EnforceError::Transport(e.to_string())
}

#[async_trait]
impl Enforcement for DiscordEnforcer {
    async fn timeout(
        &self,
        user_id: u64,
        duration: Option<Duration>,
        _reason: &str,
    ) -> Result<(), EnforceError> {
        let mut member = self
            .guild_id
            .member(&self.http, UserId::new(user_id))
            .await
            .map_err(map_enforce_err)?;

        match duration {
            Some(d) => {
                let until = Utc::now() + chrono::Duration::milliseconds(d.as_millis() as i64);
                member
                    .disable_communication_until_datetime(&self.http, until.into())
                    .await
                    .map_err(map_enforce_err)
            }
            // None = zdejmij aktywną blokadę.
            None => member
                .enable_communication(&self.http)
                .await
                .map_err(map_enforce_err),
        }
    }

    async fn kick(&self, user_id: u64, reason: &str) -> Result<(), EnforceError> {
        self.guild_id
            .kick_with_reason(
                &self.http,
                UserId::new(user_id),
                &format!("[{SYSTEM_NAME}] {reason}"),
            )
            .await
            .map_err(map_enforce_err)
    }

    async fn ban(&self, user_id: u64, reason: &str) -> Result<(), EnforceError> {
        let del_days = 0u8;
        self.guild_id
            .ban_with_reason(
                &self.http,
                UserId::new(user_id),
                del_days,
                &format!("[{SYSTEM_NAME}] {reason}"),
            )
            .await
            .map_err(map_enforce_err)
    }
}

/* =========================================
   Uchwyt wiadomości
   ========================================= */

pub struct DiscordMessage {
    http: Arc<Http>,
    channel_id: ChannelId,
    message_id: MessageId,
    author_id: UserId,
    author_name: String,
    content: String,
}

impl DiscordMessage {
    pub fn new(
        http: Arc<Http>,
        channel_id: u64,
        message_id: u64,
        author_id: u64,
        author_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            http,
            channel_id: ChannelId::new(channel_id),
            message_id: MessageId::new(message_id),
            author_id: UserId::new(author_id),
            author_name: author_name.into(),
            content: content.into(),
        }
    }
}

pub struct DiscordReply {
    http: Arc<Http>,
    channel_id: ChannelId,
    message_id: MessageId,
}

#[async_trait]
impl ReplyHandle for DiscordReply {
    async fn expire(&self) -> Result<()> {
        self.channel_id
            .delete_message(&self.http, self.message_id)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageHandle for DiscordMessage {
    fn id(&self) -> u64 {
        self.message_id.get()
    }

    fn channel_id(&self) -> u64 {
        self.channel_id.get()
    }

    fn author_id(&self) -> u64 {
        self.author_id.get()
    }

    fn author_name(&self) -> &str {
        &self.author_name
    }

    fn content(&self) -> &str {
        &self.content
    }

    async fn mark_seen(&self) -> Result<()> {
        self.http
            .create_reaction(
                self.channel_id,
                self.message_id,
                &ReactionType::Unicode("👀".to_string()),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        self.channel_id
            .delete_message(&self.http, self.message_id)
            .await?;
        Ok(())
    }

    async fn reply(&self, content: &str) -> Result<Box<dyn ReplyHandle>> {
        let sent = self
            .channel_id
            .send_message(
                &self.http,
                CreateMessage::new()
                    .content(content)
                    .reference_message(MessageReference::from((self.channel_id, self.message_id)))
                    .allowed_mentions(
                        CreateAllowedMentions::new().all_users(true).replied_user(true),
                    ),
            )
            .await?;
        Ok(Box::new(DiscordReply {
            http: self.http.clone(),
            channel_id: sent.channel_id,
            message_id: sent.id,
        }))
    }
}
