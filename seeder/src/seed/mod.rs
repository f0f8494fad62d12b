//! Seeding orchestrator
//!
//! Runs the stages in dependency order (users, chats, memberships, messages,
//! attachments, message-attachment links), writing every entity to both
//! stores. A rejected row is logged and counted; it never stops the run.

pub mod generators;

use chrono::Utc;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{Record, Store, Value};
use generators::{AttachmentAttrs, ChatAttrs, MessageAttrs, UserAttrs};

pub const USERS_TABLE: &str = "users";
pub const CHATS_TABLE: &str = "chats";
pub const MEMBERS_TABLE: &str = "chatmembersassociation";
pub const MESSAGES_TABLE: &str = "messages";
pub const ATTACHMENTS_TABLE: &str = "attachments";
pub const MESSAGE_ATTACHMENTS_TABLE: &str = "messageattachmentassociation";

/// Messages generated per unit of seed count.
const MESSAGES_PER_SEED: usize = 3;

/// Probability that a given user joins a given chat.
const MEMBERSHIP_PROBABILITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Users,
    Chats,
    Members,
    Messages,
    Attachments,
    MessageAttachments,
}

impl Stage {
    /// Run order.
    pub const ALL: [Stage; 6] = [
        Stage::Users,
        Stage::Chats,
        Stage::Members,
        Stage::Messages,
        Stage::Attachments,
        Stage::MessageAttachments,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Users => "users",
            Stage::Chats => "chats",
            Stage::Members => "members",
            Stage::Messages => "messages",
            Stage::Attachments => "attachments",
            Stage::MessageAttachments => "message attachments",
        }
    }
}

/// How identifiers are encoded for a store.
#[derive(Debug, Clone, Copy)]
enum IdEncoding {
    /// Canonical hyphenated string
    Text,
    /// Store-native UUID
    Native,
}

impl IdEncoding {
    fn encode(self, id: Uuid) -> Value {
        match self {
            IdEncoding::Text => Value::Text(id.to_string()),
            IdEncoding::Native => Value::Uuid(id),
        }
    }
}

// ============================================================================
// Index and report
// ============================================================================

#[derive(Debug, Clone)]
pub struct SeededMessage {
    pub id: Uuid,
    /// Position of the chat in [`SeedIndex::chats`]
    pub chat: usize,
    /// Position of the author in [`SeedIndex::users`]
    pub author: usize,
    pub attrs: MessageAttrs,
}

/// Generation-time indexes. Position `i` of each list is ordinal `i + 1`.
#[derive(Debug, Default)]
pub struct SeedIndex {
    pub users: Vec<(Uuid, UserAttrs)>,
    pub chats: Vec<(Uuid, ChatAttrs)>,
    /// Member user positions per chat position
    pub members: Vec<Vec<usize>>,
    pub messages: Vec<SeededMessage>,
    pub attachments: Vec<(Uuid, AttachmentAttrs)>,
    /// (attachment position, message position)
    pub links: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub generated: usize,
    pub relational_written: usize,
    pub relational_failed: usize,
    pub wide_written: usize,
    pub wide_failed: usize,
}

/// Per-stage write tallies.
#[derive(Debug, Default)]
pub struct SeedReport {
    stages: Vec<(Stage, StageStats)>,
}

impl SeedReport {
    pub fn stage(&self, stage: Stage) -> StageStats {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, stats)| *stats)
            .unwrap_or_default()
    }

    pub fn total_failures(&self) -> usize {
        self.stages
            .iter()
            .map(|(_, s)| s.relational_failed + s.wide_failed)
            .sum()
    }

    fn entry(&mut self, stage: Stage) -> &mut StageStats {
        let pos = match self.stages.iter().position(|(s, _)| *s == stage) {
            Some(pos) => pos,
            None => {
                self.stages.push((stage, StageStats::default()));
                self.stages.len() - 1
            }
        };
        &mut self.stages[pos].1
    }

    fn record(&mut self, stage: Stage, relational_ok: bool, wide_ok: bool) {
        let stats = self.entry(stage);
        stats.generated += 1;
        if relational_ok {
            stats.relational_written += 1;
        } else {
            stats.relational_failed += 1;
        }
        if wide_ok {
            stats.wide_written += 1;
        } else {
            stats.wide_failed += 1;
        }
    }

    pub fn log_summary(&self) {
        for stage in Stage::ALL {
            let s = self.stage(stage);
            info!(
                stage = stage.label(),
                generated = s.generated,
                relational_written = s.relational_written,
                relational_failed = s.relational_failed,
                wide_written = s.wide_written,
                wide_failed = s.wide_failed,
                "Stage summary"
            );
        }
        let failures = self.total_failures();
        if failures > 0 {
            warn!(failures, "Seeding finished with rejected rows");
        } else {
            info!("Seeding finished");
        }
    }
}

// ============================================================================
// Seeder
// ============================================================================

pub struct Seeder<'a, R, W> {
    relational: &'a R,
    wide: &'a W,
    rng: StdRng,
    count: usize,
    index: SeedIndex,
    report: SeedReport,
}

impl<'a, R: Store, W: Store> Seeder<'a, R, W> {
    pub fn new(relational: &'a R, wide: &'a W, count: usize, rng: StdRng) -> Self {
        Self {
            relational,
            wide,
            rng,
            count,
            index: SeedIndex::default(),
            report: SeedReport::default(),
        }
    }

    /// Run every stage to completion, in order.
    pub async fn run(mut self) -> (SeedIndex, SeedReport) {
        for stage in Stage::ALL {
            match stage {
                Stage::Users => self.seed_users().await,
                Stage::Chats => self.seed_chats().await,
                Stage::Members => self.seed_members().await,
                Stage::Messages => self.seed_messages().await,
                Stage::Attachments => self.seed_attachments().await,
                Stage::MessageAttachments => self.seed_message_attachments().await,
            }
            info!(stage = stage.label(), "{} done", stage.label());
        }
        (self.index, self.report)
    }

    /// Write one entity to both stores, each with its own id encoding.
    async fn write(&mut self, stage: Stage, table: &str, build: impl Fn(IdEncoding) -> Record) {
        let relational_ok = self
            .relational
            .insert_row(table, &build(IdEncoding::Text))
            .await;
        let wide_ok = self.wide.insert_row(table, &build(IdEncoding::Native)).await;
        self.report.record(stage, relational_ok, wide_ok);
    }

    async fn seed_users(&mut self) {
        for _ in 0..self.count {
            let id = Uuid::new_v4();
            let attrs = generators::user(&mut self.rng);
            self.write(Stage::Users, USERS_TABLE, |ids| {
                Record::new()
                    .with("user_id", ids.encode(id))
                    .merge(attrs.to_record())
            })
            .await;
            self.index.users.push((id, attrs));
        }
    }

    async fn seed_chats(&mut self) {
        for _ in 0..self.count {
            let id = Uuid::new_v4();
            let attrs = generators::chat(&mut self.rng);
            self.write(Stage::Chats, CHATS_TABLE, |ids| {
                Record::new()
                    .with("chat_id", ids.encode(id))
                    .merge(attrs.to_record())
            })
            .await;
            self.index.chats.push((id, attrs));
        }
    }

    async fn seed_members(&mut self) {
        let user_count = self.index.users.len();
        if user_count == 0 && !self.index.chats.is_empty() {
            warn!("No users to add to chats, skipping memberships");
        }

        for chat_pos in 0..self.index.chats.len() {
            let members = pick_members(&mut self.rng, user_count);
            let chat_id = self.index.chats[chat_pos].0;
            for &user_pos in &members {
                let user_id = self.index.users[user_pos].0;
                self.write(Stage::Members, MEMBERS_TABLE, |ids| {
                    Record::new()
                        .with("chat_id", ids.encode(chat_id))
                        .with("user_id", ids.encode(user_id))
                })
                .await;
            }
            self.index.members.push(members);
        }
    }

    async fn seed_messages(&mut self) {
        if self.index.chats.is_empty() {
            warn!("No chats to post in, skipping messages");
            return;
        }

        let now = Utc::now();
        for _ in 0..self.count * MESSAGES_PER_SEED {
            let chat = self.rng.gen_range(0..self.index.chats.len());
            let Some(&author) = self.index.members[chat].choose(&mut self.rng) else {
                warn!(chat_id = %self.index.chats[chat].0, "Chat has no members, skipping message");
                continue;
            };

            let id = Uuid::new_v4();
            let chat_id = self.index.chats[chat].0;
            let author_id = self.index.users[author].0;
            let attrs = generators::message(&mut self.rng, now);
            self.write(Stage::Messages, MESSAGES_TABLE, |ids| {
                Record::new()
                    .with("message_id", ids.encode(id))
                    .with("chat_id", ids.encode(chat_id))
                    .with("author_id", ids.encode(author_id))
                    .merge(attrs.to_record())
            })
            .await;
            self.index.messages.push(SeededMessage {
                id,
                chat,
                author,
                attrs,
            });
        }
    }

    async fn seed_attachments(&mut self) {
        for _ in 0..self.count {
            let id = Uuid::new_v4();
            let attrs = generators::attachment(&mut self.rng);
            self.write(Stage::Attachments, ATTACHMENTS_TABLE, |ids| {
                Record::new()
                    .with("attachment_id", ids.encode(id))
                    .merge(attrs.to_record())
            })
            .await;
            self.index.attachments.push((id, attrs));
        }
    }

    async fn seed_message_attachments(&mut self) {
        if self.index.messages.is_empty() {
            if !self.index.attachments.is_empty() {
                warn!("No messages to attach to, skipping attachment links");
            }
            return;
        }

        for attachment in 0..self.index.attachments.len() {
            let message = self.rng.gen_range(0..self.index.messages.len());
            let attachment_id = self.index.attachments[attachment].0;
            let message_id = self.index.messages[message].id;
            self.write(Stage::MessageAttachments, MESSAGE_ATTACHMENTS_TABLE, |ids| {
                Record::new()
                    .with("attachment_id", ids.encode(attachment_id))
                    .with("message_id", ids.encode(message_id))
            })
            .await;
            self.index.links.push((attachment, message));
        }
    }
}

/// Each user joins with probability one half; an empty draw is replaced by
/// a single random user so no chat is left without members.
fn pick_members<G: Rng + ?Sized>(rng: &mut G, user_count: usize) -> Vec<usize> {
    let mut members: Vec<usize> = (0..user_count)
        .filter(|_| rng.gen_bool(MEMBERSHIP_PROBABILITY))
        .collect();
    if members.is_empty() && user_count > 0 {
        members.push(rng.gen_range(0..user_count));
    }
    members
}
