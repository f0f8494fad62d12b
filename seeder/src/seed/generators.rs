//! Synthetic attribute sets for each entity kind.
//!
//! Generators only depend on the random source they are handed; identifiers
//! and relationships are assigned by the orchestrator.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use fake::Fake;
use fake::faker::chrono::en::DateTimeBetween;
use fake::faker::internet::en::{DomainSuffix, SafeEmail, Username};
use fake::faker::lorem::en::{Paragraph, Word};
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use rand::Rng;

use crate::db::Record;

#[derive(Debug, Clone, PartialEq)]
pub struct UserAttrs {
    pub username: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub profile_picture_url: String,
}

impl UserAttrs {
    pub fn to_record(&self) -> Record {
        Record::new()
            .with("username", self.username.as_str())
            .with("name", self.name.as_str())
            .with("email", self.email.as_str())
            .with("phone_number", self.phone_number.as_str())
            .with("profile_picture_url", self.profile_picture_url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatAttrs {
    pub name: String,
    pub chat_picture_url: String,
}

impl ChatAttrs {
    pub fn to_record(&self) -> Record {
        Record::new()
            .with("name", self.name.as_str())
            .with("chat_picture_url", self.chat_picture_url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageAttrs {
    pub text: String,
    pub send_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl MessageAttrs {
    pub fn to_record(&self) -> Record {
        Record::new()
            .with("text", self.text.as_str())
            .with("send_at", self.send_at)
            .with("updated_at", self.updated_at)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentAttrs {
    pub attachment_url: String,
}

impl AttachmentAttrs {
    pub fn to_record(&self) -> Record {
        Record::new().with("attachment_url", self.attachment_url.as_str())
    }
}

/// A plausible site URL such as `https://www.dolor.net/`.
pub fn url<R: Rng + ?Sized>(rng: &mut R) -> String {
    let host: String = Word().fake_with_rng(rng);
    let suffix: String = DomainSuffix().fake_with_rng(rng);
    format!("https://www.{}.{}/", host.to_lowercase(), suffix)
}

pub fn user<R: Rng + ?Sized>(rng: &mut R) -> UserAttrs {
    UserAttrs {
        username: Username().fake_with_rng(rng),
        name: Name().fake_with_rng(rng),
        email: SafeEmail().fake_with_rng(rng),
        phone_number: PhoneNumber().fake_with_rng(rng),
        profile_picture_url: url(rng),
    }
}

pub fn chat<R: Rng + ?Sized>(rng: &mut R) -> ChatAttrs {
    let name: String = Name().fake_with_rng(rng);
    let word: String = Word().fake_with_rng(rng);
    ChatAttrs {
        name: format!("{}{}", name, word),
        chat_picture_url: url(rng),
    }
}

/// `send_at` falls between the Unix epoch and `now`; `updated_at` is never
/// earlier than `send_at` nor later than `now`.
pub fn message<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> MessageAttrs {
    let sent: DateTime<Utc> = DateTimeBetween(DateTime::<Utc>::UNIX_EPOCH, now).fake_with_rng(rng);
    let sent = whole_seconds(sent.min(now));

    let span = (now.naive_utc() - sent).num_seconds();
    let offset = if span > 0 { rng.gen_range(0..=span) } else { 0 };

    MessageAttrs {
        text: Paragraph(3..6).fake_with_rng(rng),
        send_at: sent,
        updated_at: sent + Duration::seconds(offset),
    }
}

pub fn attachment<R: Rng + ?Sized>(rng: &mut R) -> AttachmentAttrs {
    AttachmentAttrs {
        attachment_url: url(rng),
    }
}

/// Both stores keep at least second precision.
fn whole_seconds(dt: DateTime<Utc>) -> NaiveDateTime {
    DateTime::from_timestamp(dt.timestamp(), 0)
        .unwrap_or(dt)
        .naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_user_fields_are_populated() {
        let mut rng = StdRng::seed_from_u64(7);
        let user = user(&mut rng);

        assert!(!user.username.is_empty());
        assert!(!user.name.is_empty());
        assert!(user.email.contains('@'));
        assert!(!user.phone_number.is_empty());
        assert!(user.profile_picture_url.starts_with("https://www."));

        let record = user.to_record();
        let columns: Vec<_> = record.columns().collect();
        assert_eq!(
            columns,
            vec!["username", "name", "email", "phone_number", "profile_picture_url"]
        );
    }

    #[test]
    fn test_url_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let url = url(&mut rng);
            assert!(url.starts_with("https://www."), "{}", url);
            assert!(url.ends_with('/'), "{}", url);
            assert!(!url.contains(' '), "{}", url);
        }
    }

    #[test]
    fn test_message_timestamps_are_ordered() {
        let mut rng = StdRng::seed_from_u64(3);
        let now = Utc::now();
        for _ in 0..50 {
            let message = message(&mut rng, now);
            assert!(message.send_at <= message.updated_at);
            assert!(message.updated_at <= now.naive_utc());
            assert!(message.send_at >= DateTime::<Utc>::UNIX_EPOCH.naive_utc());
            assert!(!message.text.is_empty());
        }
    }

    #[test]
    fn test_chat_and_attachment() {
        let mut rng = StdRng::seed_from_u64(11);
        let chat = chat(&mut rng);
        assert!(!chat.name.is_empty());
        assert!(chat.chat_picture_url.starts_with("https://"));

        let attachment = attachment(&mut rng);
        assert!(attachment.attachment_url.starts_with("https://"));
        assert_eq!(attachment.to_record().len(), 1);
    }

    #[test]
    fn test_same_seed_same_output() {
        let a = user(&mut StdRng::seed_from_u64(99));
        let b = user(&mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
    }
}
