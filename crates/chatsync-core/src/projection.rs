//! Message projection
//!
//! Maps wire-level [`MessageRecord`]s into the display model the chat
//! screen renders. Only `text` and `photo` have a real projection; every
//! other kind degrades to a raw-text echo of its content, which matches
//! what the deployed client shows for them today.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::identity::DerivedKey;
use crate::types::{MessageKind, MessageRecord};

/// Fixed display height of an inline photo
pub const PHOTO_HEIGHT: f32 = 200.0;

/// Display geometry of the rendering surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayMetrics {
    /// Logical width of the screen in points
    pub screen_width: f32,
}

impl Default for DisplayMetrics {
    fn default() -> Self {
        Self {
            screen_width: 390.0,
        }
    }
}

/// Renderable message body
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayBody {
    /// Plain text
    Text(String),
    /// Inline photo, sized to one third of the screen width
    Photo {
        url: String,
        width: f32,
        height: f32,
    },
}

/// A message ready for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMessage {
    pub id: String,
    pub sender_key: DerivedKey,
    pub sender_name: String,
    pub sent_at: DateTime<Utc>,
    pub body: DisplayBody,
}

impl DisplayMessage {
    /// The text content, or the URL for a photo
    pub fn content(&self) -> &str {
        match &self.body {
            DisplayBody::Text(text) => text,
            DisplayBody::Photo { url, .. } => url,
        }
    }
}

/// Project a wire record into the display model.
///
/// Never fails: unsupported kinds echo their raw content as text and an
/// unparseable date renders as the epoch rather than poisoning the whole
/// feed.
pub fn project(record: &MessageRecord, metrics: &DisplayMetrics) -> DisplayMessage {
    let body = match record.kind {
        MessageKind::Text => DisplayBody::Text(record.content.clone()),
        MessageKind::Photo => DisplayBody::Photo {
            url: record.content.clone(),
            width: metrics.screen_width / 3.0,
            height: PHOTO_HEIGHT,
        },
        other => {
            debug!(kind = ?other, id = %record.id, "unsupported message kind, echoing raw content");
            DisplayBody::Text(record.content.clone())
        }
    };

    let sent_at = DateTime::parse_from_rfc3339(&record.date)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH);

    DisplayMessage {
        id: record.id.clone(),
        sender_key: DerivedKey::new(record.sender_email.clone()),
        sender_name: record.name.clone(),
        sent_at,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: MessageKind, content: &str) -> MessageRecord {
        MessageRecord {
            id: "01H".to_string(),
            kind,
            content: content.to_string(),
            date: "2026-02-03T04:05:06Z".to_string(),
            sender_email: "a-x-com".to_string(),
            is_read: false,
            name: "Alice".to_string(),
        }
    }

    #[test]
    fn test_text_projection() {
        let msg = project(&record(MessageKind::Text, "hi"), &DisplayMetrics::default());
        assert_eq!(msg.body, DisplayBody::Text("hi".to_string()));
        assert_eq!(msg.content(), "hi");
        assert_eq!(msg.sender_key.as_str(), "a-x-com");
    }

    #[test]
    fn test_photo_projection_sizes_to_third_of_width() {
        let metrics = DisplayMetrics {
            screen_width: 300.0,
        };
        let msg = project(&record(MessageKind::Photo, "https://cdn/x.png"), &metrics);
        assert_eq!(
            msg.body,
            DisplayBody::Photo {
                url: "https://cdn/x.png".to_string(),
                width: 100.0,
                height: PHOTO_HEIGHT,
            }
        );
    }

    #[test]
    fn test_unsupported_kinds_echo_raw_content() {
        for kind in [
            MessageKind::AttributedText,
            MessageKind::Video,
            MessageKind::Location,
            MessageKind::Emoji,
            MessageKind::Audio,
            MessageKind::Contact,
            MessageKind::LinkPreview,
            MessageKind::Custom,
        ] {
            let msg = project(&record(kind, "raw"), &DisplayMetrics::default());
            assert_eq!(msg.body, DisplayBody::Text("raw".to_string()));
        }
    }

    #[test]
    fn test_bad_date_degrades_to_epoch() {
        let mut rec = record(MessageKind::Text, "hi");
        rec.date = "not a date".to_string();
        let msg = project(&rec, &DisplayMetrics::default());
        assert_eq!(msg.sent_at, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_date_parses_to_utc() {
        let msg = project(&record(MessageKind::Text, "hi"), &DisplayMetrics::default());
        assert_eq!(msg.sent_at.to_rfc3339(), "2026-02-03T04:05:06+00:00");
    }
}
