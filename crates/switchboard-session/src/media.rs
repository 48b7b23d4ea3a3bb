// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Normalized inbound-message events, with small media inlined.
//!
//! Media below the per-kind ceiling is downloaded and base64-encoded into
//! the event. Anything larger, or anything whose download fails or outlasts
//! the task timeout, gets a deferred-download URL pointing back at the
//! gateway instead.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tracing::debug;

use switchboard_config::model::SessionConfig;
use switchboard_core::events::{InboundMessage, MediaAttachment, MessageContent};
use switchboard_core::types::StoredMessage;
use switchboard_core::{MediaKind, SessionClient, SwitchboardError};

const MB: u64 = 1024 * 1024;

/// Payload of a `message` webhook and room broadcast.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageEvent {
    pub message_id: String,
    pub from: String,
    pub to: String,
    pub is_group: bool,
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub timestamp: i64,
    pub is_from_me: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Base64 of the media bytes when inlined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_error: Option<String>,
}

/// Identity fields already resolved by the router.
pub struct Addressing<'a> {
    pub instance_id: &'a str,
    pub chat: &'a str,
    pub sender: &'a str,
    pub chat_name: Option<String>,
}

/// Largest media size inlined for `kind`, in bytes.
pub fn inline_limit(config: &SessionConfig, kind: MediaKind) -> u64 {
    let mb = match kind {
        MediaKind::Image => config.image_limit_mb,
        MediaKind::Video => config.video_limit_mb,
        MediaKind::Audio => config.audio_limit_mb,
        MediaKind::Document => config.document_limit_mb,
    };
    mb.saturating_mul(MB)
}

fn default_file_name(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "image.jpg",
        MediaKind::Video => "video.mp4",
        MediaKind::Audio => "audio.ogg",
        MediaKind::Document => "document",
    }
}

/// Gateway path serving a message's media on demand.
pub fn deferred_media_url(public_url: &str, instance_id: &str, message_id: &str) -> String {
    format!("{public_url}/instances/{instance_id}/messages/{message_id}/media")
}

/// Builds the webhook payload for one inbound message.
pub async fn build_message_event(
    client: Option<&dyn SessionClient>,
    config: &SessionConfig,
    public_url: &str,
    addressing: Addressing<'_>,
    message: &InboundMessage,
) -> MessageEvent {
    let mut event = MessageEvent {
        message_id: message.id.clone(),
        from: addressing.sender.to_string(),
        to: addressing.chat.to_string(),
        is_group: message.is_group,
        message_type: message.content.type_name().to_string(),
        timestamp: message.timestamp,
        is_from_me: message.from_me,
        sender_name: message.push_name.clone(),
        chat_name: addressing.chat_name,
        ..MessageEvent::default()
    };

    match &message.content {
        MessageContent::Text { text } => event.text = Some(text.clone()),
        MessageContent::Location {
            latitude,
            longitude,
            name,
            address,
        } => {
            event.latitude = Some(format!("{latitude:.6}"));
            event.longitude = Some(format!("{longitude:.6}"));
            event.location_name = name.clone();
            event.location_address = address.clone();
        }
        MessageContent::Media(media) => {
            let deferred = deferred_media_url(public_url, addressing.instance_id, &message.id);
            attach_media(&mut event, client, config, media, deferred).await;
        }
        MessageContent::Unsupported => {}
    }

    event
}

async fn attach_media(
    event: &mut MessageEvent,
    client: Option<&dyn SessionClient>,
    config: &SessionConfig,
    media: &MediaAttachment,
    deferred: String,
) {
    event.caption = media.caption.clone().filter(|c| !c.is_empty());
    event.file_name = Some(
        media
            .file_name
            .clone()
            .unwrap_or_else(|| default_file_name(media.kind).to_string()),
    );
    event.mime_type = media.mime_type.clone();
    event.file_size = Some(media.file_size);

    let limit = inline_limit(config, media.kind);
    if media.file_size >= limit {
        event.media_error = Some(format!(
            "file too large for inline delivery ({} bytes); download it from media_url",
            media.file_size
        ));
        event.media_url = Some(deferred);
        return;
    }
    if media.file_size == 0 {
        // Unknown size: never inline blindly.
        event.media_url = Some(deferred);
        return;
    }

    let Some(client) = client else {
        event.media_error = Some("session not available for download".to_string());
        event.media_url = Some(deferred);
        return;
    };

    let deadline = Duration::from_secs(config.task_timeout_secs);
    let download = match tokio::time::timeout(deadline, client.download_media(media)).await {
        Ok(result) => result,
        Err(_) => Err(SwitchboardError::Timeout { duration: deadline }),
    };
    match download {
        Ok(bytes) => {
            debug!(bytes = bytes.len(), kind = %media.kind, "media inlined");
            event.media_data = Some(STANDARD.encode(bytes));
        }
        Err(e) => {
            event.media_error = Some(format!("error downloading file: {e}"));
            event.media_url = Some(deferred);
        }
    }
}

/// The persisted form of an inbound or history message.
pub fn stored_message(
    instance_id: &str,
    message: &InboundMessage,
    chat: &str,
    sender: &str,
    status: &str,
) -> StoredMessage {
    let media = match &message.content {
        MessageContent::Media(media) => serde_json::to_string(media).ok(),
        _ => None,
    };

    StoredMessage {
        id: message.id.clone(),
        instance_id: instance_id.to_string(),
        chat: chat.to_string(),
        sender: sender.to_string(),
        from_me: message.from_me,
        message_type: message.content.type_name().to_string(),
        content: message.content.summary(),
        push_name: message.push_name.clone(),
        timestamp: message.timestamp,
        status: status.to_string(),
        media,
    }
}

#[cfg(test)]
mod tests {
    use switchboard_test_utils::MockSessionClient;

    use super::*;

    fn message(content: MessageContent) -> InboundMessage {
        InboundMessage {
            id: "m1".into(),
            chat: "555@s".into(),
            sender: "555@s".into(),
            sender_alt: None,
            is_group: false,
            from_me: false,
            push_name: Some("Ana".into()),
            timestamp: 1_700_000_000,
            content,
        }
    }

    fn image(size: u64) -> MessageContent {
        MessageContent::Media(MediaAttachment {
            kind: MediaKind::Image,
            caption: Some("look".into()),
            mime_type: Some("image/jpeg".into()),
            file_name: None,
            file_size: size,
            handle: serde_json::Value::Null,
        })
    }

    fn addressing() -> Addressing<'static> {
        Addressing {
            instance_id: "t1",
            chat: "555@s",
            sender: "555@s",
            chat_name: None,
        }
    }

    #[tokio::test]
    async fn small_media_is_inlined() {
        let client = MockSessionClient::new("t1");
        client.set_media(vec![1, 2, 3]);
        let config = SessionConfig::default();

        let event = build_message_event(
            Some(&client as &dyn SessionClient),
            &config,
            "",
            addressing(),
            &message(image(3)),
        )
        .await;
        assert_eq!(event.media_data.as_deref(), Some("AQID"));
        assert_eq!(event.file_name.as_deref(), Some("image.jpg"));
        assert_eq!(event.caption.as_deref(), Some("look"));
        assert!(event.media_url.is_none());
    }

    #[tokio::test]
    async fn large_media_gets_deferred_url() {
        let config = SessionConfig::default();
        let size = inline_limit(&config, MediaKind::Image);

        let event = build_message_event(
            None,
            &config,
            "https://gw.example.com",
            addressing(),
            &message(image(size)),
        )
        .await;
        assert_eq!(
            event.media_url.as_deref(),
            Some("https://gw.example.com/instances/t1/messages/m1/media")
        );
        assert!(event.media_error.unwrap().contains("too large"));
        assert!(event.media_data.is_none());
    }

    #[tokio::test]
    async fn failed_download_falls_back_to_url() {
        let client = MockSessionClient::new("t1");
        let config = SessionConfig::default();

        let event =
            build_message_event(Some(&client as &dyn SessionClient), &config, "", addressing(), &message(image(10)))
                .await;
        assert!(
            event
                .media_error
                .unwrap()
                .starts_with("error downloading file")
        );
        assert_eq!(
            event.media_url.as_deref(),
            Some("/instances/t1/messages/m1/media")
        );
    }

    #[tokio::test]
    async fn slow_download_falls_back_to_url() {
        let client = MockSessionClient::new("t1");
        client.set_media(vec![1, 2, 3]);
        client.set_media_delay(Duration::from_secs(3));
        let config = SessionConfig {
            task_timeout_secs: 1,
            ..SessionConfig::default()
        };

        let event = build_message_event(
            Some(&client as &dyn SessionClient),
            &config,
            "",
            addressing(),
            &message(image(3)),
        )
        .await;
        assert!(event.media_data.is_none());
        assert!(event.media_error.unwrap().starts_with("error downloading file"));
        assert_eq!(
            event.media_url.as_deref(),
            Some("/instances/t1/messages/m1/media")
        );
    }

    #[tokio::test]
    async fn location_is_formatted_to_six_places() {
        let config = SessionConfig::default();
        let event = build_message_event(
            None,
            &config,
            "",
            addressing(),
            &message(MessageContent::Location {
                latitude: 1.5,
                longitude: -2.25,
                name: Some("Cafe".into()),
                address: None,
            }),
        )
        .await;
        assert_eq!(event.latitude.as_deref(), Some("1.500000"));
        assert_eq!(event.longitude.as_deref(), Some("-2.250000"));
        assert_eq!(event.message_type, "location");
    }

    #[test]
    fn stored_message_keeps_media_handle() {
        let stored = stored_message("t1", &message(image(3)), "555@s", "555@s", "received");
        assert_eq!(stored.content, "look");
        assert_eq!(stored.message_type, "image");
        assert!(stored.media.unwrap().contains("image/jpeg"));
    }
}
