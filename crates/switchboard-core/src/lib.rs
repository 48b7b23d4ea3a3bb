// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Switchboard messaging gateway.
//!
//! This crate provides the error taxonomy, domain types, the session event
//! model, and the traits that separate the instance manager from its
//! collaborators (session clients, persistence, webhook and room fan-out).

pub mod error;
pub mod events;
pub mod phone;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ErrorKind, SwitchboardError};
pub use events::{MediaKind, OutgoingMessage, SessionEvent};
pub use types::{AdapterType, HealthStatus, Instance, LifecycleState, MessageId};

pub use traits::{
    Broadcaster, EventSink, EventStream, InstanceStore, JobQueue, KeyValueCache, MessageStore,
    PluginAdapter, ScheduleStore, SessionClient, SessionFactory, SessionRegistry, SettingsStore,
    StorageAdapter, Store, WebhookStore,
};

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::events::{InboundMessage, MediaAttachment, MessageContent};
    use crate::types::{MessageJob, WebhookConfig, event_types};

    #[test]
    fn error_kinds_cover_taxonomy() {
        assert_eq!(
            SwitchboardError::NotFound("t1".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            SwitchboardError::Conflict("t1".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            SwitchboardError::Unauthenticated("t1".into()).kind(),
            ErrorKind::Unauthenticated
        );
        assert_eq!(
            SwitchboardError::Validation("bad".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            SwitchboardError::transient("locked").kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            SwitchboardError::Timeout {
                duration: std::time::Duration::from_secs(1)
            }
            .kind(),
            ErrorKind::Transient
        );
        assert_eq!(SwitchboardError::Fatal("dlq".into()).kind(), ErrorKind::Fatal);
        assert_eq!(
            SwitchboardError::Storage {
                source: Box::new(std::io::Error::other("disk")),
            }
            .kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn only_transient_conditions_are_retryable() {
        assert!(SwitchboardError::transient("busy").is_retryable());
        assert!(!SwitchboardError::Validation("bad".into()).is_retryable());
        assert!(!SwitchboardError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn lifecycle_state_round_trips_lowercase() {
        for state in [
            LifecycleState::Disconnected,
            LifecycleState::Connecting,
            LifecycleState::Connected,
            LifecycleState::Authenticated,
            LifecycleState::Failed,
        ] {
            let s = state.to_string();
            assert_eq!(s, s.to_lowercase());
            assert_eq!(LifecycleState::from_str(&s).unwrap(), state);
        }
        assert!(LifecycleState::Authenticated.was_online());
        assert!(!LifecycleState::Failed.was_online());
    }

    #[test]
    fn message_job_uses_type_key() {
        let json = r#"{"instance_id":"t1","correlation_id":"c1","type":"text",
                       "payload":{"phone":"15551234567","message":"hi"},"retry_count":2}"#;
        let job: MessageJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.job_type, types::JobType::Text);
        assert_eq!(job.retry_count, 2);

        let back = serde_json::to_value(&job).unwrap();
        assert_eq!(back["type"], "text");
    }

    #[test]
    fn unknown_job_type_fails_to_parse() {
        let json = r#"{"instance_id":"t1","correlation_id":"c1","type":"sticker","payload":{}}"#;
        assert!(serde_json::from_str::<MessageJob>(json).is_err());
    }

    #[test]
    fn webhook_subscription_matching() {
        let mut config = WebhookConfig {
            instance_id: "t1".into(),
            url: "http://localhost".into(),
            events: vec![event_types::STATUS.into()],
            secret: None,
            enabled: true,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!(config.subscribes_to(event_types::STATUS));
        assert!(!config.subscribes_to(event_types::MESSAGE));

        config.events = vec![event_types::ALL.into()];
        assert!(config.subscribes_to(event_types::MESSAGE));
        assert!(config.subscribes_to(event_types::CALL));
    }

    #[test]
    fn session_event_decodes_tagged_json() {
        let json = r#"{"type":"pair_success","jid":"1234@s"}"#;
        let event: SessionEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            SessionEvent::PairSuccess {
                jid: "1234@s".into()
            }
        );

        let json = r#"{"type":"inbound_message","id":"m1","chat":"c@s","sender":"c@s",
                       "timestamp":10,"content":{"type":"media","kind":"image","file_size":4}}"#;
        let event: SessionEvent = serde_json::from_str(json).unwrap();
        match event {
            SessionEvent::InboundMessage(msg) => {
                assert_eq!(msg.content.type_name(), "image");
                assert_eq!(msg.content.summary(), "[Image]");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn content_summary_prefers_caption() {
        let content = MessageContent::Media(MediaAttachment {
            kind: MediaKind::Video,
            caption: Some("look".into()),
            mime_type: None,
            file_name: None,
            file_size: 0,
            handle: serde_json::Value::Null,
        });
        assert_eq!(content.summary(), "look");
        assert_eq!(content.text(), Some("look"));

        let msg = InboundMessage {
            id: "m".into(),
            chat: "c".into(),
            sender: "c".into(),
            sender_alt: None,
            is_group: false,
            from_me: false,
            push_name: None,
            timestamp: 0,
            content: MessageContent::Location {
                latitude: 1.0,
                longitude: 2.0,
                name: None,
                address: None,
            },
        };
        assert_eq!(msg.content.summary(), "[Location]");
        assert_eq!(msg.content.text(), None);
    }
}
