// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Switchboard integration tests.
//!
//! Provides mock session clients and recording capabilities so the instance
//! manager, queue worker and gateway can be exercised without a protocol
//! sidecar or webhook endpoint.
//!
//! # Components
//!
//! - [`MockSessionClient`] - session client with scripted send outcomes and injectable events
//! - [`MockSessionFactory`] - factory that hands out and remembers mock clients
//! - [`RecordingSink`] - event sink capturing every webhook event
//! - [`RecordingBroadcaster`] - broadcaster capturing every room message
//! - [`TestHarness`] - temp-database storage plus the mocks above

pub mod harness;
pub mod mock_session;
pub mod recording;

pub use harness::{TestHarness, wait_until};
pub use mock_session::{MockSessionClient, MockSessionFactory};
pub use recording::{RecordingBroadcaster, RecordingSink, RoomMessage};
