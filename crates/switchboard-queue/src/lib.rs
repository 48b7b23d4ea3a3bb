// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reliable outbound send queue for the Switchboard gateway.
//!
//! Send requests flagged as asynchronous are validated, appended to a
//! durable queue and executed by one or more [`QueueWorker`] loops. The
//! delivery guarantee is at-least-once: a job is retried with linear
//! backoff until it succeeds or exhausts `max_retries`, at which point it
//! moves to the dead-letter queue. Either way the tenant receives a
//! `message_ack` webhook carrying the caller's correlation ID.

pub mod worker;

pub use worker::{JobOutcome, QueueWorker, QueuedJob};
