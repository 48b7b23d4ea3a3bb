// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job admission and the worker loops.
//!
//! A job moves `queued -> processing` on pop, then ends in one of three
//! places: acked as sent, pushed back with `retry_count + 1`, or appended
//! to the dead-letter queue. Dead-lettered jobs are never consumed again.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use switchboard_config::model::QueueConfig;
use switchboard_core::types::{AckStatus, JobType, MessageAck, MessageJob, WebhookEvent, event_types};
use switchboard_core::{EventSink, JobQueue, SwitchboardError};
use switchboard_session::InstanceManager;
use switchboard_session::manager::outgoing_from_payload;

/// Admission receipt returned to the caller of `enqueue`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedJob {
    pub status: String,
    pub correlation_id: String,
}

/// Result of handling one popped entry.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Sent { message_id: String },
    /// Pushed back for another attempt.
    Retried { retry_count: u32 },
    DeadLettered { reason: String },
}

impl JobOutcome {
    fn metric_label(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::Retried { .. } => "retried",
            Self::DeadLettered { .. } => "dead_lettered",
        }
    }
}

/// Consumes the send queue through the instance manager.
///
/// Cheap to clone; every clone shares the same queue and collaborators.
#[derive(Clone)]
pub struct QueueWorker {
    queue: Arc<dyn JobQueue>,
    manager: InstanceManager,
    sink: Arc<dyn EventSink>,
    config: QueueConfig,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        manager: InstanceManager,
        sink: Arc<dyn EventSink>,
        config: QueueConfig,
    ) -> Self {
        Self {
            queue,
            manager,
            sink,
            config,
        }
    }

    /// Validates a send request and appends it to the work queue.
    ///
    /// A missing `correlation_id` gets a fresh UUID.
    pub async fn enqueue(
        &self,
        instance_id: &str,
        job_type: JobType,
        payload: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Result<QueuedJob, SwitchboardError> {
        self.manager.get(instance_id).await?;
        outgoing_from_payload(job_type, &payload)?;

        let correlation_id = correlation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let job = MessageJob {
            instance_id: instance_id.to_string(),
            correlation_id: correlation_id.clone(),
            job_type,
            payload,
            retry_count: 0,
        };
        self.queue
            .push(&self.config.queue_name, &encode(&job)?)
            .await?;

        debug!(instance_id, correlation_id = %correlation_id, job_type = %job_type, "job queued");
        Ok(QueuedJob {
            status: "queued".to_string(),
            correlation_id,
        })
    }

    /// Runs `config.workers` loops until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let workers = self.config.workers.max(1);
        info!(workers, queue = %self.config.queue_name, "queue workers starting");

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let worker = self.clone();
            let cancel = cancel.clone();
            set.spawn(async move { worker.work(worker_id, cancel).await });
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "queue worker panicked");
            }
        }
        info!("queue workers stopped");
    }

    async fn work(&self, worker_id: usize, cancel: CancellationToken) {
        let pop_backoff = Duration::from_secs(self.config.pop_error_backoff_secs);
        loop {
            let popped = tokio::select! {
                _ = cancel.cancelled() => break,
                popped = self.queue.pop(&self.config.queue_name) => popped,
            };

            match popped {
                Ok(raw) => {
                    self.process(raw).await;
                }
                Err(e) => {
                    error!(worker_id, error = %e, "failed to pop job");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(pop_backoff) => {}
                    }
                }
            }
        }
        debug!(worker_id, "queue worker exiting");
    }

    /// Pops one job, blocking until one is available, and processes it.
    pub async fn process_next(&self) -> Result<JobOutcome, SwitchboardError> {
        let raw = self.queue.pop(&self.config.queue_name).await?;
        Ok(self.process(raw).await)
    }

    /// Executes one raw queue entry.
    pub async fn process(&self, raw: String) -> JobOutcome {
        let outcome = match serde_json::from_str::<MessageJob>(&raw) {
            Ok(job) => self.execute(job).await,
            Err(e) => {
                let reason = format!("malformed job: {e}");
                warn!(error = %e, "dead-lettering undecodable job");
                self.dead_letter(&raw).await;
                JobOutcome::DeadLettered { reason }
            }
        };
        switchboard_prometheus::record_job(outcome.metric_label());
        outcome
    }

    async fn execute(&self, mut job: MessageJob) -> JobOutcome {
        let error = match self
            .manager
            .send(&job.instance_id, job.job_type, &job.payload)
            .await
        {
            Ok(receipt) => {
                let message_id = receipt.message_id.0;
                info!(
                    instance_id = %job.instance_id,
                    correlation_id = %job.correlation_id,
                    message_id = %message_id,
                    retry_count = job.retry_count,
                    "queued message sent"
                );
                self.ack(
                    &job,
                    MessageAck {
                        status: AckStatus::Sent,
                        correlation_id: job.correlation_id.clone(),
                        message_id: Some(message_id.clone()),
                        error: None,
                    },
                )
                .await;
                return JobOutcome::Sent { message_id };
            }
            Err(e) => e,
        };

        // A payload that failed validation will fail the same way again.
        let retryable = !matches!(error, SwitchboardError::Validation(_));
        if retryable && job.retry_count < self.config.max_retries {
            job.retry_count += 1;
            warn!(
                instance_id = %job.instance_id,
                correlation_id = %job.correlation_id,
                retry_count = job.retry_count,
                error = %error,
                "send failed, retrying"
            );
            tokio::time::sleep(self.config.backoff(job.retry_count)).await;

            match encode(&job) {
                Ok(raw) => match self.queue.push(&self.config.queue_name, &raw).await {
                    Ok(()) => {
                        return JobOutcome::Retried {
                            retry_count: job.retry_count,
                        };
                    }
                    Err(e) => error!(
                        correlation_id = %job.correlation_id,
                        error = %e,
                        "failed to re-queue job, dead-lettering"
                    ),
                },
                Err(e) => {
                    error!(correlation_id = %job.correlation_id, error = %e, "failed to encode job")
                }
            }
        }

        let reason = error.to_string();
        error!(
            instance_id = %job.instance_id,
            correlation_id = %job.correlation_id,
            retry_count = job.retry_count,
            error = %reason,
            "job exhausted retries, dead-lettering"
        );
        match encode(&job) {
            Ok(raw) => self.dead_letter(&raw).await,
            Err(e) => error!(critical = true, error = %e, "failed to encode dead-lettered job"),
        }
        self.ack(
            &job,
            MessageAck {
                status: AckStatus::Failed,
                correlation_id: job.correlation_id.clone(),
                message_id: None,
                error: Some(reason.clone()),
            },
        )
        .await;
        JobOutcome::DeadLettered { reason }
    }

    async fn dead_letter(&self, raw: &str) {
        if let Err(e) = self.queue.push(&self.config.dead_letter_name, raw).await {
            error!(
                critical = true,
                queue = %self.config.dead_letter_name,
                error = %e,
                payload = raw,
                "failed to push to dead-letter queue"
            );
        }
    }

    async fn ack(&self, job: &MessageJob, ack: MessageAck) {
        let data = match serde_json::to_value(&ack) {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "failed to encode ack");
                return;
            }
        };
        if let Err(e) = self
            .sink
            .send(
                &job.instance_id,
                WebhookEvent::new(event_types::MESSAGE_ACK, data),
            )
            .await
        {
            warn!(correlation_id = %job.correlation_id, error = %e, "ack delivery failed");
        }
    }
}

fn encode(job: &MessageJob) -> Result<String, SwitchboardError> {
    serde_json::to_string(job)
        .map_err(|e| SwitchboardError::Internal(format!("failed to encode job: {e}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use switchboard_session::ManagerDeps;
    use switchboard_test_utils::TestHarness;

    use super::*;

    fn manager(harness: &TestHarness) -> InstanceManager {
        InstanceManager::new(
            ManagerDeps {
                store: harness.storage.clone(),
                factory: harness.factory.clone(),
                sink: harness.sink.clone(),
                broadcaster: Arc::new(harness.broadcaster.clone()),
            },
            harness.config.session.clone(),
            None,
        )
    }

    async fn setup(harness: &TestHarness) -> QueueWorker {
        let manager = manager(harness);
        manager.create("t1", false).await.unwrap();
        harness
            .factory
            .client("t1")
            .unwrap()
            .set_logged_in(Some("me@s".into()));
        QueueWorker::new(
            harness.storage.clone(),
            manager,
            harness.sink.clone(),
            harness.config.queue.clone(),
        )
    }

    fn text() -> serde_json::Value {
        json!({"phone": "15551234567", "message": "hello"})
    }

    #[tokio::test]
    async fn enqueue_validates_before_admission() {
        let harness = TestHarness::builder().build().await.unwrap();
        let worker = setup(&harness).await;

        let err = worker
            .enqueue("ghost", JobType::Text, text(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::NotFound(_)));

        let err = worker
            .enqueue("t1", JobType::Text, json!({"phone": "1"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::Validation(_)));

        let queued = worker
            .enqueue("t1", JobType::Text, text(), Some("corr-1".into()))
            .await
            .unwrap();
        assert_eq!(queued.status, "queued");
        assert_eq!(queued.correlation_id, "corr-1");
        assert_eq!(harness.storage.len(&harness.config.queue.queue_name).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transient_failures_retry_then_ack() {
        let harness = TestHarness::builder().build().await.unwrap();
        let worker = setup(&harness).await;
        let client = harness.factory.client("t1").unwrap();
        client.script_send_failure("timeout");
        client.script_send_failure("timeout");

        worker
            .enqueue("t1", JobType::Text, text(), Some("corr-2".into()))
            .await
            .unwrap();

        assert_eq!(
            worker.process_next().await.unwrap(),
            JobOutcome::Retried { retry_count: 1 }
        );
        assert_eq!(
            worker.process_next().await.unwrap(),
            JobOutcome::Retried { retry_count: 2 }
        );
        assert!(matches!(
            worker.process_next().await.unwrap(),
            JobOutcome::Sent { .. }
        ));

        let acks = harness.sink.events_of("message_ack");
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].data["status"], "sent");
        assert_eq!(acks[0].data["correlation_id"], "corr-2");
        assert_eq!(client.send_attempts(), 3);
    }

    #[tokio::test]
    async fn exhausted_job_is_dead_lettered_once() {
        let harness = TestHarness::builder().build().await.unwrap();
        let worker = setup(&harness).await;
        harness
            .factory
            .client("t1")
            .unwrap()
            .fail_all_sends("network unreachable");
        let queue = harness.config.queue.clone();

        worker
            .enqueue("t1", JobType::Text, text(), Some("corr-3".into()))
            .await
            .unwrap();
        for _ in 0..queue.max_retries {
            assert!(matches!(
                worker.process_next().await.unwrap(),
                JobOutcome::Retried { .. }
            ));
        }
        assert!(matches!(
            worker.process_next().await.unwrap(),
            JobOutcome::DeadLettered { .. }
        ));

        assert_eq!(harness.storage.len(&queue.queue_name).await.unwrap(), 0);
        let dead = harness.storage.peek_all(&queue.dead_letter_name).await.unwrap();
        assert_eq!(dead.len(), 1);
        let job: MessageJob = serde_json::from_str(&dead[0]).unwrap();
        assert_eq!(job.retry_count, queue.max_retries);

        let acks = harness.sink.events_of("message_ack");
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].data["status"], "failed");
        assert!(!acks[0].data["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_entry_goes_straight_to_dead_letter() {
        let harness = TestHarness::builder().build().await.unwrap();
        let worker = setup(&harness).await;

        let outcome = worker.process("{not json".to_string()).await;
        assert!(matches!(outcome, JobOutcome::DeadLettered { .. }));
        let dead = harness
            .storage
            .peek_all(&harness.config.queue.dead_letter_name)
            .await
            .unwrap();
        assert_eq!(dead, vec!["{not json".to_string()]);
        assert!(harness.sink.events_of("message_ack").is_empty());
    }

    #[tokio::test]
    async fn run_drains_queue_and_stops_on_cancel() {
        let harness = TestHarness::builder().build().await.unwrap();
        let worker = setup(&harness).await;
        for i in 0..3 {
            worker
                .enqueue("t1", JobType::Text, text(), Some(format!("c{i}")))
                .await
                .unwrap();
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let worker = worker.clone();
            let cancel = cancel.clone();
            async move { worker.run(cancel).await }
        });

        let acks = harness
            .sink
            .wait_for("message_ack", 3, Duration::from_secs(2))
            .await;
        assert_eq!(acks.len(), 3);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
