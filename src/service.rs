//! # Parser Service - Queue-Driven Job Processing
//!
//! [`ParserService`] owns a [`DiagramCompiler`] together with handles to the blob store and the
//! notification sink, and drives every parse request through the [`ParseJob`] state machine:
//!
//! ```text
//! Received → Downloading → Parsing → Healing → Assembling → Completed
//!     └──────────┴────────────┴─────────┴───────────┴──────→ Failed
//! ```
//!
//! - **Downloading**: the diagram is fetched from the blob store (retried while the store is
//!   unavailable) and its SHA-256 recorded.
//! - **Parsing**: container validation, page extraction and classification on tokio's
//!   blocking pool.
//! - **Healing**: connector resolution over the complete shape set.
//! - **Assembling**: topology and metrics; the artifact is serialized and stored at
//!   `{document_id}/parsed_data.json`.
//! - **Completed**: reached only after the completion notification was published.
//!
//! Any error moves the job to `Failed` with its [`ErrorKind`](crate::error::ErrorKind) and a
//! failure notification is published instead.
//!
//! ## Workers
//!
//! [`run_worker`](ParserService::run_worker) is a pull loop: receive one message, process it to
//! a terminal state, settle the delivery, repeat. [`spawn_workers`](ParserService::spawn_workers)
//! starts `worker.count` of them on the runtime. Workers share nothing mutable beyond the
//! queue and store handles.
//!
//! ## Deadlines
//!
//! The core has no internal timeout. [`with_watchdog`] bounds any future from the caller's
//! side, and [`process_within`](ParserService::process_within) applies it to a whole job.

use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc::UnboundedSender, watch},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    codec::{to_json, DiagramCompiler},
    commands::{sha256_hex, CompletionNotification, ParseRequest},
    config::NetdocConfig,
    error::NetdocError,
    event::{JobEvent, JobState},
    job::{with_retry, ParseJob},
    queue::{MessageQueue, NotificationSink},
    storage::BlobStore,
};

/// What a worker does with a delivery once its job is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// The outcome could not be announced; deliver the message again
    Requeue,
    /// The message can never become a valid job
    Reject,
}

/// Outcome of handling one message.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    /// `None` when the message never became a job (invalid request)
    pub job: Option<ParseJob>,
    pub notification: Option<CompletionNotification>,
    pub published: bool,
}

impl JobReport {
    pub fn state(&self) -> JobState {
        self.job
            .as_ref()
            .map(ParseJob::state)
            .unwrap_or(JobState::Failed)
    }

    pub fn disposition(&self) -> Disposition {
        if self.notification.is_some() && !self.published {
            Disposition::Requeue
        } else if self.job.is_none() {
            Disposition::Reject
        } else {
            Disposition::Ack
        }
    }
}

/// Counters of one or more worker loops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
    pub requeued: usize,
    pub rejected: usize,
}

impl WorkerSummary {
    fn record(&mut self, report: &JobReport) {
        self.processed += 1;
        match report.state() {
            JobState::Completed => self.completed += 1,
            _ => self.failed += 1,
        }
        match report.disposition() {
            Disposition::Requeue => self.requeued += 1,
            Disposition::Reject => self.rejected += 1,
            Disposition::Ack => {}
        }
    }

    pub fn merge(&mut self, other: &WorkerSummary) {
        self.processed += other.processed;
        self.completed += other.completed;
        self.failed += other.failed;
        self.requeued += other.requeued;
        self.rejected += other.rejected;
    }
}

/// Run `fut`, failing with [`NetdocError::Timeout`] if it does not finish within `limit`.
pub async fn with_watchdog<T, F>(limit: Duration, fut: F) -> Result<T, NetdocError>
where
    F: Future<Output = Result<T, NetdocError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| NetdocError::Timeout(u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)))?
}

#[derive(Clone)]
pub struct ParserService {
    compiler: Arc<DiagramCompiler>,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn NotificationSink>,
    config: NetdocConfig,
    events: Option<UnboundedSender<JobEvent>>,
}

impl ParserService {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn NotificationSink>,
        config: NetdocConfig,
    ) -> Result<Self, NetdocError> {
        config.validate()?;
        let compiler = DiagramCompiler::new(&config)?;
        Ok(ParserService {
            compiler: Arc::new(compiler),
            blobs,
            notifier,
            config,
            events: None,
        })
    }

    /// Stream [`JobEvent`]s to `tx` in addition to logging them.
    pub fn with_events(mut self, tx: UnboundedSender<JobEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn compiler(&self) -> &DiagramCompiler {
        &self.compiler
    }

    pub fn config(&self) -> &NetdocConfig {
        &self.config
    }

    fn emit(&self, event: JobEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.send(event) {
                tracing::debug!("No job event listener: {}", NetdocError::from(e));
            }
        }
    }

    fn step(&self, job: &mut ParseJob) -> Result<(), NetdocError> {
        let from = job.advance()?;
        self.emit(JobEvent::StateChanged(job.id, from, job.state()));
        Ok(())
    }

    fn fail(&self, job: &mut ParseJob, err: &NetdocError) {
        match job.fail(err) {
            Ok(from) => self.emit(JobEvent::StateChanged(job.id, from, JobState::Failed)),
            Err(e) => tracing::error!("Job {} could not be failed: {e}", job.id),
        }
    }

    async fn retrying<T, F, Fut>(
        &self,
        job_id: Uuid,
        operation: &str,
        f: F,
    ) -> Result<T, NetdocError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NetdocError>>,
    {
        with_retry(
            &self.config.retry,
            operation,
            |attempt, err| {
                self.emit(JobEvent::Retrying(
                    job_id,
                    operation.to_string(),
                    attempt,
                    err.kind(),
                ))
            },
            f,
        )
        .await
    }

    async fn publish(&self, job_id: Uuid, notification: &CompletionNotification) -> bool {
        match self
            .retrying(job_id, "publish", || self.notifier.publish(notification))
            .await
        {
            Ok(()) => {
                tracing::debug!("Published notification: {notification}");
                true
            }
            Err(err) => {
                tracing::error!("Could not publish notification for {notification}: {err}");
                false
            }
        }
    }

    /// Drive `job` from `Received` through `Assembling` and store the artifact. Returns the
    /// completion notification still to be published.
    async fn run_job(
        &self,
        job: &mut ParseJob,
        input_sha256: &mut Option<String>,
    ) -> Result<CompletionNotification, NetdocError> {
        self.step(job)?;
        let source_key = job.request.file_path.clone();
        let bytes = self
            .retrying(job.id, "fetch", || self.blobs.fetch(&source_key))
            .await?;
        let digest = sha256_hex(&bytes);
        *input_sha256 = Some(digest.clone());
        tracing::debug!("Downloaded {} byte(s), sha256 {digest}", bytes.len());

        self.step(job)?;
        let compiler = self.compiler.clone();
        let extraction = tokio::task::spawn_blocking(move || {
            let archive = compiler.open(bytes)?;
            compiler.extract(&archive)
        })
        .await??;

        self.step(job)?;
        let compiler = self.compiler.clone();
        let (extraction, connections) = tokio::task::spawn_blocking(move || {
            let connections = compiler.heal(&extraction);
            (extraction, connections)
        })
        .await?;

        self.step(job)?;
        let compiler = self.compiler.clone();
        let filename = job.request.filename().to_string();
        let (result, json) = tokio::task::spawn_blocking(move || {
            let result = compiler.assemble(&filename, extraction, connections);
            to_json(&result.artifact).map(|json| (result, json))
        })
        .await??;

        for diagnostic in result.warnings() {
            self.emit(JobEvent::Diagnostic(job.id, diagnostic.to_string()));
        }
        let unresolved = result.artifact.unresolved_connections.len();
        if unresolved > 0 {
            tracing::warn!(
                "Job {}: {}",
                job.id,
                NetdocError::UnresolvedConnections { count: unresolved }
            );
        }

        let output_key = job.output_key();
        self.retrying(job.id, "store", || self.blobs.store(&output_key, json.clone()))
            .await?;
        Ok(CompletionNotification::completed(
            &job.request,
            output_key,
            &result.artifact,
            digest,
        ))
    }

    /// Process one validated request to a terminal state and announce the outcome.
    ///
    /// When the completion notification cannot be published the job ends `Failed` with
    /// `published == false`; the artifact is already stored and reprocessing rewrites it with
    /// identical bytes.
    ///
    /// A failure ends the history at the stage it occurred in. An input that is not a zip
    /// archive is recorded as `Received -> Downloading -> Parsing -> Failed`, because the
    /// container is only opened once parsing starts.
    #[tracing::instrument(skip_all, fields(document_id = %request.document_id))]
    pub async fn process(&self, request: ParseRequest) -> JobReport {
        let mut job = ParseJob::new(request);
        tracing::info!("Job {} received: {}", job.id, job.request);
        let mut input_sha256 = None;
        match self.run_job(&mut job, &mut input_sha256).await {
            Ok(notification) => {
                let published = self.publish(job.id, &notification).await;
                if published {
                    if let Err(e) = self.step(&mut job) {
                        tracing::error!("Job {} could not complete: {e}", job.id);
                    }
                } else {
                    self.fail(
                        &mut job,
                        &NetdocError::StorageUnavailable(
                            "completion notification not published".to_string(),
                        ),
                    );
                }
                JobReport {
                    job: Some(job),
                    notification: Some(notification),
                    published,
                }
            }
            Err(err) => {
                self.fail(&mut job, &err);
                let notification = CompletionNotification::failed(
                    job.request.document_id.clone(),
                    Some(job.request.project_id.clone()),
                    &err,
                    input_sha256,
                );
                let published = self.publish(job.id, &notification).await;
                JobReport {
                    job: Some(job),
                    notification: Some(notification),
                    published,
                }
            }
        }
    }

    /// [`process`](Self::process) under a watchdog. An overrun abandons the job and reports
    /// it `Failed` with classification `timeout`.
    pub async fn process_within(&self, request: ParseRequest, limit: Duration) -> JobReport {
        let attempt = with_watchdog(limit, async {
            Ok(self.process(request.clone()).await)
        })
        .await;
        match attempt {
            Ok(report) => report,
            Err(err) => {
                let mut job = ParseJob::new(request);
                self.fail(&mut job, &err);
                let notification = CompletionNotification::failed(
                    job.request.document_id.clone(),
                    Some(job.request.project_id.clone()),
                    &err,
                    None,
                );
                let published = self.publish(job.id, &notification).await;
                JobReport {
                    job: Some(job),
                    notification: Some(notification),
                    published,
                }
            }
        }
    }

    /// Decode a queue message and process it. Invalid requests are reported to the sink only
    /// when a document id can be recovered from the message.
    #[tracing::instrument(skip_all)]
    pub async fn process_message(&self, body: &[u8]) -> JobReport {
        match ParseRequest::from_json(body) {
            Ok(request) => self.process(request).await,
            Err(err) => {
                tracing::warn!("Rejecting message: {err}");
                let Some((document_id, project_id)) = ParseRequest::salvage_ids(body) else {
                    return JobReport {
                        job: None,
                        notification: None,
                        published: false,
                    };
                };
                let notification =
                    CompletionNotification::failed(document_id, project_id, &err, None);
                let published = self.publish(Uuid::nil(), &notification).await;
                JobReport {
                    job: None,
                    notification: Some(notification),
                    published,
                }
            }
        }
    }

    /// Pull and process messages until `shutdown` turns true, or until the queue is empty
    /// when `worker.exit_when_idle` is set.
    pub async fn run_worker(
        &self,
        queue: Arc<dyn MessageQueue>,
        shutdown: watch::Receiver<bool>,
    ) -> WorkerSummary {
        self.worker_loop(0, queue, shutdown).await
    }

    #[tracing::instrument(skip_all, fields(worker = worker))]
    async fn worker_loop(
        &self,
        worker: usize,
        queue: Arc<dyn MessageQueue>,
        mut shutdown: watch::Receiver<bool>,
    ) -> WorkerSummary {
        let poll = Duration::from_millis(self.config.worker.poll_interval_ms);
        let mut summary = WorkerSummary::default();
        tracing::info!("[Worker {worker}] started");
        loop {
            if *shutdown.borrow() {
                tracing::info!("[Worker {worker}] shutdown requested");
                break;
            }
            let delivery = match queue.receive().await {
                Ok(Some(delivery)) => delivery,
                Ok(None) if self.config.worker.exit_when_idle => {
                    tracing::debug!("[Worker {worker}] queue drained");
                    break;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(poll) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                tokio::time::sleep(poll).await;
                            }
                        }
                    }
                    continue;
                }
                Err(err) => {
                    tracing::warn!("[Worker {worker}] receive failed: {err}");
                    tokio::time::sleep(poll).await;
                    continue;
                }
            };

            tracing::debug!(
                "[Worker {worker}] delivery {} (attempt {})",
                delivery.tag,
                delivery.attempt
            );
            let report = self.process_message(&delivery.body).await;
            summary.record(&report);
            let settled = match report.disposition() {
                Disposition::Ack => queue.ack(delivery.tag).await,
                Disposition::Requeue => {
                    tracing::warn!("[Worker {worker}] requeueing delivery {}", delivery.tag);
                    queue.nack(delivery.tag, true).await
                }
                Disposition::Reject => queue.nack(delivery.tag, false).await,
            };
            if let Err(err) = settled {
                tracing::warn!(
                    "[Worker {worker}] could not settle delivery {}: {err}",
                    delivery.tag
                );
            }
        }
        tracing::info!(
            "[Worker {worker}] stopped after {} message(s) ({} completed, {} failed)",
            summary.processed,
            summary.completed,
            summary.failed
        );
        summary
    }

    /// Start `worker.count` worker loops on the current runtime.
    pub fn spawn_workers(
        self: &Arc<Self>,
        queue: Arc<dyn MessageQueue>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<WorkerSummary>> {
        (0..self.config.worker.count)
            .map(|worker| {
                let service = Arc::clone(self);
                let queue = Arc::clone(&queue);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { service.worker_loop(worker, queue, shutdown).await })
            })
            .collect()
    }
}
