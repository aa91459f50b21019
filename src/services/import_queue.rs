//! In-process queue for asynchronous product imports
//!
//! One FIFO, one worker: jobs run strictly one after another. Rows are fed to
//! the importer in chunks of [`CHUNK_SIZE`]; between chunks the worker
//! persists running counters and checks for cancellation. Fine-grained
//! progress (per-row errors included) lives only in memory and is gone after
//! a restart.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::services::audit;
use crate::services::cancellation::CancellationRegistry;
use crate::services::field_mapper::{map_rows, resolve_mapping};
use crate::services::import_pipeline::{import_summary, to_count, ImportDeps, ImportOptions};
use crate::services::importer::import_rows;
use crate::services::report::write_error_report;
use crate::services::spreadsheet::read_spreadsheet;
use crate::types::{
    entity, AuditAction, AuditEntry, ImportJob, ImportJobStatus, ImportOutcome, ImportProgress,
    JobStatusResponse,
};

/// Rows handed to the importer between two cancellation checks
pub const CHUNK_SIZE: usize = 100;

/// Jobs returned by the job list
pub const JOB_LIST_LIMIT: i64 = 50;

/// Finished jobs whose in-memory progress is retained, oldest dropped first
pub const MAX_FINISHED_PROGRESS: usize = 200;

struct QueuedImport {
    job_id: Uuid,
    /// Staged upload, relative to the upload root
    stored_file: String,
    file_name: String,
    options: ImportOptions,
}

/// How a processing run ended
enum RunEnd {
    Finished {
        outcome: ImportOutcome,
        report: Option<String>,
    },
    Cancelled {
        outcome: ImportOutcome,
    },
}

struct QueueInner {
    deps: ImportDeps,
    pending: Mutex<VecDeque<QueuedImport>>,
    progress: RwLock<HashMap<Uuid, ImportProgress>>,
    /// Terminal jobs in completion order
    finished: Mutex<VecDeque<Uuid>>,
    cancellation: CancellationRegistry,
    worker_active: AtomicBool,
}

/// Handle to the import queue; cheap to clone
#[derive(Clone)]
pub struct ImportQueue {
    inner: Arc<QueueInner>,
}

impl ImportQueue {
    pub fn new(deps: ImportDeps) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                deps,
                pending: Mutex::new(VecDeque::new()),
                progress: RwLock::new(HashMap::new()),
                finished: Mutex::new(VecDeque::new()),
                cancellation: CancellationRegistry::default(),
                worker_active: AtomicBool::new(false),
            }),
        }
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Stage the upload, create a PENDING job and schedule it.
    pub async fn enqueue(&self, file_name: &str, bytes: &[u8], options: ImportOptions) -> Result<Uuid> {
        let deps = &self.inner.deps;
        let stored_file = deps.storage.save("import", file_name, bytes).await?;
        let job = match deps.jobs.create_job(file_name, options.actor_id, 0).await {
            Ok(job) => job,
            Err(e) => {
                if let Err(remove_err) = deps.storage.remove(&stored_file).await {
                    warn!(file = %stored_file, "Failed to remove staged import file: {:#}", remove_err);
                }
                return Err(e);
            }
        };

        self.inner
            .progress
            .write()
            .insert(job.id, ImportProgress::pending());
        self.inner.pending.lock().push_back(QueuedImport {
            job_id: job.id,
            stored_file,
            file_name: file_name.to_string(),
            options,
        });

        info!(job_id = %job.id, file = file_name, "Import job queued");
        self.start_worker();
        Ok(job.id)
    }

    /// Job record plus in-memory progress, `None` when the job does not exist
    pub async fn status(&self, job_id: Uuid) -> Result<Option<JobStatusResponse>> {
        let Some(job) = self.inner.deps.jobs.get_job(job_id).await? else {
            return Ok(None);
        };
        let progress = self.progress(job_id);
        Ok(Some(JobStatusResponse { job, progress }))
    }

    pub fn progress(&self, job_id: Uuid) -> Option<ImportProgress> {
        self.inner.progress.read().get(&job_id).cloned()
    }

    pub async fn list(&self) -> Result<Vec<ImportJob>> {
        self.inner.deps.jobs.list_jobs(JOB_LIST_LIMIT).await
    }

    /// Request cancellation. Takes effect before the next chunk. Returns
    /// `false` for jobs this process does not track.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        let status = match self.inner.progress.read().get(&job_id) {
            Some(p) => p.status,
            None => return false,
        };
        if status.is_terminal() {
            return true;
        }
        if !self.inner.cancellation.cancel(&job_id) {
            self.inner.cancellation.pre_cancel(job_id);
        }
        info!(job_id = %job_id, "Import job cancellation requested");
        true
    }

    /// Cancel if still active, then drop the report, the job row and the
    /// in-memory progress. Returns `false` when nothing was known about it.
    pub async fn delete(&self, job_id: Uuid) -> Result<bool> {
        let deps = &self.inner.deps;
        let job = deps.jobs.get_job(job_id).await?;
        self.cancel(job_id);

        let report = job
            .as_ref()
            .and_then(|j| j.report_url.clone())
            .or_else(|| self.progress(job_id).and_then(|p| p.report_path));
        if let Some(report) = report {
            if let Err(e) = deps.storage.remove(&report).await {
                warn!(job_id = %job_id, "Failed to remove import report: {:#}", e);
            }
        }

        let deleted = deps.jobs.delete_job(job_id).await?;
        let tracked = self.inner.progress.write().remove(&job_id).is_some();
        info!(job_id = %job_id, "Import job deleted");
        Ok(deleted || tracked)
    }

    /// Path of the error report on disk, if the job has one
    pub async fn report_path(&self, job_id: Uuid) -> Result<Option<PathBuf>> {
        let Some(job) = self.inner.deps.jobs.get_job(job_id).await? else {
            return Ok(None);
        };
        match job.report_url {
            Some(name) => Ok(Some(self.inner.deps.storage.resolve(&name)?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Worker
    // =========================================================================

    fn start_worker(&self) {
        if self
            .inner
            .worker_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            queue.drain().await;
        });
    }

    async fn drain(&self) {
        let _slot = WorkerSlot(&self.inner.worker_active);
        loop {
            let next = self.inner.pending.lock().pop_front();
            if let Some(job) = next {
                self.run_job(job).await;
                continue;
            }

            self.inner.worker_active.store(false, Ordering::SeqCst);
            // A job pushed after the pop above would otherwise sit until the next enqueue
            let has_more = !self.inner.pending.lock().is_empty();
            if !has_more
                || self
                    .inner
                    .worker_active
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                return;
            }
        }
    }

    async fn run_job(&self, job: QueuedImport) {
        let job_id = job.job_id;
        let deps = &self.inner.deps;

        if !self.inner.progress.read().contains_key(&job_id) {
            // Deleted while waiting in the queue
            self.inner.cancellation.remove(&job_id);
            self.discard_staged(&job).await;
            return;
        }

        let _guard = self.inner.cancellation.register(job_id);
        info!(job_id = %job_id, file = %job.file_name, "Import job started");

        let (status, outcome, report) = match self.process(&job).await {
            Ok(RunEnd::Finished { outcome, report }) => (ImportJobStatus::Success, outcome, report),
            Ok(RunEnd::Cancelled { outcome }) => {
                info!(job_id = %job_id, processed = outcome.total, "Import job cancelled");
                (ImportJobStatus::Failed, outcome, None)
            }
            Err(e) => {
                error!(job_id = %job_id, "Import job failed: {:#}", e);
                (ImportJobStatus::Failed, self.outcome_so_far(job_id), None)
            }
        };

        if let Err(e) = deps
            .jobs
            .finish_job(
                job_id,
                status,
                to_count(outcome.success),
                to_count(outcome.failed),
                report.as_deref(),
            )
            .await
        {
            error!(job_id = %job_id, "Failed to persist import job result: {:#}", e);
        }
        self.update_progress(job_id, |p| {
            p.status = status;
            p.report_path = report.clone();
        });
        self.retire(job_id);

        audit::record(
            deps.audit.as_ref(),
            AuditEntry::new(job.options.actor_id, AuditAction::Import, entity::PRODUCT)
                .entity_id(job_id)
                .summary(import_summary(&outcome)),
        )
        .await;

        self.discard_staged(&job).await;
        info!(
            job_id = %job_id,
            status = ?status,
            success = outcome.success,
            failed = outcome.failed,
            skipped = outcome.skipped,
            updated = outcome.updated,
            "Import job finished"
        );
    }

    async fn process(&self, job: &QueuedImport) -> Result<RunEnd> {
        let deps = &self.inner.deps;
        let job_id = job.job_id;

        let bytes = deps.storage.read(&job.stored_file).await?;
        let sheet = read_spreadsheet(&bytes, &job.file_name)?;
        let mapping = resolve_mapping(&sheet.headers, job.options.mapping.as_ref());
        let rows = map_rows(&sheet, &mapping);

        deps.jobs.mark_running(job_id, to_count(rows.len())).await?;
        self.update_progress(job_id, |p| {
            p.status = ImportJobStatus::Running;
            p.total = rows.len();
        });

        let ctx = job.options.context();
        let mut totals = ImportOutcome::default();

        for chunk in rows.chunks(CHUNK_SIZE) {
            if self.inner.cancellation.is_cancelled(&job_id) {
                return Ok(RunEnd::Cancelled { outcome: totals });
            }

            let outcome = import_rows(deps.catalog.as_ref(), chunk, &ctx).await;
            self.update_progress(job_id, |p| {
                p.processed += outcome.total;
                p.success += outcome.success;
                p.failed += outcome.failed;
                p.skipped += outcome.skipped;
                p.updated += outcome.updated;
                p.errors.extend(outcome.errors.iter().cloned());
            });
            totals.absorb(outcome);

            deps.jobs
                .update_counts(job_id, to_count(totals.success), to_count(totals.failed))
                .await?;
        }

        let report = if totals.errors.is_empty() || !self.is_tracked(job_id) {
            None
        } else {
            Some(write_error_report(&deps.storage, job_id, &totals.errors).await?)
        };

        Ok(RunEnd::Finished {
            outcome: totals,
            report,
        })
    }

    /// Remember a finished job and forget the oldest ones past the cap
    fn retire(&self, job_id: Uuid) {
        let expired: Vec<Uuid> = {
            let mut finished = self.inner.finished.lock();
            finished.push_back(job_id);
            let excess = finished.len().saturating_sub(MAX_FINISHED_PROGRESS);
            finished.drain(..excess).collect()
        };
        if expired.is_empty() {
            return;
        }
        let mut progress = self.inner.progress.write();
        for id in expired {
            if progress.get(&id).is_some_and(|p| p.status.is_terminal()) {
                progress.remove(&id);
            }
        }
    }

    fn is_tracked(&self, job_id: Uuid) -> bool {
        self.inner.progress.read().contains_key(&job_id)
    }

    fn update_progress(&self, job_id: Uuid, update: impl FnOnce(&mut ImportProgress)) {
        if let Some(progress) = self.inner.progress.write().get_mut(&job_id) {
            update(progress);
        }
    }

    /// Counters accumulated before an unexpected failure
    fn outcome_so_far(&self, job_id: Uuid) -> ImportOutcome {
        self.progress(job_id)
            .map(|p| ImportOutcome {
                total: p.processed,
                success: p.success,
                failed: p.failed,
                skipped: p.skipped,
                updated: p.updated,
                errors: Vec::new(),
            })
            .unwrap_or_default()
    }

    async fn discard_staged(&self, job: &QueuedImport) {
        if let Err(e) = self.inner.deps.storage.remove(&job.stored_file).await {
            warn!(job_id = %job.job_id, "Failed to remove staged import file: {:#}", e);
        }
    }
}

/// Frees the worker flag when a worker unwinds, so later enqueues can start
/// a new one. A normal exit hands the flag over inside `drain`.
struct WorkerSlot<'a>(&'a AtomicBool);

impl Drop for WorkerSlot<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("Import worker panicked, releasing worker slot");
            self.0.store(false, Ordering::SeqCst);
        }
    }
}
