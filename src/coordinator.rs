//! Fixed-size worker pool with completion-order aggregation and fail-fast abort.
//!
//! Workers only ever talk to the coordinator through a channel, one message per
//! finished job. Counters and the outcome stream live in the coordinator loop.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error};

use crate::mutants::{BuildFailure, JobOutcome, JobPosition, JobReport, Mutation};
use crate::process::Supervisor;
use crate::runner::{self, JobContext};
use crate::select;

/// How often the coordinator wakes up to notice an operator interrupt.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub undetected: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub detected: usize,
    pub undetected: usize,
    pub timed_out: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone)]
pub struct CampaignResult {
    pub total: usize,
    pub completed: usize,
    pub counts: OutcomeCounts,
    /// Every outcome, in the order jobs finished.
    pub reports: Vec<JobReport>,
    /// Undetected mutations, in the order jobs finished.
    pub escaped: Vec<Mutation>,
}

/// The mutant whose build failure stopped the campaign.
#[derive(Debug, Clone)]
pub struct StaleMutant {
    pub position: JobPosition,
    pub mutation: Mutation,
    pub failure: BuildFailure,
}

#[derive(Debug)]
pub enum CampaignEnd {
    Completed(CampaignResult),
    Aborted(StaleMutant),
    Interrupted,
}

struct Tally {
    total: usize,
    counts: OutcomeCounts,
    reports: Vec<JobReport>,
}

impl Tally {
    fn new(total: usize) -> Self {
        Self {
            total,
            counts: OutcomeCounts::default(),
            reports: Vec::with_capacity(total),
        }
    }

    fn record(&mut self, report: JobReport) {
        match &report.outcome {
            JobOutcome::Detected => self.counts.detected += 1,
            JobOutcome::Undetected => self.counts.undetected += 1,
            JobOutcome::TestTimedOut => self.counts.timed_out += 1,
            JobOutcome::Skipped(_) => self.counts.skipped += 1,
            JobOutcome::ExecutionError(_) => self.counts.errors += 1,
            // Never recorded: the coordinator aborts instead.
            JobOutcome::BuildFailed(_) => {}
        }
        self.reports.push(report);
    }

    fn progress(&self) -> Progress {
        Progress {
            completed: self.reports.len(),
            total: self.total,
            undetected: self.counts.undetected,
        }
    }

    fn finish(self) -> CampaignResult {
        let escaped = select::escaped(&self.reports);
        CampaignResult {
            total: self.total,
            completed: self.reports.len(),
            counts: self.counts,
            reports: self.reports,
            escaped,
        }
    }
}

struct Job {
    position: JobPosition,
    mutation: Mutation,
}

pub struct Coordinator {
    ctx: Arc<JobContext>,
    workers: usize,
    supervisor: Arc<Supervisor>,
}

impl Coordinator {
    pub fn new(ctx: JobContext, workers: usize, supervisor: Arc<Supervisor>) -> Self {
        Self {
            ctx: Arc::new(ctx),
            workers: workers.max(1),
            supervisor,
        }
    }

    /// Run every mutation through the pool and aggregate results as they finish.
    ///
    /// `on_progress` is called once before any job completes and once after
    /// every completion. The first `BuildFailed` aborts the campaign: queued
    /// jobs never start and running subprocess groups are killed without
    /// waiting for their workers.
    pub fn run(
        &self,
        mutations: Vec<Mutation>,
        mut on_progress: impl FnMut(Progress),
    ) -> std::io::Result<CampaignEnd> {
        let total = mutations.len();
        let queue: VecDeque<Job> = mutations
            .into_iter()
            .enumerate()
            .map(|(index, mutation)| Job {
                position: JobPosition { index, total },
                mutation,
            })
            .collect();
        let queue = Arc::new(Mutex::new(queue));
        let (tx, rx) = mpsc::channel::<JobReport>();

        let mut handles = Vec::new();
        for id in 0..self.workers.min(total) {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let ctx = Arc::clone(&self.ctx);
            let supervisor = Arc::clone(&self.supervisor);
            let handle = thread::Builder::new()
                .name(format!("mutant-worker-{}", id))
                .spawn(move || worker_loop(&queue, &tx, &ctx, &supervisor))?;
            handles.push(handle);
        }
        drop(tx);

        let mut tally = Tally::new(total);
        on_progress(tally.progress());

        loop {
            if self.supervisor.was_interrupted() {
                return Ok(CampaignEnd::Interrupted);
            }
            match rx.recv_timeout(INTERRUPT_POLL) {
                Ok(report) => {
                    if self.supervisor.was_interrupted() {
                        return Ok(CampaignEnd::Interrupted);
                    }
                    if let JobOutcome::BuildFailed(failure) = report.outcome {
                        let killed = self.supervisor.abort();
                        debug!("aborting campaign, killed {} process groups", killed);
                        return Ok(CampaignEnd::Aborted(StaleMutant {
                            position: report.position,
                            mutation: report.mutation,
                            failure,
                        }));
                    }
                    debug!("{} {}: {}", report.position, report.outcome.label(), report.mutation.name);
                    tally.record(report);
                    on_progress(tally.progress());
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        for handle in handles {
            if handle.join().is_err() {
                error!("mutation worker exited abnormally");
            }
        }
        Ok(CampaignEnd::Completed(tally.finish()))
    }
}

fn worker_loop(
    queue: &Mutex<VecDeque<Job>>,
    tx: &mpsc::Sender<JobReport>,
    ctx: &JobContext,
    supervisor: &Supervisor,
) {
    loop {
        if supervisor.is_cancelled() {
            break;
        }
        let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        let Some(job) = next else {
            break;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            runner::run_job(&job.mutation, job.position, ctx, supervisor)
        }))
        .unwrap_or_else(|_| JobOutcome::ExecutionError("worker panicked".to_string()));

        let report = JobReport {
            position: job.position,
            mutation: job.mutation,
            outcome,
        };
        if tx.send(report).is_err() {
            break;
        }
    }
}
