//! Bounded-parallel dispatch of batches to isolated workers.
//!
//! Batches are pulled one at a time and launched in index order. Two ways
//! of bounding concurrency are offered:
//!
//! - [`DispatchMode::Wave`]: launch up to `num_workers` workers, then wait
//!   for the whole roster before pulling more batches.
//! - [`DispatchMode::Pool`]: keep at most `num_workers` in flight and start
//!   the next batch as soon as any slot frees.
//!
//! A failing worker only fails its own batch; the remaining batches still
//! run and the failure is recorded in the [`DispatchReport`].

pub mod launcher;
pub mod report;

pub use launcher::{run_worker_request, InProcessLauncher, ProcessLauncher, WorkerLauncher};
pub use report::{BatchFailure, DispatchReport};

use crate::decompose::DecomposerConfig;
use crate::error::{ErrorCode, PipelineError, Result};
use crate::sequence::Batch;
use crate::worker::{BatchOutcome, WorkerRequest, WorkerSettings};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Full barrier every `num_workers` batches
    #[default]
    Wave,
    /// Semaphore-bounded pool with per-slot replacement
    Pool,
}

/// Batch statistics gathered without launching anything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub batches: usize,
    pub units: usize,
    pub total_length: usize,
}

pub struct Orchestrator {
    launcher: Arc<dyn WorkerLauncher>,
    settings: WorkerSettings,
    decomposer: DecomposerConfig,
    num_workers: usize,
    mode: DispatchMode,
}

impl Orchestrator {
    pub fn new(
        launcher: Arc<dyn WorkerLauncher>,
        settings: WorkerSettings,
        decomposer: DecomposerConfig,
        num_workers: usize,
    ) -> Self {
        Self {
            launcher,
            settings,
            decomposer,
            num_workers: num_workers.max(1),
            mode: DispatchMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Dispatch every batch and wait for all workers to finish.
    ///
    /// An error from the batch stream stops dispatch; workers already in
    /// flight are joined before the error is returned.
    pub async fn run<I>(&self, batches: I) -> Result<DispatchReport>
    where
        I: Iterator<Item = Result<Batch>>,
    {
        let (report, outcome) = self.dispatch(batches).await;
        outcome.map(|()| report)
    }

    /// Same as [`Orchestrator::run`], but the report of the batches that did
    /// run is returned even when the batch stream fails part way.
    pub async fn dispatch<I>(&self, batches: I) -> (DispatchReport, Result<()>)
    where
        I: Iterator<Item = Result<Batch>>,
    {
        info!(
            "Dispatching batches to at most {} workers ({:?} mode)",
            self.num_workers, self.mode
        );
        let mut report = DispatchReport::new(self.mode, self.num_workers);

        let outcome = match self.mode {
            DispatchMode::Wave => self.run_waves(batches, &mut report).await,
            DispatchMode::Pool => self.run_pool(batches, &mut report).await,
        };
        if let Err(e) = &outcome {
            warn!(
                "Batch stream failed after {} batches were launched: {}",
                report.launched, e
            );
            report.interrupted = Some(e.to_string());
        }

        report.finish();
        report.log_summary();
        (report, outcome)
    }

    /// Start one worker; a pool permit is held until the worker ends
    fn spawn(
        &self,
        batch: Batch,
        permit: Option<OwnedSemaphorePermit>,
    ) -> JoinHandle<Result<BatchOutcome>> {
        let launcher = Arc::clone(&self.launcher);
        let request = WorkerRequest {
            batch,
            settings: self.settings.clone(),
            decomposer: self.decomposer.clone(),
        };
        tokio::spawn(async move {
            let result = launcher.launch(request).await;
            drop(permit);
            result
        })
    }

    async fn run_waves<I>(&self, batches: I, report: &mut DispatchReport) -> Result<()>
    where
        I: Iterator<Item = Result<Batch>>,
    {
        let mut roster: Vec<(usize, JoinHandle<Result<BatchOutcome>>)> =
            Vec::with_capacity(self.num_workers);

        for batch in batches {
            let batch = match batch {
                Ok(batch) => batch,
                Err(e) => {
                    join_wave(&mut roster, report).await;
                    return Err(e);
                }
            };

            debug!("Launching worker for batch {}", batch.index);
            roster.push((batch.index, self.spawn(batch, None)));
            report.launched += 1;

            if roster.len() >= self.num_workers {
                join_wave(&mut roster, report).await;
            }
        }

        if !roster.is_empty() {
            join_wave(&mut roster, report).await;
        }
        Ok(())
    }

    async fn run_pool<I>(&self, batches: I, report: &mut DispatchReport) -> Result<()>
    where
        I: Iterator<Item = Result<Batch>>,
    {
        let semaphore = Arc::new(Semaphore::new(self.num_workers));
        let mut running = FuturesUnordered::new();
        let mut stream_error = None;

        for batch in batches {
            let batch = match batch {
                Ok(batch) => batch,
                Err(e) => {
                    stream_error = Some(e);
                    break;
                }
            };

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let err = PipelineError::other("worker pool closed").with_source(e);
                    stream_error = Some(err);
                    break;
                }
            };

            let index = batch.index;
            debug!("Launching worker for batch {}", index);
            let handle = self.spawn(batch, Some(permit));
            report.launched += 1;
            running.push(async move { (index, handle.await) });
        }

        while let Some((index, joined)) = running.next().await {
            report.record(index, flatten(joined));
        }

        match stream_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn join_wave(
    roster: &mut Vec<(usize, JoinHandle<Result<BatchOutcome>>)>,
    report: &mut DispatchReport,
) {
    if roster.is_empty() {
        return;
    }
    debug!("Joining wave of {} workers", roster.len());
    for (index, handle) in roster.drain(..) {
        report.record(index, flatten(handle.await));
    }
    report.waves += 1;
    info!(
        "Wave {} complete ({} of {} batches done)",
        report.waves,
        report.completed(),
        report.launched
    );
}

fn flatten(joined: std::result::Result<Result<BatchOutcome>, JoinError>) -> Result<BatchOutcome> {
    joined.unwrap_or_else(|e| {
        Err(PipelineError::execution_with_code(
            ErrorCode::EXEC_WORKER_PANICKED,
            format!("worker task failed: {}", e),
            None,
        ))
    })
}

/// Drain the batch stream and log every batch without launching workers
pub fn plan_batches<I>(batches: I) -> Result<BatchPlan>
where
    I: Iterator<Item = Result<Batch>>,
{
    let mut plan = BatchPlan::default();
    for batch in batches {
        let batch = batch?;
        info!(
            "Batch {}: {} units, total length {}",
            batch.index,
            batch.len(),
            batch.total_length()
        );
        plan.batches += 1;
        plan.units += batch.len();
        plan.total_length += batch.total_length();
    }
    info!(
        "Planned {} batches ({} units, total length {})",
        plan.batches, plan.units, plan.total_length
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose::LadderpathSettings;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records concurrency and launch order; fails or panics on request
    #[derive(Default)]
    struct RecordingLauncher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        launched: Mutex<Vec<usize>>,
        fail: Vec<usize>,
        panic: Vec<usize>,
        skip: Vec<usize>,
    }

    #[async_trait]
    impl WorkerLauncher for RecordingLauncher {
        async fn launch(&self, request: WorkerRequest) -> Result<BatchOutcome> {
            let index = request.batch.index;
            self.launched.lock().unwrap().push(index);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(5 + (index % 3) as u64 * 5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panic.contains(&index) {
                panic!("worker crashed on batch {index}");
            }
            if self.fail.contains(&index) {
                return Err(PipelineError::execution_with_code(
                    ErrorCode::EXEC_SUBPROCESS_FAILED,
                    "exit 1",
                    None,
                ));
            }
            if self.skip.contains(&index) {
                return Ok(BatchOutcome::Skipped);
            }
            Ok(BatchOutcome::Written {
                path: PathBuf::from(format!("pom_data_batch_{index}.json")),
            })
        }
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            output_folder: PathBuf::from("out"),
            ladder_folder: PathBuf::from("ladders"),
            pacing_delay: Duration::ZERO,
            ladderpath: LadderpathSettings::default(),
        }
    }

    fn batches(count: usize) -> impl Iterator<Item = Result<Batch>> {
        (1..=count).map(|index| {
            Ok(Batch {
                index,
                units: vec!["ACGT".to_string()],
            })
        })
    }

    fn orchestrator(launcher: Arc<RecordingLauncher>, workers: usize) -> Orchestrator {
        Orchestrator::new(launcher, settings(), DecomposerConfig::default(), workers)
    }

    #[tokio::test]
    async fn test_waves_are_bounded_and_ordered() {
        let launcher = Arc::new(RecordingLauncher::default());
        let report = orchestrator(launcher.clone(), 3)
            .run(batches(7))
            .await
            .unwrap();

        assert_eq!(report.launched, 7);
        assert_eq!(report.waves, 3);
        assert_eq!(report.written, (1..=7).collect::<Vec<_>>());
        assert!(launcher.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(*launcher.launched.lock().unwrap(), (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failures_are_isolated_to_their_batch() {
        let launcher = Arc::new(RecordingLauncher {
            fail: vec![2],
            panic: vec![4],
            skip: vec![5],
            ..Default::default()
        });
        let report = orchestrator(launcher, 2).run(batches(6)).await.unwrap();

        assert_eq!(report.written, vec![1, 3, 6]);
        assert_eq!(report.skipped, vec![5]);
        let failed: Vec<(usize, u16)> = report
            .failed
            .iter()
            .map(|f| (f.batch_index, f.code))
            .collect();
        assert_eq!(
            failed,
            vec![
                (2, ErrorCode::EXEC_SUBPROCESS_FAILED),
                (4, ErrorCode::EXEC_WORKER_PANICKED)
            ]
        );
        assert!(report.failure_error().is_some());
    }

    #[tokio::test]
    async fn test_pool_mode_bounds_in_flight_workers() {
        let launcher = Arc::new(RecordingLauncher {
            fail: vec![3],
            ..Default::default()
        });
        let report = orchestrator(launcher.clone(), 2)
            .with_mode(DispatchMode::Pool)
            .run(batches(9))
            .await
            .unwrap();

        assert_eq!(report.launched, 9);
        assert_eq!(report.waves, 0);
        assert_eq!(report.completed(), 9);
        assert_eq!(report.failed.len(), 1);
        assert!(launcher.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(*launcher.launched.lock().unwrap(), (1..=9).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_stream_error_joins_in_flight_workers() {
        let launcher = Arc::new(RecordingLauncher::default());
        let stream = batches(2).chain(std::iter::once(Err(PipelineError::input("bad row"))));

        let err = orchestrator(launcher.clone(), 5)
            .run(stream)
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 3);
        assert_eq!(launcher.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(launcher.launched.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stream_error_keeps_partial_report() {
        let launcher = Arc::new(RecordingLauncher {
            fail: vec![2],
            ..Default::default()
        });
        let stream = batches(3).chain(std::iter::once(Err(PipelineError::input("bad row"))));

        let (report, outcome) = orchestrator(launcher, 2).dispatch(stream).await;

        assert_eq!(outcome.unwrap_err().exit_code(), 3);
        assert_eq!(report.launched, 3);
        assert_eq!(report.written, vec![1, 3]);
        assert_eq!(report.failed[0].batch_index, 2);
        assert!(report.interrupted.unwrap().contains("bad row"));
        assert!(report.finished_at.is_some());
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Start(usize),
        Finish(usize),
    }

    /// Batch 1 is slow, every other batch is quick
    #[derive(Default)]
    struct TimelineLauncher {
        events: Mutex<Vec<Event>>,
    }

    impl TimelineLauncher {
        fn position(&self, event: Event) -> usize {
            let events = self.events.lock().unwrap();
            events.iter().position(|e| *e == event).unwrap()
        }
    }

    #[async_trait]
    impl WorkerLauncher for TimelineLauncher {
        async fn launch(&self, request: WorkerRequest) -> Result<BatchOutcome> {
            let index = request.batch.index;
            self.events.lock().unwrap().push(Event::Start(index));
            let millis = if index == 1 { 300 } else { 10 };
            tokio::time::sleep(Duration::from_millis(millis)).await;
            self.events.lock().unwrap().push(Event::Finish(index));
            Ok(BatchOutcome::Skipped)
        }
    }

    async fn timeline(mode: DispatchMode) -> Arc<TimelineLauncher> {
        let launcher = Arc::new(TimelineLauncher::default());
        Orchestrator::new(
            launcher.clone(),
            settings(),
            DecomposerConfig::default(),
            2,
        )
        .with_mode(mode)
        .run(batches(4))
        .await
        .unwrap();
        launcher
    }

    #[tokio::test]
    async fn test_wave_waits_for_whole_roster() {
        let launcher = timeline(DispatchMode::Wave).await;

        let third = launcher.position(Event::Start(3));
        assert!(third > launcher.position(Event::Finish(1)));
        assert!(third > launcher.position(Event::Finish(2)));
        let fourth = launcher.position(Event::Start(4));
        assert!(fourth > launcher.position(Event::Finish(1)));
    }

    #[tokio::test]
    async fn test_pool_refills_free_slot_early() {
        let launcher = timeline(DispatchMode::Pool).await;

        let third = launcher.position(Event::Start(3));
        assert!(third > launcher.position(Event::Finish(2)));
        assert!(third < launcher.position(Event::Finish(1)));
    }

    #[tokio::test]
    async fn test_empty_stream_launches_nothing() {
        let launcher = Arc::new(RecordingLauncher::default());
        let report = orchestrator(launcher, 4).run(batches(0)).await.unwrap();
        assert_eq!(report.launched, 0);
        assert_eq!(report.waves, 0);
        assert!(!report.has_failures());
    }

    #[test]
    fn test_plan_batches() {
        let plan = plan_batches(batches(3)).unwrap();
        assert_eq!(
            plan,
            BatchPlan {
                batches: 3,
                units: 3,
                total_length: 12
            }
        );
    }
}
