//! Background work queue.
//!
//! Jobs go through one mpsc channel drained by a single worker, so training,
//! cache refreshes and evaluation never overlap each other and never run on
//! a serving task. Interval tickers feed the same queue. A failed job is
//! retried after a fixed delay, up to the configured number of retries.

use crate::config::Config;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, warn};

const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Train { partial: bool },
    RefreshCache,
    Evaluate,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Train { partial: true } => f.write_str("partial training"),
            Job::Train { partial: false } => f.write_str("full training"),
            Job::RefreshCache => f.write_str("cache refresh"),
            Job::Evaluate => f.write_str("evaluation"),
        }
    }
}

/// Executes queued jobs
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: Job) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub full_train_interval: Duration,
    pub partial_train_interval: Duration,
    pub cache_refresh_interval: Duration,
    pub evaluation_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            full_train_interval: Duration::from_secs(config.full_train_interval_secs),
            partial_train_interval: Duration::from_secs(config.partial_train_interval_secs),
            cache_refresh_interval: Duration::from_secs(config.cache_refresh_interval_secs),
            evaluation_interval: Duration::from_secs(config.evaluation_interval_secs),
            max_retries: config.job_max_retries,
            retry_delay: config.job_retry_delay(),
        }
    }
}

impl SchedulerConfig {
    fn schedule(&self) -> [(Duration, Job); 4] {
        [
            (self.full_train_interval, Job::Train { partial: false }),
            (self.partial_train_interval, Job::Train { partial: true }),
            (self.cache_refresh_interval, Job::RefreshCache),
            (self.evaluation_interval, Job::Evaluate),
        ]
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    jobs_tx: mpsc::Sender<Job>,
    shutdown_tx: mpsc::Sender<()>,
    worker: JoinHandle<()>,
    tickers: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Queue a job behind the ones already waiting
    pub async fn enqueue(&self, job: Job) -> Result<()> {
        self.jobs_tx
            .send(job)
            .await
            .map_err(|_| anyhow!("scheduler worker has stopped"))
    }

    /// Stop the tickers, let the running job finish and wait for the worker
    pub async fn shutdown(self) {
        for ticker in &self.tickers {
            ticker.abort();
        }
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.worker.await {
            error!("Scheduler worker ended abnormally: {}", e);
        }
        info!("Scheduler stopped");
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Start the worker and one interval ticker per recurring job
    pub fn start(runner: Arc<dyn JobRunner>, config: SchedulerConfig) -> SchedulerHandle {
        let mut handle = Self::start_worker(runner, config.clone());
        for (period, job) in config.schedule() {
            if period.is_zero() {
                warn!("Interval for {} is zero, not scheduling it", job);
                continue;
            }
            let jobs_tx = handle.jobs_tx.clone();
            handle.tickers.push(tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    debug!("Scheduling {}", job);
                    if jobs_tx.send(job).await.is_err() {
                        break;
                    }
                }
            }));
        }
        info!("Scheduler started");
        handle
    }

    /// Start only the worker; jobs arrive through `enqueue`
    pub fn start_worker(runner: Arc<dyn JobRunner>, config: SchedulerConfig) -> SchedulerHandle {
        let (jobs_tx, jobs_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let worker = tokio::spawn(Self::worker_task(runner, config, jobs_rx, shutdown_rx));
        SchedulerHandle {
            jobs_tx,
            shutdown_tx,
            worker,
            tickers: Vec::new(),
        }
    }

    async fn worker_task(
        runner: Arc<dyn JobRunner>,
        config: SchedulerConfig,
        mut jobs_rx: mpsc::Receiver<Job>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                job = jobs_rx.recv() => match job {
                    Some(job) => run_with_retries(runner.as_ref(), &config, job).await,
                    None => break,
                },
            }
        }
    }
}

async fn run_with_retries(runner: &dyn JobRunner, config: &SchedulerConfig, job: Job) {
    let mut attempt = 0;
    loop {
        match runner.run(job).await {
            Ok(()) => {
                debug!("Finished {}", job);
                return;
            }
            Err(e) if attempt < config.max_retries => {
                attempt += 1;
                warn!(
                    "{} failed: {:#}; retry {}/{} in {:?}",
                    job, e, attempt, config.max_retries, config.retry_delay
                );
                tokio::time::sleep(config.retry_delay).await;
            }
            Err(e) => {
                error!("{} failed after {} retries: {:#}", job, attempt, e);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every attempt and fails the first `failures` of them
    struct RecordingRunner {
        attempts: Mutex<Vec<Job>>,
        failures: usize,
    }

    impl RecordingRunner {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                attempts: Mutex::new(Vec::new()),
                failures,
            })
        }

        fn attempts(&self) -> Vec<Job> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobRunner for RecordingRunner {
        async fn run(&self, job: Job) -> Result<()> {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(job);
            if attempts.len() <= self.failures {
                Err(anyhow!("collaborator unavailable"))
            } else {
                Ok(())
            }
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            full_train_interval: Duration::from_secs(24 * 3600),
            partial_train_interval: Duration::from_secs(15 * 60),
            cache_refresh_interval: Duration::from_secs(24 * 3600),
            evaluation_interval: Duration::from_secs(3600),
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_config_from_defaults() {
        let scheduler = SchedulerConfig::from(&Config::default());
        assert_eq!(scheduler, config());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_is_retried() {
        let runner = RecordingRunner::new(2);
        let handle = Scheduler::start_worker(runner.clone(), config());
        handle.enqueue(Job::Evaluate).await.unwrap();

        tokio::time::sleep(Duration::from_secs(300)).await;
        handle.shutdown().await;
        assert_eq!(runner.attempts(), vec![Job::Evaluate; 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let runner = RecordingRunner::new(usize::MAX);
        let handle = Scheduler::start_worker(runner.clone(), config());
        handle.enqueue(Job::RefreshCache).await.unwrap();

        tokio::time::sleep(Duration::from_secs(3600)).await;
        handle.shutdown().await;
        assert_eq!(runner.attempts().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tickers_enqueue_recurring_jobs() {
        let runner = RecordingRunner::new(0);
        let handle = Scheduler::start(runner.clone(), config());

        tokio::time::sleep(Duration::from_secs(31 * 60)).await;
        handle.shutdown().await;
        assert_eq!(runner.attempts(), vec![Job::Train { partial: true }; 2]);
    }
}
