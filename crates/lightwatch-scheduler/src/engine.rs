//! Scheduler — runs every registered job on its own periodic loop.
//! Loops sleep between ticks (tokio timers only) and stop on the shared
//! shutdown signal. A panicking or failing job is logged and its loop
//! keeps going.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::jobs::Job;

/// Liveness of one loop, updated on its own cadence.
#[derive(Debug, Default)]
pub struct Heartbeat {
    last_beat: Mutex<Option<Instant>>,
    beats: AtomicU64,
}

impl Heartbeat {
    fn beat(&self) {
        if let Ok(mut last) = self.last_beat.lock() {
            *last = Some(Instant::now());
        }
        self.beats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_beat(&self) -> Option<Instant> {
        self.last_beat.lock().ok().and_then(|last| *last)
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

/// How one invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Cancelled,
    Failed,
    Panicked,
}

struct Registration {
    job: Arc<dyn Job>,
    interval: Duration,
    heartbeat: Arc<Heartbeat>,
}

/// Periodic job supervisor.
pub struct Scheduler {
    registrations: Vec<Registration>,
    heartbeat_interval: Duration,
}

impl Scheduler {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            registrations: Vec::new(),
            heartbeat_interval,
        }
    }

    /// Add a job running every `interval`. Returns the loop's heartbeat.
    pub fn register(&mut self, job: Arc<dyn Job>, interval: Duration) -> Arc<Heartbeat> {
        let heartbeat = Arc::new(Heartbeat::default());
        tracing::info!(job = job.name(), "📅 Job registered: every {}s", interval.as_secs());
        self.registrations.push(Registration {
            job,
            interval,
            heartbeat: heartbeat.clone(),
        });
        heartbeat
    }

    pub fn job_names(&self) -> Vec<String> {
        self.registrations
            .iter()
            .map(|r| r.job.name().to_string())
            .collect()
    }

    /// Run all loops until `shutdown` turns true (or its sender is dropped).
    /// Returns once every loop has exited; an in-flight job finishes first.
    pub async fn start(self, shutdown: watch::Receiver<bool>) {
        tracing::info!("⏰ Scheduler started with {} jobs", self.registrations.len());

        let mut handles = Vec::with_capacity(self.registrations.len() * 2);
        for registration in self.registrations {
            let name = registration.job.name().to_string();
            handles.push(tokio::spawn(heartbeat_loop(
                name,
                registration.heartbeat.clone(),
                self.heartbeat_interval,
                shutdown.clone(),
            )));
            handles.push(tokio::spawn(job_loop(
                registration.job,
                registration.interval,
                shutdown.clone(),
            )));
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!("Scheduler loop aborted: {e}");
            }
        }
        tracing::info!("🛑 Scheduler stopped");
    }
}

/// Resolves once shutdown is requested or can no longer be requested.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn job_loop(job: Arc<dyn Job>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_requested(&mut shutdown) => break,
        }
        if *shutdown.borrow() {
            break;
        }
        run_guarded(job.as_ref()).await;
    }
    tracing::debug!(job = job.name(), "Job loop exited");
}

async fn heartbeat_loop(
    name: String,
    heartbeat: Arc<Heartbeat>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                heartbeat.beat();
                tracing::debug!(job = %name, beats = heartbeat.beats(), "💓 alive");
            }
            _ = shutdown_requested(&mut shutdown) => break,
        }
    }
}

/// Invoke a job once, recovering panics.
pub async fn run_guarded(job: &dyn Job) -> JobOutcome {
    let name = job.name();
    match AssertUnwindSafe(job.run()).catch_unwind().await {
        Ok(Ok(())) => JobOutcome::Completed,
        Ok(Err(e)) if e.is_cancellation() => {
            tracing::info!(job = name, "Job interrupted: {e}");
            JobOutcome::Cancelled
        }
        Ok(Err(e)) => {
            tracing::error!(job = name, "❌ Job failed: {e}");
            JobOutcome::Failed
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            tracing::error!(job = name, "💥 Job panicked: {message}");
            JobOutcome::Panicked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lightwatch_core::error::{Result, WatchError};
    use std::sync::atomic::AtomicUsize;

    /// Behaves according to the call number.
    struct ScriptedJob {
        calls: AtomicUsize,
        script: fn(usize) -> Result<()>,
        delay: Duration,
    }

    impl ScriptedJob {
        fn new(script: fn(usize) -> Result<()>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script,
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: |_| Ok(()),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Job for ScriptedJob {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn run(&self) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.script)(call)
        }
    }

    async fn run_for(scheduler: Scheduler, duration: Duration) {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.start(rx));
        tokio::time::sleep(duration).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_guarded_outcomes() {
        let ok = ScriptedJob::new(|_| Ok(()));
        assert_eq!(run_guarded(ok.as_ref()).await, JobOutcome::Completed);

        let cancelled = ScriptedJob::new(|_| Err(WatchError::DeadlineExceeded));
        assert_eq!(run_guarded(cancelled.as_ref()).await, JobOutcome::Cancelled);

        let failing = ScriptedJob::new(|_| Err(WatchError::Store("down".into())));
        assert_eq!(run_guarded(failing.as_ref()).await, JobOutcome::Failed);

        let panicking = ScriptedJob::new(|_| panic!("boom"));
        assert_eq!(run_guarded(panicking.as_ref()).await, JobOutcome::Panicked);
    }

    #[tokio::test]
    async fn test_panic_does_not_stop_loop() {
        let job = ScriptedJob::new(|call| {
            if call == 0 {
                panic!("first tick explodes");
            }
            Ok(())
        });
        let steady = ScriptedJob::new(|_| Ok(()));

        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        scheduler.register(job.clone(), Duration::from_millis(10));
        scheduler.register(steady.clone(), Duration::from_millis(10));
        run_for(scheduler, Duration::from_millis(150)).await;

        assert!(job.calls() >= 2, "loop stopped after panic: {}", job.calls());
        assert!(steady.calls() >= 2);
    }

    #[tokio::test]
    async fn test_errors_do_not_stop_loop() {
        let job = ScriptedJob::new(|_| Err(WatchError::Provider("unreachable".into())));
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        scheduler.register(job.clone(), Duration::from_millis(10));
        run_for(scheduler, Duration::from_millis(100)).await;
        assert!(job.calls() >= 2);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let job = ScriptedJob::new(|_| Ok(()));
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        scheduler.register(job.clone(), Duration::from_secs(3600));

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), scheduler.start(rx))
            .await
            .unwrap();
        assert_eq!(job.calls(), 0);
    }

    #[tokio::test]
    async fn test_dropped_sender_stops_loops() {
        let mut scheduler = Scheduler::new(Duration::from_millis(10));
        scheduler.register(ScriptedJob::new(|_| Ok(())), Duration::from_millis(10));

        let (tx, rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), scheduler.start(rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_independent_of_job_duration() {
        let job = ScriptedJob::slow(Duration::from_millis(500));
        let mut scheduler = Scheduler::new(Duration::from_millis(10));
        let heartbeat = scheduler.register(job.clone(), Duration::from_millis(5));
        assert_eq!(scheduler.job_names(), vec!["scripted".to_string()]);

        run_for(scheduler, Duration::from_millis(150)).await;

        // The in-flight call runs to completion, then no new call starts.
        assert_eq!(job.calls(), 1);
        assert!(heartbeat.beats() >= 3, "beats: {}", heartbeat.beats());
        assert!(heartbeat.last_beat().is_some());
    }
}
