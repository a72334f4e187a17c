// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use anyhow::{anyhow, Error};
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Work done by a job, it runs on the blocking pool
pub type Task = Arc<dyn Fn() -> Result<(), Error> + Send + Sync>;

/// When a job fires, all times are UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Daily { hour: u32, minute: u32 },
    Hourly { minute: u32 },
    Every(Duration),
}

impl Schedule {
    /// First firing time strictly after `now`, `None` if the schedule can't
    /// ever fire (out of range fields or an empty period).
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Schedule::Daily { hour, minute } => {
                let at = now
                    .with_hour(hour)?
                    .with_minute(minute)?
                    .with_second(0)?
                    .with_nanosecond(0)?;

                Some(if at > now {
                    at
                } else {
                    at + ChronoDuration::days(1)
                })
            }

            Schedule::Hourly { minute } => {
                let at = now.with_minute(minute)?.with_second(0)?.with_nanosecond(0)?;

                Some(if at > now {
                    at
                } else {
                    at + ChronoDuration::hours(1)
                })
            }

            Schedule::Every(period) => {
                if period == Duration::from_secs(0) {
                    return None;
                }

                Some(now + ChronoDuration::from_std(period).ok()?)
            }
        }
    }

    /// The slot after `previous`, or after `now` when that one was missed.
    /// A timer that wakes slightly before `previous` doesn't get it again.
    pub fn following(
        &self,
        previous: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.next_after(previous.max(now))
    }
}

impl Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Daily { hour, minute } => write!(f, "daily at {:02}:{:02} UTC", hour, minute),
            Schedule::Hourly { minute } => write!(f, "hourly at minute {:02}", minute),
            Schedule::Every(period) => write!(f, "every {:?}", period),
        }
    }
}

/// What happened to a single run of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    Failed,
    /// The previous run of the same job hadn't finished yet
    Skipped,
}

#[derive(Clone)]
struct Job {
    id: String,
    schedule: Schedule,
    task: Task,
    running: Arc<Mutex<()>>,
}

impl Job {
    /// Take the run guard, `None` while another run of this job is going
    fn begin(&self) -> Option<OwnedMutexGuard<()>> {
        match self.running.clone().try_lock_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                log::warn!("Job {} is still running, skipping this run", self.id);
                None
            }
        }
    }

    async fn run(&self, permit: OwnedMutexGuard<()>) -> RunOutcome {
        let started = Instant::now();
        let task = self.task.clone();
        let outcome = match tokio::task::spawn_blocking(move || task()).await {
            Ok(Ok(())) => {
                log::info!("Job {} finished in {:?}", self.id, started.elapsed());
                RunOutcome::Finished
            }
            Ok(Err(e)) => {
                log::error!("Job {} failed: {}", self.id, e);
                RunOutcome::Failed
            }
            Err(e) => {
                log::error!("Job {} panicked: {}", self.id, e);
                RunOutcome::Failed
            }
        };

        drop(permit);
        outcome
    }

    async fn drive(self, cancel: CancellationToken) {
        log::info!("Job {} scheduled {}", self.id, self.schedule);

        let mut previous = None;

        loop {
            let now = Utc::now();
            let next = match previous {
                Some(previous) => self.schedule.following(previous, now),
                None => self.schedule.next_after(now),
            };
            let next = match next {
                Some(next) => next,
                None => {
                    log::error!("Job {} has no next run, giving up", self.id);
                    break;
                }
            };

            let wait = (next - now).to_std().unwrap_or_default();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            previous = Some(next);

            // The timer keeps ticking while a run is in flight
            if let Some(permit) = self.begin() {
                let job = self.clone();
                tokio::spawn(async move {
                    job.run(permit).await;
                });
            }
        }

        log::debug!("Job {} timer stopped", self.id);
    }
}

/// Owns a set of periodic jobs. Each job has its own timer and never runs
/// concurrently with itself, a tick that finds the previous run still going
/// is skipped.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Job>,
    cancel: Option<CancellationToken>,
    timers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(
        &mut self,
        id: impl Into<String>,
        schedule: Schedule,
        task: Task,
    ) -> Result<(), Error> {
        let id = id.into();
        if self.is_running() {
            return Err(anyhow!("can't add job {} to a running scheduler", id));
        }

        if self.jobs.iter().any(|job| job.id == id) {
            return Err(anyhow!("job {} is already registered", id));
        }

        if schedule.next_after(Utc::now()).is_none() {
            return Err(anyhow!("job {} has an invalid schedule: {:?}", id, schedule));
        }

        self.jobs.push(Job {
            id,
            schedule,
            task,
            running: Arc::new(Mutex::new(())),
        });

        Ok(())
    }

    pub fn job_ids(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.id.as_str()).collect()
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }

    /// Start every job timer, must be called from within a Tokio runtime
    pub fn start(&mut self) -> Result<(), Error> {
        if self.is_running() {
            return Err(anyhow!("scheduler is already running"));
        }

        let runtime = tokio::runtime::Handle::try_current()?;
        let cancel = CancellationToken::new();
        for job in &self.jobs {
            let timer = job.clone().drive(cancel.child_token());
            self.timers.push(runtime.spawn(timer));
        }

        log::info!("Scheduler started with {} jobs", self.jobs.len());
        self.cancel = Some(cancel);
        Ok(())
    }

    /// Stop every timer and wait for runs already in flight to finish.
    /// Stopping an idle scheduler does nothing.
    pub async fn stop(&mut self) {
        let cancel = match self.cancel.take() {
            Some(cancel) => cancel,
            None => return,
        };

        cancel.cancel();
        for timer in self.timers.drain(..) {
            if let Err(e) = timer.await {
                log::error!("Scheduler timer ended abnormally: {}", e);
            }
        }

        for job in &self.jobs {
            let _ = job.running.lock().await;
        }

        log::info!("Scheduler stopped");
    }

    /// Run a job right away, outside of its timer. The same guard applies,
    /// so this is skipped if the job is already running.
    pub async fn run_now(&self, id: &str) -> Result<RunOutcome, Error> {
        let job = self
            .jobs
            .iter()
            .find(|job| job.id == id)
            .ok_or_else(|| anyhow!("unknown job {}", id))?;

        Ok(match job.begin() {
            Some(permit) => job.run(permit).await,
            None => RunOutcome::Skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: Arc<AtomicUsize>) -> Task {
        Arc::new(move || -> Result<(), Error> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn daily_schedule() {
        let schedule = Schedule::Daily { hour: 2, minute: 0 };

        let before = Utc.ymd(2020, 10, 1).and_hms(1, 30, 0);
        assert_eq!(
            schedule.next_after(before),
            Some(Utc.ymd(2020, 10, 1).and_hms(2, 0, 0))
        );

        let exactly = Utc.ymd(2020, 10, 1).and_hms(2, 0, 0);
        assert_eq!(
            schedule.next_after(exactly),
            Some(Utc.ymd(2020, 10, 2).and_hms(2, 0, 0))
        );

        let after = Utc.ymd(2020, 12, 31).and_hms(23, 59, 59);
        assert_eq!(
            schedule.next_after(after),
            Some(Utc.ymd(2021, 1, 1).and_hms(2, 0, 0))
        );
    }

    #[test]
    fn early_wake_up_does_not_fire_twice() {
        let schedule = Schedule::Hourly { minute: 30 };
        let slot = Utc.ymd(2020, 10, 1).and_hms(13, 30, 0);
        let early = Utc.ymd(2020, 10, 1).and_hms_milli(13, 29, 59, 990);

        assert_eq!(schedule.next_after(early), Some(slot));
        assert_eq!(
            schedule.following(slot, early),
            Some(Utc.ymd(2020, 10, 1).and_hms(14, 30, 0))
        );

        // Missed slots are skipped, not replayed
        let late = Utc.ymd(2020, 10, 1).and_hms(16, 45, 0);
        assert_eq!(
            schedule.following(slot, late),
            Some(Utc.ymd(2020, 10, 1).and_hms(17, 30, 0))
        );

        let schedule = Schedule::Every(Duration::from_secs(60));
        assert_eq!(schedule.following(slot, early), Some(slot + ChronoDuration::minutes(1)));
    }

    #[test]
    fn hourly_schedule() {
        let schedule = Schedule::Hourly { minute: 0 };

        let now = Utc.ymd(2020, 10, 1).and_hms(13, 0, 1);
        assert_eq!(
            schedule.next_after(now),
            Some(Utc.ymd(2020, 10, 1).and_hms(14, 0, 0))
        );

        let now = Utc.ymd(2020, 10, 1).and_hms(23, 45, 0);
        assert_eq!(
            schedule.next_after(now),
            Some(Utc.ymd(2020, 10, 2).and_hms(0, 0, 0))
        );

        let schedule = Schedule::Hourly { minute: 30 };
        let now = Utc.ymd(2020, 10, 1).and_hms(13, 10, 0);
        assert_eq!(
            schedule.next_after(now),
            Some(Utc.ymd(2020, 10, 1).and_hms(13, 30, 0))
        );
    }

    #[test]
    fn schedules_that_never_fire() {
        let now = Utc::now();
        assert_eq!(Schedule::Daily { hour: 24, minute: 0 }.next_after(now), None);
        assert_eq!(Schedule::Hourly { minute: 60 }.next_after(now), None);
        assert_eq!(Schedule::Every(Duration::from_secs(0)).next_after(now), None);
    }

    #[test]
    fn bad_registrations_are_rejected() {
        let mut scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler
            .add_job("sweep", Schedule::Hourly { minute: 0 }, counting(counter.clone()))
            .unwrap();
        assert!(scheduler
            .add_job("sweep", Schedule::Hourly { minute: 5 }, counting(counter.clone()))
            .is_err());
        assert!(scheduler
            .add_job("bad", Schedule::Daily { hour: 25, minute: 0 }, counting(counter))
            .is_err());

        assert_eq!(scheduler.job_ids(), vec!["sweep"]);
    }

    #[test]
    fn start_needs_a_runtime() {
        let mut scheduler = Scheduler::new();
        assert!(scheduler.start().is_err());
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn jobs_fire_until_stopped() -> Result<(), Error> {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.add_job(
            "tick",
            Schedule::Every(Duration::from_millis(20)),
            counting(counter.clone()),
        )?;

        scheduler.start()?;
        assert!(scheduler.start().is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());

        let fired = counter.load(Ordering::SeqCst);
        assert!(fired >= 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), fired);

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn a_job_never_overlaps_itself() -> Result<(), Error> {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let task: Task = {
            let (active, peak, runs) = (active.clone(), peak.clone(), runs.clone());
            Arc::new(move || -> Result<(), Error> {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(60));
                active.fetch_sub(1, Ordering::SeqCst);
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        let mut scheduler = Scheduler::new();
        scheduler.add_job("slow", Schedule::Every(Duration::from_millis(10)), task)?;
        scheduler.start()?;
        tokio::time::sleep(Duration::from_millis(300)).await;
        scheduler.stop().await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(active.load(Ordering::SeqCst), 0);
        // Far fewer runs than ticks
        assert!(runs.load(Ordering::SeqCst) >= 1);
        assert!(runs.load(Ordering::SeqCst) <= 6);

        Ok(())
    }

    #[tokio::test]
    async fn failing_job_keeps_its_schedule() -> Result<(), Error> {
        let attempts = Arc::new(AtomicUsize::new(0));
        let task: Task = {
            let attempts = attempts.clone();
            Arc::new(move || -> Result<(), Error> {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("storage is down"))
            })
        };

        let mut scheduler = Scheduler::new();
        scheduler.add_job("flaky", Schedule::Every(Duration::from_millis(20)), task)?;
        assert_eq!(scheduler.run_now("flaky").await?, RunOutcome::Failed);

        scheduler.start()?;
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.stop().await;

        assert!(attempts.load(Ordering::SeqCst) >= 3);

        Ok(())
    }

    #[tokio::test]
    async fn run_now_respects_the_guard() -> Result<(), Error> {
        let task: Task = Arc::new(|| -> Result<(), Error> {
            std::thread::sleep(Duration::from_millis(50));
            Ok(())
        });

        let mut scheduler = Scheduler::new();
        scheduler.add_job("report", Schedule::Daily { hour: 2, minute: 0 }, task)?;

        let (first, second) = tokio::join!(scheduler.run_now("report"), scheduler.run_now("report"));
        assert_eq!(first?, RunOutcome::Finished);
        assert_eq!(second?, RunOutcome::Skipped);

        assert_eq!(scheduler.run_now("report").await?, RunOutcome::Finished);
        assert!(scheduler.run_now("missing").await.is_err());

        Ok(())
    }
}
