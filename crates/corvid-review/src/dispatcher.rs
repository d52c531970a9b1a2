//! The dispatch engine: turns chunks into analysis tasks and runs them under
//! a bounded pool with per-task deadlines, retry with backoff, a shared rate
//! limiter, and an overall run deadline.
//!
//! A single coordinator owns the task queue and the in-flight set; workers
//! are spawned attempts that communicate results back through the join set.
//! Every (chunk, focus) pair produces exactly one terminal [`TaskOutcome`] —
//! a task is never silently dropped, even when the run deadline expires
//! before it was scheduled.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use corvid_core::{CodeChunk, Finding, FocusArea, ReviewConfig};
use indicatif::ProgressBar;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Duration, Instant};

use crate::analyst::Analyst;

/// Tunables for one dispatch run, extracted from [`ReviewConfig`].
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Worker pool size.
    pub concurrency: usize,
    /// Deadline for one attempt.
    pub task_timeout: Duration,
    /// Wall-clock budget for the whole run.
    pub run_deadline: Duration,
    /// Attempts per task, including the first.
    pub max_attempts: u32,
    /// Capability invocations allowed per minute.
    pub requests_per_minute: u32,
    /// Base backoff delay; doubles per completed attempt.
    pub backoff_base: Duration,
}

impl DispatchConfig {
    /// Extract dispatch tunables from the review configuration.
    pub fn from_review(config: &ReviewConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            task_timeout: Duration::from_secs(config.timeout_seconds),
            run_deadline: Duration::from_secs(config.run_deadline_seconds),
            max_attempts: config.max_attempts,
            requests_per_minute: config.requests_per_minute,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// One unit of dispatched work: a chunk under one focus lens.
#[derive(Debug, Clone)]
struct AnalysisTask {
    chunk: Arc<CodeChunk>,
    focus: FocusArea,
    /// Completed attempts so far.
    attempts: u32,
}

/// Terminal failure of one (chunk, focus) pair.
#[derive(Debug, Clone)]
pub enum TaskFailure {
    /// Every allowed attempt failed transiently.
    RetriesExhausted(String),
    /// The capability reported a non-retryable error.
    Permanent(String),
    /// The run's wall-clock budget expired before the task could finish.
    RunDeadlineExceeded,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::RetriesExhausted(msg) => write!(f, "retries exhausted: {msg}"),
            TaskFailure::Permanent(msg) => write!(f, "{msg}"),
            TaskFailure::RunDeadlineExceeded => write!(f, "run deadline exceeded"),
        }
    }
}

/// Terminal outcome of one (chunk, focus) pair.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// The analyzed chunk.
    pub chunk: Arc<CodeChunk>,
    /// The lens that was applied.
    pub focus: FocusArea,
    /// Attempts consumed, including the successful or final failed one.
    pub attempts: u32,
    /// Findings on success, failure record otherwise.
    pub result: Result<Vec<Finding>, TaskFailure>,
}

enum Attempt {
    Success(Vec<Finding>),
    Transient(String),
    Permanent(String),
}

struct AttemptResult {
    task: AnalysisTask,
    attempt: Attempt,
}

/// Token-bucket rate limiter shared by all workers.
///
/// Refills at `per_minute / 60` tokens per second with one second of burst
/// capacity, so a pool wider than the throughput ceiling still cannot exceed
/// it; ready-but-limited workers block here, not on each other. The lock is
/// held only to update the bucket, never across a suspension point.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter allowing `per_minute` acquisitions per minute.
    pub fn new(per_minute: u32) -> Self {
        let refill_per_sec = f64::from(per_minute) / 60.0;
        let capacity = refill_per_sec.max(1.0);
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                bucket.last_refill = now;
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_per_sec)
            };
            sleep(wait).await;
        }
    }
}

/// Runs the cross product of chunks × enabled focuses to terminal outcomes.
pub struct AgentDispatcher {
    analyst: Arc<dyn Analyst>,
    config: DispatchConfig,
    progress: Option<ProgressBar>,
}

impl AgentDispatcher {
    /// Create a dispatcher over the given analysis capability.
    pub fn new(analyst: Arc<dyn Analyst>, config: DispatchConfig) -> Self {
        Self {
            analyst,
            config,
            progress: None,
        }
    }

    /// Attach a progress bar, ticked once per terminal outcome.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Dispatch every (chunk, focus) pair and collect terminal outcomes.
    ///
    /// Tasks are queued file-major — all focuses for a file's chunks before
    /// the next file — so per-file results complete earlier. Outcomes arrive
    /// in completion order; the aggregator regroups them per file.
    pub async fn dispatch(&self, chunks: Vec<CodeChunk>, focuses: &[FocusArea]) -> Vec<TaskOutcome> {
        let mut queue: VecDeque<AnalysisTask> = VecDeque::new();
        for chunk in chunks {
            let chunk = Arc::new(chunk);
            for focus in focuses {
                queue.push_back(AnalysisTask {
                    chunk: Arc::clone(&chunk),
                    focus: *focus,
                    attempts: 0,
                });
            }
        }

        let expected = queue.len();
        if let Some(pb) = &self.progress {
            pb.set_length(expected as u64);
        }

        let limiter = Arc::new(RateLimiter::new(self.config.requests_per_minute));
        let deadline = Instant::now() + self.config.run_deadline;
        let mut in_flight: JoinSet<AttemptResult> = JoinSet::new();
        let mut outcomes = Vec::with_capacity(expected);

        loop {
            // Refill the pool. Once the run deadline passes, nothing new is
            // scheduled; in-flight attempts run to their own deadlines.
            while in_flight.len() < self.config.concurrency && Instant::now() < deadline {
                let Some(task) = queue.pop_front() else { break };
                in_flight.spawn(run_attempt(
                    task,
                    Arc::clone(&self.analyst),
                    Arc::clone(&limiter),
                    self.config.task_timeout,
                    self.config.backoff_base,
                ));
            }

            if in_flight.is_empty() {
                break;
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    eprintln!("warning: analysis attempt aborted: {e}");
                    continue;
                }
            };

            let task = result.task;
            let completed = task.attempts + 1;
            match result.attempt {
                Attempt::Success(findings) => {
                    self.record(&mut outcomes, task.chunk, task.focus, completed, Ok(findings));
                }
                Attempt::Permanent(msg) => {
                    self.record(
                        &mut outcomes,
                        task.chunk,
                        task.focus,
                        completed,
                        Err(TaskFailure::Permanent(msg)),
                    );
                }
                Attempt::Transient(msg) => {
                    if completed >= self.config.max_attempts {
                        self.record(
                            &mut outcomes,
                            task.chunk,
                            task.focus,
                            completed,
                            Err(TaskFailure::RetriesExhausted(msg)),
                        );
                    } else if Instant::now() >= deadline {
                        self.record(
                            &mut outcomes,
                            task.chunk,
                            task.focus,
                            completed,
                            Err(TaskFailure::RunDeadlineExceeded),
                        );
                    } else {
                        // Back of the queue, not re-attempted in place.
                        queue.push_back(AnalysisTask {
                            attempts: completed,
                            ..task
                        });
                    }
                }
            }
        }

        // The deadline expired with tasks still queued: account for each.
        while let Some(task) = queue.pop_front() {
            self.record(
                &mut outcomes,
                task.chunk,
                task.focus,
                task.attempts,
                Err(TaskFailure::RunDeadlineExceeded),
            );
        }

        outcomes
    }

    fn record(
        &self,
        outcomes: &mut Vec<TaskOutcome>,
        chunk: Arc<CodeChunk>,
        focus: FocusArea,
        attempts: u32,
        result: Result<Vec<Finding>, TaskFailure>,
    ) {
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
        outcomes.push(TaskOutcome {
            chunk,
            focus,
            attempts,
            result,
        });
    }
}

/// One attempt: backoff (for retries), rate-limit permit, capability call
/// under the per-task deadline. A timed-out attempt is a transient failure.
async fn run_attempt(
    task: AnalysisTask,
    analyst: Arc<dyn Analyst>,
    limiter: Arc<RateLimiter>,
    task_timeout: Duration,
    backoff_base: Duration,
) -> AttemptResult {
    if task.attempts > 0 {
        sleep(backoff_delay(backoff_base, task.attempts)).await;
    }

    limiter.acquire().await;

    let attempt = match timeout(task_timeout, analyst.analyze(&task.chunk, task.focus)).await {
        Ok(Ok(findings)) => Attempt::Success(findings),
        Ok(Err(e)) if e.is_retryable() => Attempt::Transient(e.to_string()),
        Ok(Err(e)) => Attempt::Permanent(e.to_string()),
        Err(_) => Attempt::Transient("task deadline exceeded".into()),
    };

    AttemptResult { task, attempt }
}

fn backoff_delay(base: Duration, completed_attempts: u32) -> Duration {
    base * 2u32.pow(completed_attempts.saturating_sub(1).min(16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyst::AnalysisError;
    use async_trait::async_trait;
    use corvid_core::Severity;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn chunk(path: &str, index: usize) -> CodeChunk {
        CodeChunk {
            file_path: PathBuf::from(path),
            start_line: (index as u32) * 10 + 1,
            end_line: (index as u32) * 10 + 5,
            content: "let x = 1;\n".into(),
            index,
        }
    }

    fn test_config() -> DispatchConfig {
        DispatchConfig {
            concurrency: 4,
            task_timeout: Duration::from_secs(1),
            run_deadline: Duration::from_secs(3600),
            max_attempts: 3,
            requests_per_minute: 60_000,
            backoff_base: Duration::from_millis(500),
        }
    }

    /// Returns one deterministic finding per (chunk, focus).
    struct OkStub;

    #[async_trait]
    impl Analyst for OkStub {
        async fn analyze(
            &self,
            chunk: &CodeChunk,
            focus: FocusArea,
        ) -> Result<Vec<Finding>, AnalysisError> {
            Ok(vec![Finding {
                file_path: chunk.file_path.clone(),
                line: Some(chunk.start_line),
                severity: Severity::Medium,
                focus,
                message: format!("{} chunk {} via {focus}", chunk.file_path.display(), chunk.index),
                suggestion: None,
            }])
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    /// Hangs for the first `hang_times` calls, then succeeds.
    struct HangThenOkStub {
        hang_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Analyst for HangThenOkStub {
        async fn analyze(
            &self,
            chunk: &CodeChunk,
            focus: FocusArea,
        ) -> Result<Vec<Finding>, AnalysisError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.hang_times {
                sleep(Duration::from_secs(3600)).await;
            }
            Ok(vec![Finding {
                file_path: chunk.file_path.clone(),
                line: Some(chunk.start_line),
                severity: Severity::High,
                focus,
                message: "finally".into(),
                suggestion: None,
            }])
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    struct PermanentStub {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Analyst for PermanentStub {
        async fn analyze(
            &self,
            _chunk: &CodeChunk,
            _focus: FocusArea,
        ) -> Result<Vec<Finding>, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AnalysisError::Permanent("malformed chunk".into()))
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    struct AlwaysTransientStub;

    #[async_trait]
    impl Analyst for AlwaysTransientStub {
        async fn analyze(
            &self,
            _chunk: &CodeChunk,
            _focus: FocusArea,
        ) -> Result<Vec<Finding>, AnalysisError> {
            Err(AnalysisError::Transient("rate limited".into()))
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    /// Takes a fixed simulated duration, then succeeds.
    struct SlowStub {
        delay: Duration,
    }

    #[async_trait]
    impl Analyst for SlowStub {
        async fn analyze(
            &self,
            _chunk: &CodeChunk,
            _focus: FocusArea,
        ) -> Result<Vec<Finding>, AnalysisError> {
            sleep(self.delay).await;
            Ok(vec![])
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    fn sorted_keys(outcomes: &[TaskOutcome]) -> Vec<(PathBuf, usize, FocusArea)> {
        let mut keys: Vec<_> = outcomes
            .iter()
            .map(|o| (o.chunk.file_path.clone(), o.chunk.index, o.focus))
            .collect();
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn every_pair_gets_exactly_one_outcome() {
        let dispatcher = AgentDispatcher::new(Arc::new(OkStub), test_config());
        let chunks = vec![chunk("a.rs", 0), chunk("a.rs", 1), chunk("b.rs", 0)];
        let focuses = [FocusArea::Security, FocusArea::Quality];

        let outcomes = dispatcher.dispatch(chunks, &focuses).await;

        assert_eq!(outcomes.len(), 6);
        let keys = sorted_keys(&outcomes);
        let mut deduped = keys.clone();
        deduped.dedup();
        assert_eq!(keys, deduped, "duplicate (chunk, focus) outcome");
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_retries_then_succeeds_after_backoff() {
        let stub = Arc::new(HangThenOkStub {
            hang_times: 2,
            calls: AtomicU32::new(0),
        });
        let dispatcher = AgentDispatcher::new(stub, test_config());

        let started = Instant::now();
        let outcomes = dispatcher
            .dispatch(vec![chunk("a.rs", 0)], &[FocusArea::Quality])
            .await;
        let elapsed = started.elapsed();

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_ok());
        assert_eq!(outcomes[0].attempts, 3);
        // Two timed-out attempts plus two backoff intervals (500ms + 1s).
        assert!(elapsed >= Duration::from_millis(3500), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let stub = Arc::new(PermanentStub {
            calls: AtomicU32::new(0),
        });
        let dispatcher = AgentDispatcher::new(Arc::clone(&stub) as Arc<dyn Analyst>, test_config());

        let outcomes = dispatcher
            .dispatch(vec![chunk("a.rs", 0)], &[FocusArea::Quality])
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].attempts, 1);
        assert!(matches!(
            outcomes[0].result,
            Err(TaskFailure::Permanent(_))
        ));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_exhaust_retries() {
        let dispatcher = AgentDispatcher::new(Arc::new(AlwaysTransientStub), test_config());

        let outcomes = dispatcher
            .dispatch(vec![chunk("a.rs", 0)], &[FocusArea::Quality])
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].attempts, 3);
        assert!(matches!(
            outcomes[0].result,
            Err(TaskFailure::RetriesExhausted(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_pair_does_not_abort_siblings() {
        // Quality hangs forever; security succeeds. The security outcomes
        // must be unaffected by quality exhausting its retries.
        struct FocusSplitStub;

        #[async_trait]
        impl Analyst for FocusSplitStub {
            async fn analyze(
                &self,
                chunk: &CodeChunk,
                focus: FocusArea,
            ) -> Result<Vec<Finding>, AnalysisError> {
                if focus == FocusArea::Quality {
                    return Err(AnalysisError::Transient("flaky".into()));
                }
                Ok(vec![Finding {
                    file_path: chunk.file_path.clone(),
                    line: None,
                    severity: Severity::Low,
                    focus,
                    message: "ok".into(),
                    suggestion: None,
                }])
            }

            fn model(&self) -> &str {
                "stub"
            }
        }

        let dispatcher = AgentDispatcher::new(Arc::new(FocusSplitStub), test_config());
        let outcomes = dispatcher
            .dispatch(
                vec![chunk("a.rs", 0), chunk("b.rs", 0)],
                &[FocusArea::Security, FocusArea::Quality],
            )
            .await;

        assert_eq!(outcomes.len(), 4);
        let ok = outcomes.iter().filter(|o| o.result.is_ok()).count();
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        assert_eq!(ok, 2);
        assert_eq!(failed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_deadline_marks_unscheduled_tasks() {
        let mut config = test_config();
        config.run_deadline = Duration::from_secs(5);
        config.task_timeout = Duration::from_secs(60);
        let dispatcher = AgentDispatcher::new(
            Arc::new(SlowStub {
                delay: Duration::from_secs(10),
            }),
            config,
        );

        let chunks: Vec<CodeChunk> = (0..25).map(|i| chunk("big.rs", i)).collect();
        let focuses = [FocusArea::Security, FocusArea::Quality];
        let outcomes = dispatcher.dispatch(chunks, &focuses).await;

        assert_eq!(outcomes.len(), 50, "every pair must be accounted for");
        let deadline_failures = outcomes
            .iter()
            .filter(|o| matches!(o.result, Err(TaskFailure::RunDeadlineExceeded)))
            .count();
        let finished = outcomes.iter().filter(|o| o.result.is_ok()).count();
        // The four in-flight tasks are allowed to finish past the deadline.
        assert_eq!(finished, 4);
        assert_eq!(deadline_failures, 46);
        assert_eq!(
            format!("{}", TaskFailure::RunDeadlineExceeded),
            "run deadline exceeded"
        );
    }

    #[tokio::test]
    async fn pool_width_does_not_change_results() {
        let chunks = vec![chunk("a.rs", 0), chunk("a.rs", 1), chunk("b.rs", 0)];
        let focuses = [FocusArea::Security, FocusArea::Performance, FocusArea::Quality];

        let mut narrow_cfg = test_config();
        narrow_cfg.concurrency = 1;
        let narrow = AgentDispatcher::new(Arc::new(OkStub), narrow_cfg)
            .dispatch(chunks.clone(), &focuses)
            .await;

        let mut wide_cfg = test_config();
        wide_cfg.concurrency = 8;
        let wide = AgentDispatcher::new(Arc::new(OkStub), wide_cfg)
            .dispatch(chunks, &focuses)
            .await;

        assert_eq!(sorted_keys(&narrow), sorted_keys(&wide));

        let messages = |outcomes: &[TaskOutcome]| {
            let mut m: Vec<String> = outcomes
                .iter()
                .flat_map(|o| o.result.as_ref().ok().into_iter().flatten())
                .map(|f| f.message.clone())
                .collect();
            m.sort();
            m
        };
        assert_eq!(messages(&narrow), messages(&wide));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_spaces_acquisitions() {
        let limiter = RateLimiter::new(60); // 1 token/sec, capacity 1

        let started = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(1900), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_caps_wide_pools() {
        // Pool of 8 workers against a 60 rpm ceiling: ten instant tasks must
        // take at least ~9 seconds of simulated time.
        let mut config = test_config();
        config.concurrency = 8;
        config.requests_per_minute = 60;
        let dispatcher = AgentDispatcher::new(Arc::new(OkStub), config);

        let chunks: Vec<CodeChunk> = (0..10).map(|i| chunk("a.rs", i)).collect();
        let started = Instant::now();
        let outcomes = dispatcher.dispatch(chunks, &[FocusArea::Quality]).await;
        let elapsed = started.elapsed();

        assert_eq!(outcomes.len(), 10);
        assert!(elapsed >= Duration::from_secs(9), "elapsed {elapsed:?}");
    }
}
