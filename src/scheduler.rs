//! Scheduler driving task trees.
//!
//! Each submitted task is driven by one async state machine. Children are
//! spawned into a `JoinSet` owned by their parent, so a parent observes
//! completions in whatever order they happen and never blocks on a specific
//! child. Run bodies share a semaphore that bounds how many execute at once;
//! coordinating tasks hold no permit while they wait on children.
//!
//! Cancellation is a token tree: every task gets a child token of its
//! parent's children token. Canceling a task reaches all its descendants,
//! and a parent can cancel its children without canceling itself.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StrandrError};
use crate::id::{depth_of, generate_task_id};
use crate::task::{Task, TaskContext, TaskOutcome, TaskReport, TaskState};

/// Configuration for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of run bodies executing at the same time.
    pub max_parallel_runs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel_runs: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_parallel_runs(mut self, max: usize) -> Self {
        self.max_parallel_runs = max;
        self
    }
}

/// State transition of one task in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub state: TaskState,
}

/// Handle to a submitted top-level task.
pub struct TaskHandle {
    id: String,
    cancel: CancellationToken,
    join: JoinHandle<TaskReport>,
}

impl TaskHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request cancellation of the task and its whole subtree.
    pub fn cancel(&self) {
        log::info!("[{}] cancel requested", self.id);
        self.cancel.cancel();
    }

    /// Token that cancels the task when triggered, usable after `wait` took the handle.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the terminal report.
    pub async fn wait(self) -> Result<TaskReport> {
        self.join
            .await
            .map_err(|e| StrandrError::Scheduler(format!("task {} aborted: {}", self.id, e)))
    }
}

struct Engine {
    permits: Arc<Semaphore>,
    events: Option<mpsc::UnboundedSender<TaskEvent>>,
}

/// Runs tasks and their subtasks on the tokio runtime.
#[derive(Clone)]
pub struct Scheduler {
    engine: Arc<Engine>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a scheduler that reports every state transition on a channel.
    pub fn with_events(config: SchedulerConfig) -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::build(config, Some(tx)), rx)
    }

    fn build(config: SchedulerConfig, events: Option<mpsc::UnboundedSender<TaskEvent>>) -> Self {
        let permits = config.max_parallel_runs.max(1);
        log::debug!("scheduler started with {} run permits", permits);
        Self {
            engine: Arc::new(Engine {
                permits: Arc::new(Semaphore::new(permits)),
                events,
            }),
        }
    }

    /// Submit a top-level task. Must be called from within a tokio runtime.
    pub fn submit(&self, task: Box<dyn Task>) -> TaskHandle {
        let id = generate_task_id();
        let cancel = CancellationToken::new();
        log::info!("[{}] submitted {}", id, task.name());
        self.engine.emit(&id, None, task.name(), TaskState::Created);
        let join = tokio::spawn(self.engine.clone().drive(task, id.clone(), None, cancel.clone()));
        TaskHandle { id, cancel, join }
    }

    /// Submit a task and wait for its report.
    pub async fn run(&self, task: Box<dyn Task>) -> Result<TaskReport> {
        self.submit(task).wait().await
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Engine {
    fn emit(&self, task_id: &str, parent_id: Option<&str>, name: &str, state: TaskState) {
        log::debug!("{}[{}] {} -> {:?}", "  ".repeat(depth_of(task_id)), task_id, name, state);
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening any more.
            let _ = tx.send(TaskEvent {
                task_id: task_id.to_string(),
                parent_id: parent_id.map(str::to_string),
                name: name.to_string(),
                state,
            });
        }
    }

    /// Drive one task through its whole lifecycle.
    fn drive(
        self: Arc<Self>,
        mut task: Box<dyn Task>,
        id: String,
        parent: Option<String>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, TaskReport> {
        async move {
            let name = task.name().to_string();
            let flags = task.flags();
            let parent = parent.as_deref();
            let mut ctx = TaskContext::new(id.clone(), cancel);
            let children_cancel = ctx.cancel_token().child_token();

            self.emit(&id, parent, &name, TaskState::Preparing);
            if !ctx.is_canceled() {
                if let Err(e) = task.prepare(&mut ctx) {
                    ctx.set_error(e.to_string());
                }
            }

            let mut active: JoinSet<TaskReport> = JoinSet::new();
            let mut running = false;
            loop {
                self.launch_pending(&mut ctx, &mut active, &children_cancel);
                if active.is_empty() {
                    break;
                }
                if !running {
                    running = true;
                    self.emit(&id, parent, &name, TaskState::Running);
                }
                let subtask = match active.join_next().await {
                    Some(Ok(report)) => report,
                    Some(Err(e)) => {
                        ctx.set_error(format!("subtask of {} aborted: {}", name, e));
                        children_cancel.cancel();
                        continue;
                    }
                    None => break,
                };
                log::debug!("[{}] subtask {} finished: {:?}", id, subtask.id, subtask.outcome);
                ctx.absorb_subtask(&subtask, flags);
                if let Err(e) = task.on_subtask_finished(subtask, &mut ctx) {
                    ctx.set_error(e.to_string());
                }
                if ctx.has_error() {
                    children_cancel.cancel();
                }
            }

            if !flags.no_run && !ctx.should_stop() {
                if !running {
                    self.emit(&id, parent, &name, TaskState::Running);
                }
                self.run_body(task.as_mut(), &mut ctx).await;
                let stray = ctx.take_pending();
                if !stray.is_empty() {
                    log::warn!("[{}] {} subtasks queued from run were dropped", id, stray.len());
                }
            }

            self.emit(&id, parent, &name, TaskState::Reporting);
            if let Err(e) = task.report(&mut ctx) {
                ctx.set_error(e.to_string());
            }
            let outcome = ctx.outcome();
            let output = task.take_output();
            drop(task);

            self.emit(&id, parent, &name, outcome.state());
            match &outcome {
                TaskOutcome::Failed(error) => log::info!("[{}] {} failed: {}", id, name, error),
                other => log::info!("[{}] {} {:?}", id, name, other),
            }
            let status = ctx.into_status();
            TaskReport::new(id, name, outcome, status.warnings, output)
        }
        .boxed()
    }

    /// Launch the children queued by the last hook, or discard them when the
    /// task is already stopping.
    fn launch_pending(
        self: &Arc<Self>,
        ctx: &mut TaskContext,
        active: &mut JoinSet<TaskReport>,
        children_cancel: &CancellationToken,
    ) {
        let pending = ctx.take_pending();
        if pending.is_empty() {
            return;
        }
        if ctx.should_stop() {
            log::debug!("[{}] discarding {} queued subtasks", ctx.id(), pending.len());
            return;
        }
        for (child_id, child) in pending {
            self.emit(&child_id, Some(ctx.id()), child.name(), TaskState::Created);
            let parent_id = Some(ctx.id().to_string());
            active.spawn(self.clone().drive(child, child_id, parent_id, children_cancel.child_token()));
        }
    }

    /// Execute the run body under a permit. Waiting for the permit gives way
    /// to cancellation.
    async fn run_body(&self, task: &mut dyn Task, ctx: &mut TaskContext) {
        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => permit,
            _ = ctx.cancelled() => return,
        };
        let _permit = match permit {
            Ok(permit) => permit,
            Err(e) => {
                ctx.set_error(format!("scheduler closed: {}", e));
                return;
            }
        };
        if let Err(e) = task.run(ctx).await {
            ctx.set_error(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::task::{TaskFlags, TaskOutput};

    #[derive(Default)]
    struct Leaf {
        name: String,
        value: u32,
        fail: Option<String>,
        wait_for_cancel: bool,
        concurrency: Option<(Arc<AtomicUsize>, Arc<AtomicUsize>)>,
    }

    impl Leaf {
        fn value(value: u32) -> Self {
            Self {
                name: format!("leaf-{}", value),
                value,
                ..Self::default()
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                name: "failing".to_string(),
                fail: Some(message.to_string()),
                ..Self::default()
            }
        }

        fn blocking() -> Self {
            Self {
                name: "blocking".to_string(),
                wait_for_cancel: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Task for Leaf {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&mut self, ctx: &mut TaskContext) -> Result<()> {
            if let Some((current, peak)) = &self.concurrency {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }
            if self.wait_for_cancel {
                ctx.cancelled().await;
                return Ok(());
            }
            if let Some(message) = &self.fail {
                return Err(StrandrError::TaskFailed(message.clone()));
            }
            Ok(())
        }

        fn take_output(&mut self) -> Option<TaskOutput> {
            Some(Box::new(self.value))
        }
    }

    /// Sums child outputs. Queues `follow_up` once every initial child is done.
    struct Summing {
        flags: TaskFlags,
        initial: Vec<Leaf>,
        follow_up: Vec<u32>,
        outstanding: usize,
        sum: u32,
        seen: Vec<String>,
        cancel_after_first: bool,
    }

    impl Summing {
        fn new(initial: Vec<Leaf>) -> Self {
            Self {
                flags: TaskFlags::composite(),
                initial,
                follow_up: vec![],
                outstanding: 0,
                sum: 0,
                seen: vec![],
                cancel_after_first: false,
            }
        }
    }

    #[async_trait]
    impl Task for Summing {
        fn name(&self) -> &str {
            "summing"
        }

        fn flags(&self) -> TaskFlags {
            self.flags
        }

        fn prepare(&mut self, ctx: &mut TaskContext) -> Result<()> {
            for leaf in self.initial.drain(..) {
                ctx.add_subtask(Box::new(leaf));
                self.outstanding += 1;
            }
            Ok(())
        }

        fn on_subtask_finished(&mut self, mut subtask: TaskReport, ctx: &mut TaskContext) -> Result<()> {
            self.outstanding -= 1;
            self.seen.push(subtask.name.clone());
            if let Some(value) = subtask.take_output::<u32>() {
                self.sum += value;
            }
            if self.cancel_after_first {
                ctx.cancel();
                ctx.add_subtask(Box::new(Leaf::value(1000)));
                return Ok(());
            }
            if self.outstanding == 0 {
                for value in self.follow_up.drain(..) {
                    ctx.add_subtask(Box::new(Leaf::value(value)));
                    self.outstanding += 1;
                }
            }
            Ok(())
        }

        fn take_output(&mut self) -> Option<TaskOutput> {
            Some(Box::new(self.sum))
        }
    }

    fn collect(rx: &mut mpsc::UnboundedReceiver<TaskEvent>) -> Vec<TaskEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_composite_without_subtasks_skips_running() {
        let (scheduler, mut rx) = Scheduler::with_events(SchedulerConfig::default());
        let handle = scheduler.submit(Box::new(Summing::new(vec![])));
        let id = handle.id().to_string();
        let report = handle.wait().await.unwrap();

        assert_eq!(report.outcome, TaskOutcome::Finished);
        let states: Vec<TaskState> = collect(&mut rx)
            .into_iter()
            .filter(|e| e.task_id == id)
            .map(|e| e.state)
            .collect();
        assert_eq!(
            states,
            vec![
                TaskState::Created,
                TaskState::Preparing,
                TaskState::Reporting,
                TaskState::Finished
            ]
        );
    }

    #[tokio::test]
    async fn test_fan_out_aggregates_child_outputs() {
        let scheduler = Scheduler::default();
        let mut task = Summing::new(vec![Leaf::value(1), Leaf::value(2), Leaf::value(3)]);
        task.follow_up = vec![10, 20];
        let mut report = scheduler.run(Box::new(task)).await.unwrap();

        assert!(report.is_finished());
        assert_eq!(report.take_output::<u32>(), Some(36));
    }

    #[tokio::test]
    async fn test_leaf_passes_through_running() {
        let (scheduler, mut rx) = Scheduler::with_events(SchedulerConfig::default());
        let report = scheduler.run(Box::new(Leaf::value(5))).await.unwrap();
        assert!(report.is_finished());
        let states: Vec<TaskState> = collect(&mut rx).into_iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![
                TaskState::Created,
                TaskState::Preparing,
                TaskState::Running,
                TaskState::Reporting,
                TaskState::Finished
            ]
        );
    }

    #[tokio::test]
    async fn test_child_error_fails_parent_and_cancels_siblings() {
        // Both leaves need a permit at once: the blocking one only returns on cancel.
        let (scheduler, mut rx) = Scheduler::with_events(SchedulerConfig::default().with_max_parallel_runs(2));
        let task = Summing::new(vec![Leaf::blocking(), Leaf::failing("bad input")]);
        let report = scheduler.run(Box::new(task)).await.unwrap();

        assert!(report.is_failed());
        assert!(report.error().unwrap().contains("bad input"));
        let blocking_end = collect(&mut rx)
            .into_iter()
            .filter(|e| e.name == "blocking" && e.state.is_terminal())
            .map(|e| e.state)
            .collect::<Vec<_>>();
        assert_eq!(blocking_end, vec![TaskState::Canceled]);
    }

    #[tokio::test]
    async fn test_child_error_is_warning_when_continuing() {
        let scheduler = Scheduler::default();
        let mut task = Summing::new(vec![Leaf::value(4), Leaf::failing("flaky")]);
        task.flags = TaskFlags::composite().continue_on_subtask_error();
        let mut report = scheduler.run(Box::new(task)).await.unwrap();

        assert!(report.is_finished());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("flaky"));
        // A failed child still hands over its output.
        assert_eq!(report.take_output::<u32>(), Some(4));
    }

    #[tokio::test]
    async fn test_cancel_mid_fan_out_discards_queued_children() {
        let (scheduler, mut rx) = Scheduler::with_events(SchedulerConfig::default());
        let mut task = Summing::new(vec![Leaf::value(1)]);
        task.cancel_after_first = true;
        let report = scheduler.run(Box::new(task)).await.unwrap();

        assert!(report.is_canceled());
        let events = collect(&mut rx);
        assert!(!events.iter().any(|e| e.name == "leaf-1000"));
    }

    #[tokio::test]
    async fn test_handle_cancel_reaches_running_leaf() {
        let scheduler = Scheduler::default();
        let handle = scheduler.submit(Box::new(Summing::new(vec![Leaf::blocking()])));
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
        let report = handle.wait().await.unwrap();
        assert!(report.is_canceled());
        // Canceled children while stopping leave no warning behind.
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_max_parallel_runs_bounds_run_bodies() {
        let scheduler = Scheduler::new(SchedulerConfig::default().with_max_parallel_runs(1));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let leaves = (0..4)
            .map(|v| Leaf {
                concurrency: Some((current.clone(), peak.clone())),
                ..Leaf::value(v)
            })
            .collect();
        let report = scheduler.run(Box::new(Summing::new(leaves))).await.unwrap();

        assert!(report.is_finished());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_child_events_name_their_parent() {
        let (scheduler, mut rx) = Scheduler::with_events(SchedulerConfig::default());
        let handle = scheduler.submit(Box::new(Summing::new(vec![Leaf::value(7)])));
        let id = handle.id().to_string();
        handle.wait().await.unwrap();

        let child = collect(&mut rx)
            .into_iter()
            .find(|e| e.name == "leaf-7")
            .unwrap();
        assert_eq!(child.parent_id.as_deref(), Some(id.as_str()));
        assert_eq!(child.task_id, format!("{}.001", id));
    }
}
