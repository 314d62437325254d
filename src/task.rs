//! Task state machine and subtask composition protocol.
//!
//! A task is driven by the [`Scheduler`](crate::scheduler::Scheduler)
//! through these states:
//!
//! ```text
//! Created -> Preparing -> Running -> Reporting -> Finished | Canceled | Failed
//!                 \__________________/
//!                  (no children, no run body)
//! ```
//!
//! `prepare` may queue children with [`TaskContext::add_subtask`]. Each
//! finished child is handed back exactly once through
//! `on_subtask_finished`, which may queue more children. The task stays in
//! `Running` until no children are active and none were queued by the last
//! callback. `report` then gets the final say before the outcome is computed
//! from the status record.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StrandrError};
use crate::id::generate_child_id;

/// Result value a task hands to whoever consumes its report.
pub type TaskOutput = Box<dyn Any + Send>;

/// Behavioral flags, fixed for the lifetime of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFlags {
    /// Skip the `run` body; the task only coordinates children
    pub no_run: bool,
    /// Copy a child's error into this task, cancel siblings, stop fan-out.
    /// When unset the child's error is kept as a warning instead.
    pub fail_on_subtask_error: bool,
    /// Treat a canceled child as an error of this task
    pub fail_on_subtask_cancel: bool,
    /// Cancel this task when a child is canceled
    pub cancel_on_subtask_cancel: bool,
}

impl Default for TaskFlags {
    fn default() -> Self {
        Self {
            no_run: false,
            fail_on_subtask_error: true,
            fail_on_subtask_cancel: false,
            cancel_on_subtask_cancel: false,
        }
    }
}

impl TaskFlags {
    /// Flags for a task that only prepares and aggregates children.
    pub fn composite() -> Self {
        Self {
            no_run: true,
            ..Self::default()
        }
    }

    pub fn continue_on_subtask_error(mut self) -> Self {
        self.fail_on_subtask_error = false;
        self
    }

    pub fn fail_on_subtask_cancel(mut self) -> Self {
        self.fail_on_subtask_cancel = true;
        self
    }

    pub fn cancel_on_subtask_cancel(mut self) -> Self {
        self.cancel_on_subtask_cancel = true;
        self
    }
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Created,
    Preparing,
    /// Children are active or the run body is executing
    Running,
    Reporting,
    Finished,
    Canceled,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Canceled | TaskState::Failed)
    }
}

/// Terminal outcome of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Finished,
    Canceled,
    Failed(String),
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Finished => TaskState::Finished,
            TaskOutcome::Canceled => TaskState::Canceled,
            TaskOutcome::Failed(_) => TaskState::Failed,
        }
    }
}

/// Mutable status record of one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

impl TaskStatus {
    /// Record an error. The first error wins; later ones are logged only.
    pub fn set_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        match &self.error {
            Some(existing) => log::debug!("ignoring error '{}', already failed with '{}'", message, existing),
            None => self.error = Some(message),
        }
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Failed iff an error is present, Canceled iff canceled without error.
    pub fn outcome(&self, canceled: bool) -> TaskOutcome {
        match &self.error {
            Some(error) => TaskOutcome::Failed(error.clone()),
            None if canceled => TaskOutcome::Canceled,
            None => TaskOutcome::Finished,
        }
    }
}

/// Terminal report of a task, delivered exactly once.
pub struct TaskReport {
    pub id: String,
    pub name: String,
    pub outcome: TaskOutcome,
    pub warnings: Vec<String>,
    output: Option<TaskOutput>,
}

impl TaskReport {
    pub fn new(id: String, name: String, outcome: TaskOutcome, warnings: Vec<String>, output: Option<TaskOutput>) -> Self {
        Self {
            id,
            name,
            outcome,
            warnings,
            output,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome == TaskOutcome::Finished
    }

    pub fn is_canceled(&self) -> bool {
        self.outcome == TaskOutcome::Canceled
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            TaskOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Turn a Failed or Canceled outcome into an error.
    pub fn into_result(self) -> Result<Self> {
        match &self.outcome {
            TaskOutcome::Finished => Ok(self),
            TaskOutcome::Canceled => Err(StrandrError::Canceled(self.name)),
            TaskOutcome::Failed(error) => Err(StrandrError::TaskFailed(error.clone())),
        }
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Take the output if it has type `T`. Ownership moves out exactly once;
    /// a mismatched type leaves the output in place.
    pub fn take_output<T: Any>(&mut self) -> Option<T> {
        let output = self.output.take()?;
        match output.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(output) => {
                self.output = Some(output);
                None
            }
        }
    }
}

impl fmt::Debug for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskReport")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("outcome", &self.outcome)
            .field("warnings", &self.warnings)
            .field("has_output", &self.output.is_some())
            .finish()
    }
}

/// Per-task handle passed into every lifecycle hook.
///
/// Owns the task's status record and its queue of children waiting to be
/// launched. Nothing here is shared with other tasks except the
/// cancellation token, which is a child of the parent's token.
pub struct TaskContext {
    id: String,
    status: TaskStatus,
    cancel: CancellationToken,
    pending: VecDeque<(String, Box<dyn Task>)>,
    next_child: u32,
}

impl TaskContext {
    pub fn new(id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::default(),
            cancel,
            pending: VecDeque::new(),
            next_child: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    /// Queue a child; it is launched once the current hook returns.
    /// Returns the id the child will run under.
    pub fn add_subtask(&mut self, task: Box<dyn Task>) -> String {
        self.next_child += 1;
        let child_id = generate_child_id(&self.id, self.next_child);
        log::debug!("[{}] queued subtask {} ({})", self.id, child_id, task.name());
        self.pending.push_back((child_id.clone(), task));
        child_id
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn take_pending(&mut self) -> VecDeque<(String, Box<dyn Task>)> {
        std::mem::take(&mut self.pending)
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.status.set_error(message);
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[{}] {}", self.id, message);
        self.status.add_warning(message);
    }

    pub fn has_error(&self) -> bool {
        self.status.has_error()
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Request cancellation of this task and, through it, all its children.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolves once cancellation of this task has been requested.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        self.cancel.clone().cancelled_owned()
    }

    /// True when no further work or fan-out should happen.
    pub fn should_stop(&self) -> bool {
        self.has_error() || self.is_canceled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn outcome(&self) -> TaskOutcome {
        self.status.outcome(self.is_canceled())
    }

    pub(crate) fn into_status(self) -> TaskStatus {
        self.status
    }

    /// Fold a finished child's outcome into this task's status record.
    ///
    /// Child warnings are always carried up. A child error becomes this
    /// task's error under `fail_on_subtask_error`, otherwise a warning. A
    /// child cancellation is ignored when this task is already stopping
    /// (it canceled the child itself); otherwise the flags decide.
    pub fn absorb_subtask(&mut self, report: &TaskReport, flags: TaskFlags) {
        self.status.warnings.extend(report.warnings.iter().cloned());
        match &report.outcome {
            TaskOutcome::Finished => {}
            TaskOutcome::Failed(error) if flags.fail_on_subtask_error => {
                self.set_error(error.clone());
            }
            TaskOutcome::Failed(error) => {
                self.add_warning(format!("{}: {}", report.name, error));
            }
            TaskOutcome::Canceled if self.should_stop() => {
                log::debug!("[{}] subtask {} canceled while stopping", self.id, report.id);
            }
            TaskOutcome::Canceled if flags.fail_on_subtask_cancel => {
                self.set_error(format!("Subtask '{}' was canceled", report.name));
            }
            TaskOutcome::Canceled if flags.cancel_on_subtask_cancel => {
                self.cancel();
            }
            TaskOutcome::Canceled => {
                self.add_warning(format!("Subtask '{}' was canceled", report.name));
            }
        }
    }
}

/// A unit of work driven by the scheduler.
///
/// Every hook returning `Err` records that error in the task's status.
#[async_trait]
pub trait Task: Send + 'static {
    fn name(&self) -> &str;

    fn flags(&self) -> TaskFlags {
        TaskFlags::default()
    }

    /// Called exactly once, before any child exists.
    fn prepare(&mut self, _ctx: &mut TaskContext) -> Result<()> {
        Ok(())
    }

    /// Leaf work, executed after all children finished unless `no_run`
    /// is set or the task is already stopping.
    async fn run(&mut self, _ctx: &mut TaskContext) -> Result<()> {
        Ok(())
    }

    /// Called once per finished child, in completion order.
    fn on_subtask_finished(&mut self, _subtask: TaskReport, _ctx: &mut TaskContext) -> Result<()> {
        Ok(())
    }

    /// Final step before the outcome is computed.
    fn report(&mut self, _ctx: &mut TaskContext) -> Result<()> {
        Ok(())
    }

    /// Hand the result over to the terminal report.
    fn take_output(&mut self) -> Option<TaskOutput> {
        None
    }
}
