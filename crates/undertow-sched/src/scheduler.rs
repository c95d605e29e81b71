//! The cooperative scheduler.
//!
//! Tasks live in an arena of slots addressed by [`TaskId`]. Four
//! disjoint queues (scheduled, running, waiting, finishing) hold ids; a
//! task's [`TaskState`] says which queue it is in, so membership checks are
//! O(1) and a task can never sit in two queues at once.
//!
//! All lifecycle hooks and dependent notifications run on the thread that
//! calls [`Scheduler::update`]. Worker threads only ever see a body and its
//! [`TaskFlags`]; their results come back through a channel that is drained
//! at the start of every update and after every task run.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use smallvec::SmallVec;
use undertow_core::{SchedulerError, TaskError, TaskId};

use crate::config::SchedulerConfig;
use crate::task::{Step, Task, TaskContext, TaskFlags, TaskState};
use crate::worker::{self, Completion, Job, Outcome, WorkerPool};

// ── Slot ───────────────────────────────────────────────────────────

/// Retired slots are recycled oldest-first, and only once more than this
/// many are free, so the terminal state of a recently completed task stays
/// observable to `state()` and `wait_on()`.
const RECYCLE_AFTER: usize = 32;

struct Slot {
    generation: u32,
    state: TaskState,
    flags: Arc<TaskFlags>,
    /// `None` while a worker owns the body, or after retirement.
    body: Option<Box<dyn Task>>,
    name: String,
    threaded: bool,
    no_finish: bool,
    run_on_stop_waiting: bool,
    /// Tasks to notify when this one completes.
    listeners: SmallVec<[TaskId; 4]>,
    /// Outstanding dependencies of this task.
    waiting: usize,
}

impl Slot {
    fn new(generation: u32, body: Box<dyn Task>) -> Self {
        Self {
            generation,
            state: TaskState::Created,
            flags: Arc::new(TaskFlags::default()),
            name: body.name().to_string(),
            threaded: body.is_threaded(),
            no_finish: body.no_finish(),
            run_on_stop_waiting: body.run_on_stop_waiting(),
            body: Some(body),
            listeners: SmallVec::new(),
            waiting: 0,
        }
    }
}

// ── Scheduler ──────────────────────────────────────────────────────

/// Cooperative task scheduler.
///
/// Drive it by calling [`update`](Self::update) once per simulation cycle
/// from a single thread. Threaded tasks execute on an internal worker pool;
/// everything else runs inside `update`.
pub struct Scheduler {
    config: SchedulerConfig,
    slots: Vec<Slot>,
    free: VecDeque<u32>,
    scheduled: VecDeque<TaskId>,
    running: Vec<TaskId>,
    waiting: Vec<TaskId>,
    finishing: VecDeque<TaskId>,
    errors: VecDeque<SchedulerError>,
    pool: Option<WorkerPool>,
    shutting_down: bool,
    ran_this_update: usize,
    finished_this_update: usize,
}

// Compile-time assertion: Scheduler must be movable to the thread that
// drives the simulation.
const _: fn() = || {
    fn assert<T: Send>() {}
    assert::<Scheduler>();
};

impl Scheduler {
    /// Build a scheduler, spawning its worker pool unless multithreading
    /// is disabled.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let config = config.normalized();
        let pool = if config.disable_multithreading {
            None
        } else {
            Some(WorkerPool::spawn(config.resolved_worker_count())?)
        };
        Ok(Self {
            config,
            slots: Vec::new(),
            free: VecDeque::new(),
            scheduled: VecDeque::new(),
            running: Vec::new(),
            waiting: Vec::new(),
            finishing: VecDeque::new(),
            errors: VecDeque::new(),
            pool,
            shutting_down: false,
            ran_this_update: 0,
            finished_this_update: 0,
        })
    }

    /// The normalized configuration in effect.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Number of worker threads (0 when multithreading is disabled).
    pub fn worker_count(&self) -> usize {
        self.pool.as_ref().map_or(0, WorkerPool::worker_count)
    }

    // ── Arena ──────────────────────────────────────────────────────

    fn slot(&self, id: TaskId) -> Result<&Slot, SchedulerError> {
        self.slots
            .get(id.index())
            .filter(|s| s.generation == id.generation())
            .ok_or(SchedulerError::UnknownTask { id })
    }

    fn slot_mut(&mut self, id: TaskId) -> Result<&mut Slot, SchedulerError> {
        self.slots
            .get_mut(id.index())
            .filter(|s| s.generation == id.generation())
            .ok_or(SchedulerError::UnknownTask { id })
    }

    /// Put a task into the arena without queueing it.
    pub fn insert(&mut self, body: Box<dyn Task>) -> TaskId {
        let recycled = if self.free.len() > RECYCLE_AFTER {
            self.free.pop_front()
        } else {
            None
        };
        if let Some(index) = recycled {
            let slot = &mut self.slots[index as usize];
            let generation = slot.generation.wrapping_add(1);
            *slot = Slot::new(generation, body);
            TaskId::new(index, generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot::new(0, body));
            TaskId::new(index, 0)
        }
    }

    /// Move a task into a terminal state, drop its body and make the slot
    /// reusable. Returns the listeners it still had.
    fn retire(&mut self, id: TaskId, state: TaskState) -> SmallVec<[TaskId; 4]> {
        let Ok(slot) = self.slot_mut(id) else {
            return SmallVec::new();
        };
        if slot.state.is_terminal() {
            return SmallVec::new();
        }
        slot.state = state;
        match state {
            TaskState::Done => slot.flags.mark_done(),
            _ => slot.flags.mark_cancelled(),
        }
        slot.body = None;
        slot.waiting = 0;
        let listeners = std::mem::take(&mut slot.listeners);
        self.free.push_back(id.index() as u32);
        log::trace!("{id} retired as {}", state.name());
        listeners
    }

    /// Cancel a task and, transitively, every task waiting on it.
    fn cancel_cascade(&mut self, root: TaskId) {
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            let Ok(slot) = self.slot_mut(id) else {
                continue;
            };
            if slot.state.is_terminal() {
                continue;
            }
            slot.flags.mark_cancelled();
            if let Some(body) = slot.body.as_mut() {
                body.cancel();
            }
            let state = slot.state;
            match state {
                TaskState::Scheduled => self.scheduled.retain(|&t| t != id),
                TaskState::Waiting => self.waiting.retain(|&t| t != id),
                TaskState::Running => self.running.retain(|&t| t != id),
                TaskState::Finishing => self.finishing.retain(|&t| t != id),
                _ => {}
            }
            for listener in self.retire(id, TaskState::Cancelled) {
                if self.state(listener) == Some(TaskState::Waiting) {
                    pending.push(listener);
                }
            }
        }
    }

    // ── Queueing ───────────────────────────────────────────────────

    /// Append a created task to the scheduled queue. Silently ignored while
    /// shutting down.
    pub fn schedule(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        if self.shutting_down {
            return Ok(());
        }
        let slot = self.slot_mut(id)?;
        let state = slot.state;
        match state {
            TaskState::Created => {
                slot.state = TaskState::Scheduled;
                self.scheduled.push_back(id);
                log::trace!("{id} scheduled");
                Ok(())
            }
            TaskState::Waiting | TaskState::Scheduled => {
                Err(SchedulerError::AlreadyQueued { id })
            }
            state => Err(SchedulerError::InvalidState {
                id,
                state: state.name(),
            }),
        }
    }

    /// Insert and schedule a task. While shutting down the task is
    /// dropped and the returned id is already cancelled.
    pub fn add(&mut self, body: Box<dyn Task>) -> TaskId {
        let id = self.insert(body);
        if self.shutting_down {
            self.retire(id, TaskState::Cancelled);
        } else if let Ok(slot) = self.slot_mut(id) {
            slot.state = TaskState::Scheduled;
            self.scheduled.push_back(id);
        }
        id
    }

    /// Insert a task straight into the waiting queue. It must be given
    /// dependencies with [`wait_on`](Self::wait_on), or be released with
    /// [`stop_waiting`](Self::stop_waiting).
    pub fn add_waiting(&mut self, body: Box<dyn Task>) -> TaskId {
        let id = self.insert(body);
        if self.shutting_down {
            self.retire(id, TaskState::Cancelled);
        } else if let Ok(slot) = self.slot_mut(id) {
            slot.state = TaskState::Waiting;
            self.waiting.push(id);
        }
        id
    }

    /// Run a created task now if this update's run budget allows,
    /// otherwise schedule it.
    pub fn run_immediately(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        if self.shutting_down {
            return Ok(());
        }
        if self.ran_this_update >= self.config.max_tasks_per_update {
            return self.schedule(id);
        }
        let state = self.slot(id)?.state;
        match state {
            TaskState::Created => {
                self.run_task(id);
                Ok(())
            }
            TaskState::Waiting | TaskState::Scheduled => {
                Err(SchedulerError::AlreadyQueued { id })
            }
            state => Err(SchedulerError::InvalidState {
                id,
                state: state.name(),
            }),
        }
    }

    /// Make `waiter` wait until `target` signals completion.
    ///
    /// A created or scheduled waiter moves to the waiting queue. A waiter
    /// may wait on several targets; it is released when the last one
    /// signals.
    pub fn wait_on(&mut self, waiter: TaskId, target: TaskId) -> Result<(), SchedulerError> {
        if waiter == target {
            return Err(SchedulerError::WaitOnSelf { id: waiter });
        }
        let (waiter_state, waiter_threaded) = {
            let s = self.slot(waiter)?;
            (s.state, s.threaded)
        };
        let t = self.slot(target)?;
        match t.state {
            TaskState::Done => return Err(SchedulerError::WaitOnFinished { waiter, target }),
            TaskState::Cancelled => {
                return Err(SchedulerError::WaitOnCancelled { waiter, target })
            }
            _ => {}
        }
        if t.flags.is_cancelled() {
            return Err(SchedulerError::WaitOnCancelled { waiter, target });
        }
        if t.threaded && t.no_finish && !waiter_threaded {
            return Err(SchedulerError::WaitOnNoFinishThreaded { waiter, target });
        }
        match waiter_state {
            TaskState::Created => self.waiting.push(waiter),
            TaskState::Scheduled => {
                self.scheduled.retain(|&t| t != waiter);
                self.waiting.push(waiter);
            }
            TaskState::Waiting => {}
            state => {
                return Err(SchedulerError::InvalidState {
                    id: waiter,
                    state: state.name(),
                })
            }
        }
        let w = self.slot_mut(waiter)?;
        w.state = TaskState::Waiting;
        w.waiting += 1;
        self.slot_mut(target)?.listeners.push(waiter);
        log::trace!("{waiter} waits on {target}");
        Ok(())
    }

    /// Release a waiting task regardless of its outstanding dependencies,
    /// either running it now or scheduling it.
    pub fn stop_waiting(&mut self, id: TaskId, run: bool) -> Result<(), SchedulerError> {
        let slot = self.slot_mut(id)?;
        if slot.state != TaskState::Waiting {
            return Err(SchedulerError::InvalidState {
                id,
                state: slot.state.name(),
            });
        }
        slot.state = TaskState::Created;
        slot.waiting = 0;
        self.waiting.retain(|&t| t != id);
        if self.shutting_down {
            self.retire(id, TaskState::Cancelled);
            return Ok(());
        }
        if run {
            self.run_immediately(id)
        } else {
            self.schedule(id)
        }
    }

    /// Cancel a scheduled or waiting task, and every task waiting on it.
    ///
    /// Returns `Ok(false)` for tasks that are running or finishing; those
    /// can only be stopped by [`cancel_all`](Self::cancel_all).
    pub fn cancel(&mut self, id: TaskId) -> Result<bool, SchedulerError> {
        match self.slot(id)?.state {
            TaskState::Created | TaskState::Scheduled | TaskState::Waiting => {
                self.cancel_cascade(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // ── Running ────────────────────────────────────────────────────

    fn run_task(&mut self, id: TaskId) {
        self.ran_this_update += 1;
        let pooled = self.pool.is_some();
        let Ok(slot) = self.slot_mut(id) else {
            return;
        };
        let Some(mut body) = slot.body.take() else {
            return;
        };
        let flags = Arc::clone(&slot.flags);
        let threaded = slot.threaded;
        slot.state = TaskState::Running;
        flags.mark_started();
        body.start();
        log::trace!("{id} started ({})", if threaded { "threaded" } else { "inline" });

        if threaded && pooled {
            self.running.push(id);
            let job = Job { id, body, flags };
            if let Some(Err(job)) = self.pool.as_ref().map(|p| p.submit(job)) {
                // Pool already shut down: fall back to running inline.
                let mut body = job.body;
                let outcome = worker::drive(id, body.as_mut(), &job.flags);
                job.flags.mark_ran();
                self.handle_completion(Completion { id, body, outcome });
            }
            return;
        }

        if threaded {
            let outcome = worker::drive(id, body.as_mut(), &flags);
            flags.mark_ran();
            self.running.push(id);
            self.handle_completion(Completion { id, body, outcome });
            return;
        }

        match step_inline(id, body.as_mut(), &flags) {
            Ok(Step::Yield) => {
                if let Ok(slot) = self.slot_mut(id) {
                    slot.body = Some(body);
                }
                self.running.push(id);
            }
            Ok(Step::Finished) => {
                flags.mark_ran();
                self.running.push(id);
                self.handle_completion(Completion {
                    id,
                    body,
                    outcome: Outcome::Finished,
                });
            }
            Err(e) => {
                flags.mark_ran();
                self.running.push(id);
                self.handle_completion(Completion {
                    id,
                    body,
                    outcome: Outcome::Failed(e),
                });
            }
        }
    }

    /// Resume every multi-cycle body that yielded on an earlier update.
    fn step_yielded(&mut self) {
        let yielded: Vec<TaskId> = self
            .running
            .iter()
            .copied()
            .filter(|&id| self.slot(id).is_ok_and(|s| s.body.is_some()))
            .collect();
        for id in yielded {
            let Ok(slot) = self.slot_mut(id) else {
                continue;
            };
            let flags = Arc::clone(&slot.flags);
            let Some(mut body) = slot.body.take() else {
                continue;
            };
            if flags.is_cancelled() {
                self.handle_completion(Completion {
                    id,
                    body,
                    outcome: Outcome::Cancelled,
                });
                continue;
            }
            match step_inline(id, body.as_mut(), &flags) {
                Ok(Step::Yield) => {
                    if let Ok(slot) = self.slot_mut(id) {
                        slot.body = Some(body);
                    }
                }
                Ok(Step::Finished) => {
                    flags.mark_ran();
                    self.handle_completion(Completion {
                        id,
                        body,
                        outcome: Outcome::Finished,
                    });
                }
                Err(e) => {
                    flags.mark_ran();
                    self.handle_completion(Completion {
                        id,
                        body,
                        outcome: Outcome::Failed(e),
                    });
                }
            }
        }
    }

    /// Process a body that stopped running, wherever it ran.
    fn handle_completion(&mut self, done: Completion) {
        let Completion { id, body, outcome } = done;
        let live = self
            .slot(id)
            .is_ok_and(|s| s.state == TaskState::Running);
        if !live {
            log::warn!("late completion for {id} discarded");
            return;
        }
        self.running.retain(|&t| t != id);
        let (cancelled, name) = match self.slot_mut(id) {
            Ok(slot) => {
                slot.body = Some(body);
                (slot.flags.is_cancelled(), slot.name.clone())
            }
            Err(_) => return,
        };
        match outcome {
            Outcome::Finished if !cancelled => self.finished_running(id),
            Outcome::Finished | Outcome::Cancelled => self.cancel_cascade(id),
            Outcome::Failed(source) => {
                log::debug!("{id} ('{name}') failed: {source}");
                self.cancel_cascade(id);
                self.errors
                    .push_back(SchedulerError::TaskFailed { name, source });
            }
        }
    }

    /// The completion signal: release no-finish dependents now, or queue
    /// the task for `end()`.
    fn finished_running(&mut self, id: TaskId) {
        let shutting_down = self.shutting_down;
        let Ok(slot) = self.slot_mut(id) else {
            return;
        };
        slot.flags.mark_ran();
        if slot.no_finish {
            let listeners = self.retire(id, TaskState::Done);
            self.notify(id, listeners);
        } else if shutting_down {
            self.retire(id, TaskState::Cancelled);
        } else {
            slot.state = TaskState::Finishing;
            self.finishing.push_back(id);
        }
    }

    /// Count one completed dependency off each listener.
    fn notify(&mut self, from: TaskId, listeners: SmallVec<[TaskId; 4]>) {
        for listener in listeners {
            let Ok(slot) = self.slot_mut(listener) else {
                continue;
            };
            if slot.state != TaskState::Waiting || slot.flags.is_cancelled() {
                continue;
            }
            slot.waiting = slot.waiting.saturating_sub(1);
            log::trace!("{from} released one dependency of {listener} ({} left)", slot.waiting);
            if slot.waiting == 0 {
                let run = slot.run_on_stop_waiting;
                if let Err(e) = self.stop_waiting(listener, run) {
                    self.errors.push_back(e);
                }
            }
        }
    }

    fn drain_completions(&mut self) {
        let mut done = Vec::new();
        if let Some(pool) = &self.pool {
            while let Ok(c) = pool.completions().try_recv() {
                done.push(c);
            }
        }
        for completion in done {
            self.handle_completion(completion);
        }
    }

    /// Call `end()` on finishing tasks within this update's finish budget.
    fn finish_tasks(&mut self) {
        self.drain_completions();
        while self.finished_this_update < self.config.max_finish_per_update {
            let Some(id) = self.finishing.pop_front() else {
                break;
            };
            self.finished_this_update += 1;
            if let Ok(slot) = self.slot_mut(id) {
                if let Some(body) = slot.body.as_mut() {
                    body.end();
                }
            }
            let listeners = self.retire(id, TaskState::Done);
            self.notify(id, listeners);
        }
    }

    /// Surface the oldest deferred task failure, if any.
    pub fn check_for_error(&mut self) -> Result<(), SchedulerError> {
        self.drain_completions();
        match self.errors.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Advance the scheduler by one cycle.
    ///
    /// Order: resume yielded bodies, finish completed tasks, run scheduled
    /// tasks in FIFO order until the run budget is spent, finish again.
    /// A task failure recorded during the cycle is returned; the remaining
    /// work continues on the next call.
    pub fn update(&mut self) -> Result<(), SchedulerError> {
        self.ran_this_update = 0;
        self.finished_this_update = 0;

        self.check_for_error()?;
        self.step_yielded();
        self.check_for_error()?;
        self.finish_tasks();

        while self.ran_this_update < self.config.max_tasks_per_update {
            let Some(id) = self.scheduled.pop_front() else {
                break;
            };
            self.run_task(id);
            self.check_for_error()?;
        }

        self.finish_tasks();
        self.check_for_error()
    }

    // ── Cancellation & reset ──────────────────────────────────────

    /// Cancel everything.
    ///
    /// Pending queues are cleared, running tasks are flagged, and the call
    /// then blocks up to `max_wait` for threaded bodies to come back. Bodies
    /// still out after the deadline are abandoned; their late completions
    /// are discarded.
    pub fn cancel_all(&mut self) {
        let pending: Vec<TaskId> = self
            .scheduled
            .drain(..)
            .chain(self.waiting.drain(..))
            .collect();
        for id in pending {
            if let Ok(slot) = self.slot_mut(id) {
                if let Some(body) = slot.body.as_mut() {
                    body.cancel();
                }
            }
            self.retire(id, TaskState::Cancelled);
        }

        let running = self.running.clone();
        for &id in &running {
            if let Ok(slot) = self.slot(id) {
                slot.flags.mark_cancelled();
            }
        }
        self.step_yielded();

        let deadline = Instant::now() + self.config.max_wait;
        loop {
            self.drain_completions();
            if self.running.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "cancel_all gave up on {} threaded task(s) after {:?}",
                    self.running.len(),
                    self.config.max_wait
                );
                break;
            }
            thread::yield_now();
        }

        for id in std::mem::take(&mut self.running) {
            self.retire(id, TaskState::Cancelled);
        }
        for id in std::mem::take(&mut self.finishing) {
            self.retire(id, TaskState::Cancelled);
        }
        // Failures from bodies cancelled above are expected noise.
        self.errors.clear();
    }

    /// Reset every queue and counter. Fails while tasks are running.
    pub fn clear(&mut self) -> Result<(), SchedulerError> {
        if !self.running.is_empty() {
            return Err(SchedulerError::TasksRunning {
                count: self.running.len(),
            });
        }
        let ids: Vec<TaskId> = self
            .scheduled
            .drain(..)
            .chain(self.waiting.drain(..))
            .chain(self.finishing.drain(..))
            .collect();
        for id in ids {
            self.retire(id, TaskState::Cancelled);
        }
        self.errors.clear();
        self.ran_this_update = 0;
        self.finished_this_update = 0;
        Ok(())
    }

    /// While shutting down every enqueue is a silent no-op and completed
    /// tasks skip the finishing stage.
    pub fn set_shutting_down(&mut self, shutting_down: bool) {
        self.shutting_down = shutting_down;
    }

    /// Whether the scheduler is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Cancel everything and stop the worker pool.
    pub fn shutdown(&mut self) {
        self.shutting_down = true;
        self.cancel_all();
        if let Some(mut pool) = self.pool.take() {
            pool.shutdown(self.config.max_wait);
        }
    }

    // ── Introspection ─────────────────────────────────────────────

    /// Lifecycle state of a task, or `None` if the handle is stale.
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.slot(id).ok().map(|s| s.state)
    }

    /// Shared flags of a live task.
    pub fn flags(&self, id: TaskId) -> Option<Arc<TaskFlags>> {
        self.slot(id).ok().map(|s| Arc::clone(&s.flags))
    }

    /// Outstanding dependency count of a task.
    pub fn waiting_count(&self, id: TaskId) -> Option<usize> {
        self.slot(id).ok().map(|s| s.waiting)
    }

    /// Whether the task is in any queue.
    pub fn contains(&self, id: TaskId) -> bool {
        matches!(
            self.state(id),
            Some(
                TaskState::Scheduled
                    | TaskState::Running
                    | TaskState::Waiting
                    | TaskState::Finishing
            )
        )
    }

    /// Whether the task is in the scheduled queue.
    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.state(id) == Some(TaskState::Scheduled)
    }

    /// Whether the task is running.
    pub fn is_running(&self, id: TaskId) -> bool {
        self.state(id) == Some(TaskState::Running)
    }

    /// Whether the task is waiting on dependencies.
    pub fn is_waiting(&self, id: TaskId) -> bool {
        self.state(id) == Some(TaskState::Waiting)
    }

    /// Whether the task is awaiting `end()`.
    pub fn is_finishing(&self, id: TaskId) -> bool {
        self.state(id) == Some(TaskState::Finishing)
    }

    /// Ids in the scheduled queue, front first.
    pub fn scheduled_tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.scheduled.iter().copied()
    }

    /// Ids of running tasks.
    pub fn running_tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.running.iter().copied()
    }

    /// Ids of waiting tasks.
    pub fn waiting_tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.waiting.iter().copied()
    }

    /// Ids of finishing tasks.
    pub fn finishing_tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.finishing.iter().copied()
    }

    /// Total number of queued tasks across all four queues.
    pub fn tasks(&self) -> usize {
        self.scheduled.len() + self.running.len() + self.waiting.len() + self.finishing.len()
    }

    /// Whether any queue is non-empty.
    pub fn has_tasks(&self) -> bool {
        self.tasks() > 0
    }

    /// Tasks started during the current (or last) update.
    pub fn tasks_ran_this_update(&self) -> usize {
        self.ran_this_update
    }

    /// Tasks whose `end()` ran during the current (or last) update.
    pub fn tasks_finished_this_update(&self) -> usize {
        self.finished_this_update
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(mut pool) = self.pool.take() {
            for &id in &self.running {
                if let Ok(slot) = self.slot(id) {
                    slot.flags.mark_cancelled();
                }
            }
            pool.shutdown(self.config.max_wait);
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("scheduled", &self.scheduled.len())
            .field("running", &self.running.len())
            .field("waiting", &self.waiting.len())
            .field("finishing", &self.finishing.len())
            .field("workers", &self.worker_count())
            .field("shutting_down", &self.shutting_down)
            .finish()
    }
}

/// One `run` call on the updating thread, with panics converted to errors.
fn step_inline(id: TaskId, body: &mut dyn Task, flags: &TaskFlags) -> Result<Step, TaskError> {
    let cx = TaskContext::new(id, flags);
    match panic::catch_unwind(AssertUnwindSafe(|| body.run(&cx))) {
        Ok(result) => result,
        Err(payload) => Err(worker::panic_error(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn inline_config() -> SchedulerConfig {
        SchedulerConfig {
            disable_multithreading: true,
            ..SchedulerConfig::default()
        }
    }

    struct Counting {
        runs: Arc<AtomicUsize>,
        ends: Arc<AtomicUsize>,
        steps: usize,
    }

    impl Task for Counting {
        fn name(&self) -> &str {
            "counting"
        }
        fn run(&mut self, _cx: &TaskContext<'_>) -> Result<Step, TaskError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.steps > 1 {
                self.steps -= 1;
                Ok(Step::Yield)
            } else {
                Ok(Step::Finished)
            }
        }
        fn end(&mut self) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting(steps: usize) -> (Box<Counting>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let ends = Arc::new(AtomicUsize::new(0));
        let task = Box::new(Counting {
            runs: Arc::clone(&runs),
            ends: Arc::clone(&ends),
            steps,
        });
        (task, runs, ends)
    }

    #[test]
    fn inline_task_runs_and_ends_in_one_update() {
        let mut s = Scheduler::new(inline_config()).unwrap();
        let (task, runs, ends) = counting(1);
        let id = s.add(task);
        assert!(s.is_scheduled(id));
        s.update().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(ends.load(Ordering::SeqCst), 1);
        assert_eq!(s.state(id), Some(TaskState::Done));
        assert!(!s.has_tasks());
    }

    #[test]
    fn yielding_task_spans_updates() {
        let mut s = Scheduler::new(inline_config()).unwrap();
        let (task, runs, ends) = counting(3);
        let id = s.add(task);
        s.update().unwrap();
        assert!(s.is_running(id));
        s.update().unwrap();
        assert!(s.is_running(id));
        assert_eq!(ends.load(Ordering::SeqCst), 0);
        s.update().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(ends.load(Ordering::SeqCst), 1);
        assert_eq!(s.state(id), Some(TaskState::Done));
    }

    #[test]
    fn schedule_twice_is_rejected() {
        let mut s = Scheduler::new(inline_config()).unwrap();
        let (task, _, _) = counting(1);
        let id = s.add(task);
        assert_eq!(s.schedule(id), Err(SchedulerError::AlreadyQueued { id }));
    }

    #[test]
    fn stale_id_is_unknown_after_slot_reuse() {
        let mut s = Scheduler::new(inline_config()).unwrap();
        let (a, _, _) = counting(1);
        let old = s.add(a);
        for _ in 0..RECYCLE_AFTER {
            let (t, _, _) = counting(1);
            s.add(t);
        }
        s.update().unwrap();
        assert_eq!(s.state(old), Some(TaskState::Done));
        let (b, _, _) = counting(1);
        let new = s.add(b);
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert_eq!(s.state(old), None);
        assert_eq!(s.schedule(old), Err(SchedulerError::UnknownTask { id: old }));
    }

    #[test]
    fn add_while_shutting_down_is_ignored() {
        let mut s = Scheduler::new(inline_config()).unwrap();
        s.set_shutting_down(true);
        let (task, runs, _) = counting(1);
        let id = s.add(task);
        s.update().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(s.state(id), Some(TaskState::Cancelled));
    }

    #[test]
    fn run_immediately_respects_budget() {
        let cfg = SchedulerConfig {
            max_tasks_per_update: 1,
            ..inline_config()
        };
        let mut s = Scheduler::new(cfg).unwrap();
        let (a, a_runs, _) = counting(1);
        let (b, b_runs, _) = counting(1);
        let a = s.insert(a);
        let b = s.insert(b);
        s.run_immediately(a).unwrap();
        assert_eq!(a_runs.load(Ordering::SeqCst), 1);
        s.run_immediately(b).unwrap();
        assert_eq!(b_runs.load(Ordering::SeqCst), 0);
        assert!(s.is_scheduled(b));
    }

    #[test]
    fn clear_rejects_running_tasks() {
        let mut s = Scheduler::new(inline_config()).unwrap();
        let (task, _, _) = counting(5);
        s.add(task);
        s.update().unwrap();
        assert_eq!(s.clear(), Err(SchedulerError::TasksRunning { count: 1 }));
    }

    #[test]
    fn cancel_cascades_to_waiters() {
        let mut s = Scheduler::new(inline_config()).unwrap();
        let (a, _, _) = counting(1);
        let (b, b_runs, _) = counting(1);
        let a = s.insert(a);
        let b = s.insert(b);
        s.wait_on(b, a).unwrap();
        s.schedule(a).unwrap();
        assert!(s.cancel(a).unwrap());
        assert_eq!(s.state(b), Some(TaskState::Cancelled));
        s.update().unwrap();
        assert_eq!(b_runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn threaded_task_uses_worker() {
        struct OnWorker(Arc<AtomicUsize>);
        impl Task for OnWorker {
            fn is_threaded(&self) -> bool {
                true
            }
            fn run(&mut self, _cx: &TaskContext<'_>) -> Result<Step, TaskError> {
                let on_worker = thread::current()
                    .name()
                    .is_some_and(|n| n.starts_with("undertow-worker"));
                self.0.store(usize::from(on_worker), Ordering::SeqCst);
                Ok(Step::Finished)
            }
        }
        let cfg = SchedulerConfig {
            worker_count: Some(1),
            ..SchedulerConfig::default()
        };
        let mut s = Scheduler::new(cfg).unwrap();
        let seen = Arc::new(AtomicUsize::new(2));
        let id = s.add(Box::new(OnWorker(Arc::clone(&seen))));
        let deadline = Instant::now() + Duration::from_secs(5);
        while s.state(id) != Some(TaskState::Done) {
            assert!(Instant::now() < deadline, "threaded task never finished");
            s.update().unwrap();
            thread::yield_now();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
