//! In-flight task registry.
//!
//! The registry maps task ids to a read side of each task's state. The write
//! side is a [`TaskHandle`], handed out exactly once by [`TaskRegistry::create`]
//! and owned by the orchestrator driving that task. Readers only ever see
//! cloned snapshots.
//!
//! The id map is the one structure shared between tasks. Every operation on
//! it runs under a single mutex, so existence checks and inserts cannot
//! interleave.

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::watch;
use tracing::debug;

use assessor_contracts::{
    error::{AssessorError, AssessorResult},
    task::{Task, TaskId, TaskRequest},
};

/// Exclusive write access to one task.
///
/// Updates are applied to a copy and only committed when the mutator
/// succeeds, then published to the registry in one step.
#[derive(Debug)]
pub struct TaskHandle {
    task: Task,
    publisher: watch::Sender<Task>,
}

impl TaskHandle {
    fn new(task: Task, publisher: watch::Sender<Task>) -> Self {
        Self { task, publisher }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn id(&self) -> &TaskId {
        &self.task.id
    }

    /// Apply `mutate` atomically: either every field it writes becomes
    /// visible together, or none does.
    pub fn update<F>(&mut self, mutate: F) -> AssessorResult<()>
    where
        F: FnOnce(&mut Task) -> AssessorResult<()>,
    {
        let mut next = self.task.clone();
        mutate(&mut next)?;
        self.task = next;
        self.publisher.send_replace(self.task.clone());
        Ok(())
    }

    pub fn into_task(self) -> Task {
        self.task
    }
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    active: Mutex<HashMap<TaskId, watch::Receiver<Task>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, watch::Receiver<Task>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a fresh `PENDING` task and return the handle that owns it.
    ///
    /// Uses the caller's id when the request carries one; fails with
    /// `DuplicateTask` if that id is already active.
    pub fn create(&self, request: TaskRequest) -> AssessorResult<TaskHandle> {
        let id = request.task_id.clone().unwrap_or_default();
        let mut active = self.lock();

        match active.entry(id) {
            Entry::Occupied(slot) => Err(AssessorError::DuplicateTask {
                task_id: slot.key().to_string(),
            }),
            Entry::Vacant(slot) => {
                let task = Task::new(slot.key().clone(), request);
                let (publisher, reader) = watch::channel(task.clone());
                debug!(task_id = %task.id, family = %task.request.task_family, "task registered");
                slot.insert(reader);
                Ok(TaskHandle::new(task, publisher))
            }
        }
    }

    /// Snapshot of the task's current state.
    pub fn get(&self, id: &TaskId) -> AssessorResult<Task> {
        let active = self.lock();
        active
            .get(id)
            .map(|reader| reader.borrow().clone())
            .ok_or_else(|| AssessorError::TaskNotFound {
                task_id: id.to_string(),
            })
    }

    /// Remove a terminal task and free its id. Returns the final snapshot.
    pub fn release(&self, id: &TaskId) -> AssessorResult<Task> {
        let mut active = self.lock();
        let snapshot = match active.get(id) {
            Some(reader) => reader.borrow().clone(),
            None => {
                return Err(AssessorError::TaskNotFound {
                    task_id: id.to_string(),
                })
            }
        };

        if !snapshot.is_terminal() {
            return Err(AssessorError::TaskNotTerminal {
                task_id: id.to_string(),
                state: snapshot.state.to_string(),
            });
        }

        active.remove(id);
        debug!(task_id = %id, state = %snapshot.state, "task released");
        Ok(snapshot)
    }

    pub fn active_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
