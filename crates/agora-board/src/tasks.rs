//! Task board
//!
//! All mutations happen inside one acquisition of the board lock. The
//! `transition` method is the compare-and-set other components build on:
//! callers name the status they expect and the status they want, and exactly
//! one concurrent caller observes success.

use agora_types::{AgoraError, AuctionType, Result, Task, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

/// In-memory task store with conditional-write transitions
#[derive(Default)]
pub struct TaskBoard {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a freshly funded task
    pub fn insert(&self, task: Task) {
        info!(task = %task.id, buyer = %task.buyer, budget = %task.budget, "task posted");
        self.tasks.write().insert(task.id.clone(), task);
    }

    /// Fetch a task snapshot
    pub fn get(&self, task_id: &TaskId) -> Result<Task> {
        self.tasks
            .read()
            .get(task_id)
            .cloned()
            .ok_or_else(|| AgoraError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Set the auction window on an open task, once
    pub fn open_auction(
        &self,
        task_id: &TaskId,
        auction_type: AuctionType,
        ends_at: DateTime<Utc>,
    ) -> Result<Task> {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(task_id).ok_or_else(|| AgoraError::TaskNotFound {
            task_id: task_id.to_string(),
        })?;

        if task.status != TaskStatus::Open {
            return Err(AgoraError::TaskStatusConflict {
                task_id: task_id.to_string(),
                status: task.status.to_string(),
                operation: "open auction".to_string(),
            });
        }
        if task.auction_ends_at.is_some() {
            return Err(AgoraError::AuctionAlreadyOpened {
                task_id: task_id.to_string(),
            });
        }

        task.auction_type = auction_type;
        task.auction_ends_at = Some(ends_at);
        task.updated_at = Utc::now();
        info!(task = %task_id, %ends_at, "auction opened");
        Ok(task.clone())
    }

    /// Conditional status transition: succeeds only if the task is currently
    /// in `expected`, under a single lock acquisition
    ///
    /// Concurrent callers racing on the same edge see exactly one success;
    /// the losers get `AuctionAlreadyClosed` when racing away from Open, or
    /// `TaskStatusConflict` on any other edge.
    pub fn transition(
        &self,
        task_id: &TaskId,
        expected: TaskStatus,
        next: TaskStatus,
    ) -> Result<Task> {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(task_id).ok_or_else(|| AgoraError::TaskNotFound {
            task_id: task_id.to_string(),
        })?;

        if task.status != expected {
            if expected == TaskStatus::Open {
                return Err(AgoraError::AuctionAlreadyClosed {
                    task_id: task_id.to_string(),
                });
            }
            return Err(AgoraError::TaskStatusConflict {
                task_id: task_id.to_string(),
                status: task.status.to_string(),
                operation: format!("transition to {}", next),
            });
        }

        task.status = next;
        task.updated_at = Utc::now();
        info!(task = %task_id, from = %expected, to = %next, "task transitioned");
        Ok(task.clone())
    }

    /// Conditional transition accepting any of several current statuses
    pub fn transition_from_any(
        &self,
        task_id: &TaskId,
        expected: &[TaskStatus],
        next: TaskStatus,
    ) -> Result<Task> {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(task_id).ok_or_else(|| AgoraError::TaskNotFound {
            task_id: task_id.to_string(),
        })?;

        if !expected.contains(&task.status) {
            return Err(AgoraError::TaskStatusConflict {
                task_id: task_id.to_string(),
                status: task.status.to_string(),
                operation: format!("transition to {}", next),
            });
        }

        task.status = next;
        task.updated_at = Utc::now();
        info!(task = %task_id, to = %next, "task transitioned");
        Ok(task.clone())
    }

    /// Cheap status probe used inside other stores' critical sections
    pub fn is_open(&self, task_id: &TaskId) -> bool {
        self.tasks
            .read()
            .get(task_id)
            .map(|t| t.status == TaskStatus::Open)
            .unwrap_or(false)
    }

    /// Tasks still Open whose auction deadline has passed, bounded
    pub fn expired_open(&self, now: DateTime<Utc>, limit: usize) -> Vec<TaskId> {
        let tasks = self.tasks.read();
        let mut expired: Vec<&Task> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Open && t.deadline_passed(now))
            .collect();
        // Oldest deadlines first so a backlog drains in order
        expired.sort_by_key(|t| t.auction_ends_at);
        expired.into_iter().take(limit).map(|t| t.id.clone()).collect()
    }

    /// Number of tasks on the board
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}
