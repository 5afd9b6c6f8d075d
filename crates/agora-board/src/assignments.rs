//! Assignment book
//!
//! One assignment per task, created only by the auction closer. The per-task
//! index insert is the uniqueness guard.

use agora_types::{
    AgentId, AgoraError, Amount, Assignment, AssignmentId, AssignmentStatus, Result, TaskId,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

/// In-memory assignment store
#[derive(Default)]
pub struct AssignmentBook {
    assignments: DashMap<AssignmentId, Assignment>,
    by_task: DashMap<TaskId, AssignmentId>,
}

impl AssignmentBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the assignment for a task; fails if one already exists
    pub fn create(&self, task: TaskId, agent: AgentId, amount: Amount) -> Result<Assignment> {
        let assignment = Assignment::new(task.clone(), agent, amount);
        match self.by_task.entry(task) {
            Entry::Occupied(_) => Err(AgoraError::internal(format!(
                "assignment already exists for task {}",
                assignment.task
            ))),
            Entry::Vacant(slot) => {
                slot.insert(assignment.id.clone());
                info!(assignment = %assignment.id, task = %assignment.task, agent = %assignment.agent, "assignment created");
                self.assignments
                    .insert(assignment.id.clone(), assignment.clone());
                Ok(assignment)
            }
        }
    }

    /// Fetch an assignment snapshot
    pub fn get(&self, assignment_id: &AssignmentId) -> Result<Assignment> {
        self.assignments
            .get(assignment_id)
            .map(|a| a.clone())
            .ok_or_else(|| AgoraError::AssignmentNotFound {
                assignment_id: assignment_id.to_string(),
            })
    }

    /// Fetch the assignment for a task, if any
    pub fn get_by_task(&self, task_id: &TaskId) -> Option<Assignment> {
        let id = self.by_task.get(task_id)?.clone();
        self.assignments.get(&id).map(|a| a.clone())
    }

    /// Conditional status update under the entry lock
    pub fn set_status(
        &self,
        assignment_id: &AssignmentId,
        expected: AssignmentStatus,
        next: AssignmentStatus,
    ) -> Result<Assignment> {
        let mut entry = self.assignments.get_mut(assignment_id).ok_or_else(|| {
            AgoraError::AssignmentNotFound {
                assignment_id: assignment_id.to_string(),
            }
        })?;
        if entry.status != expected {
            return Err(AgoraError::internal(format!(
                "assignment {} is {:?}, expected {:?}",
                assignment_id, entry.status, expected
            )));
        }
        entry.status = next;
        Ok(entry.clone())
    }
}
