//! Assignment types for Agora

use crate::{AgentId, Amount, AssignmentId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignmentStatus {
    /// Work underway or awaiting completion
    Active,
    /// Work accepted and settled
    Completed,
    /// Voided by dispute resolution
    Cancelled,
}

/// The binding of a task to its winning agent
///
/// Created exactly once per task, only on the Open → Assigned transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Unique assignment ID
    pub id: AssignmentId,
    /// The task that was auctioned
    pub task: TaskId,
    /// The winning agent
    pub agent: AgentId,
    /// The winning bid amount
    pub amount: Amount,
    /// Current status
    pub status: AssignmentStatus,
    /// When the assignment was created
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    /// Create a new active assignment
    pub fn new(task: TaskId, agent: AgentId, amount: Amount) -> Self {
        Self {
            id: AssignmentId::new(),
            task,
            agent,
            amount,
            status: AssignmentStatus::Active,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_assignment_is_active() {
        let assignment = Assignment::new(TaskId::new(), AgentId::new(), Amount::usd(75.0));
        assert_eq!(assignment.status, AssignmentStatus::Active);
    }
}
