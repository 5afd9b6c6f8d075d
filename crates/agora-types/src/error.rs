//! Error types for Agora
//!
//! Every financial-state error carries a stable code that the HTTP surface
//! exposes verbatim, so callers can branch on outcomes without parsing
//! messages.

use thiserror::Error;

/// Result type for Agora operations
pub type Result<T> = std::result::Result<T, AgoraError>;

/// Agora error types
#[derive(Debug, Clone, Error)]
pub enum AgoraError {
    // ========================================================================
    // Amount Errors
    // ========================================================================

    /// Amount overflow during arithmetic
    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    /// Currency mismatch
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    // ========================================================================
    // Task & Auction Errors
    // ========================================================================

    /// Task not found
    #[error("Task {task_id} not found")]
    TaskNotFound { task_id: String },

    /// Auction is not accepting bids
    #[error("Auction for task {task_id} is not open: {reason}")]
    AuctionNotOpen { task_id: String, reason: String },

    /// Auction has already been closed
    #[error("Auction for task {task_id} has already been closed")]
    AuctionAlreadyClosed { task_id: String },

    /// Auction already has a deadline
    #[error("Auction for task {task_id} was already opened")]
    AuctionAlreadyOpened { task_id: String },

    /// Task is not in the expected status for the requested transition
    #[error("Task {task_id} is in status {status}, cannot {operation}")]
    TaskStatusConflict {
        task_id: String,
        status: String,
        operation: String,
    },

    // ========================================================================
    // Bid Errors
    // ========================================================================

    /// Bid amount must be strictly positive
    #[error("Invalid bid amount: {amount}")]
    InvalidBidAmount { amount: f64 },

    /// Agent fails the eligibility checks for the task
    #[error("Agent {agent_id} is not eligible to bid on task {task_id}")]
    AgentNotEligible { agent_id: String, task_id: String },

    /// Bid not found
    #[error("Bid {bid_id} not found")]
    BidNotFound { bid_id: String },

    /// No active bid to withdraw
    #[error("Agent {agent_id} has no active bid on task {task_id}")]
    NoActiveBid { agent_id: String, task_id: String },

    // ========================================================================
    // Assignment Errors
    // ========================================================================

    /// Assignment not found
    #[error("Assignment {assignment_id} not found")]
    AssignmentNotFound { assignment_id: String },

    // ========================================================================
    // Escrow Errors
    // ========================================================================

    /// Escrow not found
    #[error("Escrow {escrow_id} not found")]
    EscrowNotFound { escrow_id: String },

    /// Escrow is not in the Held state
    #[error("Escrow {escrow_id} is in state {status}, expected Held")]
    EscrowNotHeld { escrow_id: String, status: String },

    /// Escrow already released
    #[error("Escrow {escrow_id} has already been released")]
    EscrowAlreadyReleased { escrow_id: String },

    /// Escrow already refunded
    #[error("Escrow {escrow_id} has already been refunded")]
    EscrowAlreadyRefunded { escrow_id: String },

    /// Escrow is frozen pending dispute resolution
    #[error("Escrow {escrow_id} is in dispute")]
    EscrowDisputed { escrow_id: String },

    /// Release recipient is not the assignment's winning agent
    #[error("Agent {agent_id} is not the payee of escrow {escrow_id}")]
    RecipientMismatch { escrow_id: String, agent_id: String },

    /// Split amounts must not exceed the held amount
    #[error("Invalid split of escrow {escrow_id}: {reason}")]
    InvalidSplit { escrow_id: String, reason: String },

    // ========================================================================
    // Dispute Errors
    // ========================================================================

    /// Dispute not found
    #[error("Dispute {dispute_id} not found")]
    DisputeNotFound { dispute_id: String },

    /// An open dispute already exists for the assignment
    #[error("Assignment {assignment_id} already has an open dispute")]
    DisputeAlreadyOpen { assignment_id: String },

    /// Dispute has already been resolved
    #[error("Dispute {dispute_id} has already been resolved")]
    DisputeAlreadyResolved { dispute_id: String },

    // ========================================================================
    // Collaborator Errors
    // ========================================================================

    /// Agent is not known to any registered platform directory
    #[error("Agent {agent_id} is not registered")]
    AgentUnknown { agent_id: String },

    /// External collaborator timed out or failed
    #[error("External collaborator unavailable: {service}")]
    ExternalUnavailable { service: String },

    // ========================================================================
    // General Errors
    // ========================================================================

    /// Unauthorized action
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Invalid input
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AgoraError {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Check if this is a retriable error
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Internal { .. } | Self::ExternalUnavailable { .. }
        )
    }

    /// Get a stable error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            Self::TaskNotFound { .. } => "TASK_NOT_FOUND",
            Self::AuctionNotOpen { .. } => "AUCTION_NOT_OPEN",
            Self::AuctionAlreadyClosed { .. } => "AUCTION_ALREADY_CLOSED",
            Self::AuctionAlreadyOpened { .. } => "AUCTION_ALREADY_OPENED",
            Self::TaskStatusConflict { .. } => "TASK_STATUS_CONFLICT",
            Self::InvalidBidAmount { .. } => "INVALID_BID_AMOUNT",
            Self::AgentNotEligible { .. } => "AGENT_NOT_ELIGIBLE",
            Self::BidNotFound { .. } => "BID_NOT_FOUND",
            Self::NoActiveBid { .. } => "NO_ACTIVE_BID",
            Self::AssignmentNotFound { .. } => "ASSIGNMENT_NOT_FOUND",
            Self::EscrowNotFound { .. } => "ESCROW_NOT_FOUND",
            Self::EscrowNotHeld { .. } => "ESCROW_NOT_HELD",
            Self::EscrowAlreadyReleased { .. } => "ESCROW_ALREADY_RELEASED",
            Self::EscrowAlreadyRefunded { .. } => "ESCROW_ALREADY_REFUNDED",
            Self::EscrowDisputed { .. } => "ESCROW_DISPUTED",
            Self::RecipientMismatch { .. } => "RECIPIENT_MISMATCH",
            Self::InvalidSplit { .. } => "INVALID_SPLIT",
            Self::DisputeNotFound { .. } => "DISPUTE_NOT_FOUND",
            Self::DisputeAlreadyOpen { .. } => "DISPUTE_ALREADY_OPEN",
            Self::DisputeAlreadyResolved { .. } => "DISPUTE_ALREADY_RESOLVED",
            Self::AgentUnknown { .. } => "AGENT_UNKNOWN",
            Self::ExternalUnavailable { .. } => "EXTERNAL_UNAVAILABLE",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AgoraError::EscrowAlreadyReleased {
            escrow_id: "test".to_string(),
        };
        assert_eq!(err.error_code(), "ESCROW_ALREADY_RELEASED");
    }

    #[test]
    fn test_retriable_errors() {
        let internal = AgoraError::internal("test");
        assert!(internal.is_retriable());

        let not_found = AgoraError::TaskNotFound {
            task_id: "test".to_string(),
        };
        assert!(!not_found.is_retriable());
    }
}
