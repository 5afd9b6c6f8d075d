//! Agora Registry - External collaborator interfaces
//!
//! The marketplace core consumes yes/no and numeric answers from the systems
//! around it: agent directories, the reputation service, notification
//! delivery, payment rails, and the audit trail. Each collaborator is a
//! narrow async trait with a reference in-memory implementation used by the
//! server, demos, and tests.
//!
//! Collaborator calls are never allowed to stall a financial transition:
//! [`bounded`] wraps every call with a short timeout, and callers treat
//! failures after a committed transition as degradable side effects.

pub mod audit;
pub mod directory;
pub mod notify;
pub mod payments;
pub mod reputation;

pub use audit::*;
pub use directory::*;
pub use notify::*;
pub use payments::*;
pub use reputation::*;

use agora_types::{AgoraError, Result};
use std::future::Future;
use std::time::Duration;

/// Default budget for a single collaborator call
pub const COLLABORATOR_TIMEOUT: Duration = Duration::from_millis(500);

/// Run a collaborator call with a bounded timeout
///
/// A timeout maps to [`AgoraError::ExternalUnavailable`] carrying the
/// collaborator's name, so callers can decide whether to fail the request
/// (pre-commit) or log and continue (post-commit).
pub async fn bounded<T, F>(service: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(COLLABORATOR_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(AgoraError::ExternalUnavailable {
            service: service.to_string(),
        }),
    }
}
