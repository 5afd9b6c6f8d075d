//! Agora Bids - The bid ledger
//!
//! Accepts, validates, and stores competitive bids. All writes for a task
//! happen under that task's entry lock, which serializes concurrent bidders
//! and keeps the "at most one active bid per (task, agent)" invariant from
//! racing. Task status is re-checked inside the critical section so a bid
//! can never land after the closer has collected and marked the task's bids.

use agora_board::TaskBoard;
use agora_eligibility::EligibilityService;
use agora_types::{
    AgentId, AgoraError, Amount, Bid, BidId, BidStatus, Result, TaskId, TemporalAnchor,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// In-memory bid ledger
pub struct BidLedger {
    bids: DashMap<TaskId, Vec<Bid>>,
    sequence: AtomicU64,
    board: Arc<TaskBoard>,
    eligibility: Arc<EligibilityService>,
}

impl BidLedger {
    pub fn new(board: Arc<TaskBoard>, eligibility: Arc<EligibilityService>) -> Self {
        Self {
            bids: DashMap::new(),
            sequence: AtomicU64::new(0),
            board,
            eligibility,
        }
    }

    /// Submit a bid, superseding the agent's previous active bid if any
    ///
    /// No side effects beyond the ledger write; notification is the
    /// orchestrator's concern.
    pub async fn submit(&self, task_id: &TaskId, agent: &AgentId, amount: Amount) -> Result<Bid> {
        let task = self.board.get(task_id)?;
        let now = chrono::Utc::now();

        if !task.accepting_bids(now) {
            let reason = if task.deadline_passed(now) {
                "auction deadline has passed"
            } else if task.auction_ends_at.is_none() {
                "auction has not been opened"
            } else {
                "task is not open"
            };
            return Err(AgoraError::AuctionNotOpen {
                task_id: task_id.to_string(),
                reason: reason.to_string(),
            });
        }

        if !amount.is_positive() {
            return Err(AgoraError::InvalidBidAmount {
                amount: amount.to_human(),
            });
        }
        if amount.currency != task.budget.currency {
            return Err(AgoraError::CurrencyMismatch {
                expected: task.budget.currency.code().to_string(),
                actual: amount.currency.code().to_string(),
            });
        }

        let report = self.eligibility.check(&task.requirements, agent).await?;
        if !report.eligible {
            return Err(AgoraError::AgentNotEligible {
                agent_id: agent.to_string(),
                task_id: task_id.to_string(),
            });
        }

        let anchor = self.next_anchor();
        let bid = Bid::new(task_id.clone(), agent.clone(), amount, anchor);

        {
            let mut entry = self.bids.entry(task_id.clone()).or_default();
            // The closer collects and marks under this same entry lock, so a
            // task that is no longer open must reject the write here.
            if !self.board.is_open(task_id) {
                return Err(AgoraError::AuctionNotOpen {
                    task_id: task_id.to_string(),
                    reason: "auction closed while bid was in flight".to_string(),
                });
            }
            for prior in entry.iter_mut() {
                if prior.agent == *agent && prior.status == BidStatus::Active {
                    prior.status = BidStatus::Superseded;
                }
            }
            entry.push(bid.clone());
        }

        info!(task = %task_id, %agent, amount = %bid.amount, "bid accepted");
        Ok(bid)
    }

    /// Withdraw the agent's active bid on an open auction
    pub fn withdraw(&self, task_id: &TaskId, agent: &AgentId) -> Result<Bid> {
        let task = self.board.get(task_id)?;
        if task.status != agora_types::TaskStatus::Open {
            return Err(AgoraError::AuctionNotOpen {
                task_id: task_id.to_string(),
                reason: "task is not open".to_string(),
            });
        }

        let mut entry = self.bids.entry(task_id.clone()).or_default();
        // Same re-validation as submit: the closer may have claimed the task
        // between the status probe above and this critical section.
        if !self.board.is_open(task_id) {
            return Err(AgoraError::AuctionNotOpen {
                task_id: task_id.to_string(),
                reason: "auction closed while withdrawal was in flight".to_string(),
            });
        }
        let bid = entry
            .iter_mut()
            .find(|b| b.agent == *agent && b.status == BidStatus::Active)
            .ok_or_else(|| AgoraError::NoActiveBid {
                agent_id: agent.to_string(),
                task_id: task_id.to_string(),
            })?;
        bid.status = BidStatus::Withdrawn;
        info!(task = %task_id, %agent, "bid withdrawn");
        Ok(bid.clone())
    }

    /// Snapshot of the active bids for a task
    pub fn active(&self, task_id: &TaskId) -> Vec<Bid> {
        self.bids
            .get(task_id)
            .map(|bids| {
                bids.iter()
                    .filter(|b| b.status == BidStatus::Active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of every bid ever placed on a task
    pub fn all(&self, task_id: &TaskId) -> Vec<Bid> {
        self.bids.get(task_id).map(|b| b.clone()).unwrap_or_default()
    }

    /// Mark the auction outcome on the task's bids: the winner becomes Won,
    /// every other active bid becomes Lost
    ///
    /// Called by the closer after it has won the status compare-and-set, so
    /// no new active bid can appear concurrently.
    pub fn mark_closed(&self, task_id: &TaskId, winner: Option<&BidId>) {
        if let Some(mut entry) = self.bids.get_mut(task_id) {
            for bid in entry.iter_mut() {
                if bid.status == BidStatus::Active {
                    bid.status = if Some(&bid.id) == winner {
                        BidStatus::Won
                    } else {
                        BidStatus::Lost
                    };
                }
            }
        }
    }

    fn next_anchor(&self) -> TemporalAnchor {
        TemporalAnchor::new(
            chrono::Utc::now().timestamp_millis(),
            self.sequence.fetch_add(1, Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_board::TaskBoard;
    use agora_registry::{
        AgentProfile, DirectoryRegistry, InMemoryDirectory, InMemoryReputation, TrustReport,
    };
    use agora_types::{
        AuctionType, BuyerId, Currency, DataClass, EscrowId, Task, TaskRequirements, TaskStatus,
    };
    use chrono::{Duration, Utc};

    struct Fixture {
        board: Arc<TaskBoard>,
        ledger: Arc<BidLedger>,
        directory: Arc<InMemoryDirectory>,
        reputation: Arc<InMemoryReputation>,
    }

    fn fixture() -> Fixture {
        let board = Arc::new(TaskBoard::new());
        let registry = Arc::new(DirectoryRegistry::new());
        let directory = Arc::new(InMemoryDirectory::new("hosted"));
        registry.register(directory.clone());
        let reputation = Arc::new(InMemoryReputation::new());
        let eligibility = Arc::new(EligibilityService::new(registry, reputation.clone()));
        let ledger = Arc::new(BidLedger::new(board.clone(), eligibility));
        Fixture {
            board,
            ledger,
            directory,
            reputation,
        }
    }

    fn enroll_agent(fixture: &Fixture) -> AgentId {
        let agent = AgentId::new();
        fixture.directory.enroll(AgentProfile {
            agent: agent.clone(),
            platform: String::new(),
            skills: vec![],
            regions: vec!["global".to_string()],
            cleared_data_class: DataClass::Restricted,
            active: true,
        });
        fixture.reputation.set(
            agent.clone(),
            TrustReport {
                score: 80.0,
                stake: Amount::credits(1000.0),
            },
        );
        agent
    }

    fn open_task(fixture: &Fixture) -> TaskId {
        let task = Task::new(
            TaskId::new(),
            BuyerId::new(),
            "Translate docs".to_string(),
            Amount::usd(100.0),
            TaskRequirements::open_to_all(Currency::CREDIT),
            AuctionType::English,
            EscrowId::new(),
        );
        let id = task.id.clone();
        fixture.board.insert(task);
        fixture
            .board
            .open_auction(&id, AuctionType::English, Utc::now() + Duration::minutes(60))
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_zero_and_negative_bids_rejected() {
        let fx = fixture();
        let task = open_task(&fx);
        let agent = enroll_agent(&fx);

        for bad in [Amount::usd(0.0), Amount::usd(-5.0)] {
            let result = fx.ledger.submit(&task, &agent, bad).await;
            assert!(matches!(result, Err(AgoraError::InvalidBidAmount { .. })));
        }
    }

    #[tokio::test]
    async fn test_bid_before_auction_opens_rejected() {
        let fx = fixture();
        let task = Task::new(
            TaskId::new(),
            BuyerId::new(),
            "Unopened".to_string(),
            Amount::usd(50.0),
            TaskRequirements::open_to_all(Currency::CREDIT),
            AuctionType::SealedBid,
            EscrowId::new(),
        );
        let task_id = task.id.clone();
        fx.board.insert(task);
        let agent = enroll_agent(&fx);

        let result = fx.ledger.submit(&task_id, &agent, Amount::usd(40.0)).await;
        assert!(matches!(result, Err(AgoraError::AuctionNotOpen { .. })));
    }

    #[tokio::test]
    async fn test_currency_must_match_budget() {
        let fx = fixture();
        let task = open_task(&fx);
        let agent = enroll_agent(&fx);

        let result = fx
            .ledger
            .submit(&task, &agent, Amount::from_human(40.0, Currency::EUR))
            .await;
        assert!(matches!(result, Err(AgoraError::CurrencyMismatch { .. })));
    }

    #[tokio::test]
    async fn test_unregistered_agent_cannot_bid() {
        let fx = fixture();
        let task = open_task(&fx);

        let result = fx
            .ledger
            .submit(&task, &AgentId::new(), Amount::usd(40.0))
            .await;
        assert!(matches!(result, Err(AgoraError::AgentUnknown { .. })));
    }

    #[tokio::test]
    async fn test_new_bid_supersedes_previous() {
        let fx = fixture();
        let task = open_task(&fx);
        let agent = enroll_agent(&fx);

        fx.ledger.submit(&task, &agent, Amount::usd(90.0)).await.unwrap();
        fx.ledger.submit(&task, &agent, Amount::usd(80.0)).await.unwrap();

        let active = fx.ledger.active(&task);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].amount, Amount::usd(80.0));

        let all = fx.ledger.all(&task);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].status, BidStatus::Superseded);
    }

    #[tokio::test]
    async fn test_concurrent_bids_keep_one_active_per_agent() {
        let fx = fixture();
        let task = open_task(&fx);
        let agent = enroll_agent(&fx);

        let mut handles = Vec::new();
        for i in 0..12u32 {
            let ledger = fx.ledger.clone();
            let task = task.clone();
            let agent = agent.clone();
            handles.push(tokio::spawn(async move {
                ledger.submit(&task, &agent, Amount::usd(50.0 + i as f64)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(fx.ledger.active(&task).len(), 1);
        assert_eq!(fx.ledger.all(&task).len(), 12);
    }

    #[tokio::test]
    async fn test_bid_rejected_once_task_leaves_open() {
        let fx = fixture();
        let task = open_task(&fx);
        let agent = enroll_agent(&fx);

        fx.board
            .transition(&task, TaskStatus::Open, TaskStatus::Assigned)
            .unwrap();

        let result = fx.ledger.submit(&task, &agent, Amount::usd(40.0)).await;
        assert!(matches!(result, Err(AgoraError::AuctionNotOpen { .. })));
    }

    #[tokio::test]
    async fn test_withdraw_active_bid() {
        let fx = fixture();
        let task = open_task(&fx);
        let agent = enroll_agent(&fx);

        fx.ledger.submit(&task, &agent, Amount::usd(90.0)).await.unwrap();
        fx.ledger.withdraw(&task, &agent).unwrap();
        assert!(fx.ledger.active(&task).is_empty());

        let again = fx.ledger.withdraw(&task, &agent);
        assert!(matches!(again, Err(AgoraError::NoActiveBid { .. })));
    }

    #[tokio::test]
    async fn test_anchors_are_strictly_increasing() {
        let fx = fixture();
        let task = open_task(&fx);
        let a = enroll_agent(&fx);
        let b = enroll_agent(&fx);

        let first = fx.ledger.submit(&task, &a, Amount::usd(80.0)).await.unwrap();
        let second = fx.ledger.submit(&task, &b, Amount::usd(80.0)).await.unwrap();
        assert!(first.submitted_at < second.submitted_at);
    }
}
