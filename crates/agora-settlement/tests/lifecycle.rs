//! End-to-end lifecycle tests for the brokerage: funding, bidding, close,
//! settlement, and dispute paths composed exactly as the server drives them.

use agora_auction::CloseOutcome;
use agora_registry::{AgentProfile, AuditSink, Notification, TrustReport};
use agora_settlement::{Brokerage, InMemoryWiring};
use agora_types::{
    AgentId, AgoraError, Amount, AuctionType, BuyerId, Currency, DataClass, DisputeOutcome,
    EscrowStatus, Party, TaskRequirements, TaskStatus,
};
use chrono::Duration;

fn enroll(wiring: &InMemoryWiring, score: f64) -> AgentId {
    let agent = AgentId::new();
    wiring.directory.enroll(AgentProfile {
        agent: agent.clone(),
        platform: String::new(),
        skills: vec!["scraping".to_string(), "labeling".to_string()],
        regions: vec!["eu".to_string(), "global".to_string()],
        cleared_data_class: DataClass::Confidential,
        active: true,
    });
    wiring.reputation.set(
        agent.clone(),
        TrustReport {
            score,
            stake: Amount::credits(1000.0),
        },
    );
    agent
}

fn requirements() -> TaskRequirements {
    TaskRequirements {
        skills: vec!["labeling".to_string()],
        data_class: DataClass::Internal,
        region: "eu".to_string(),
        min_trust_score: 50.0,
        min_stake: Amount::credits(100.0),
    }
}

#[tokio::test]
async fn full_lifecycle_sweep_closes_once_and_pays_winner_once() {
    let (brokerage, wiring) = Brokerage::in_memory("hosted");
    let buyer = BuyerId::new();

    // Fund $100 and open a short auction window
    let (task, escrow) = brokerage
        .fund_task(
            buyer,
            "Label 10k images".to_string(),
            Amount::usd(100.0),
            requirements(),
            AuctionType::SealedBid,
        )
        .await
        .unwrap();
    brokerage
        .open_auction(&task.id, AuctionType::SealedBid, Duration::milliseconds(100))
        .await
        .unwrap();

    // Three eligible agents bid
    let a = enroll(&wiring, 80.0);
    let b = enroll(&wiring, 85.0);
    let c = enroll(&wiring, 90.0);
    brokerage.submit_bid(&task.id, &a, Amount::usd(80.0)).await.unwrap();
    brokerage.submit_bid(&task.id, &b, Amount::usd(75.0)).await.unwrap();
    brokerage.submit_bid(&task.id, &c, Amount::usd(78.0)).await.unwrap();

    // Past the deadline, concurrent sweeps race; the close happens once
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    let sweeps = futures::future::join_all((0..4).map(|_| {
        let brokerage = brokerage.clone();
        async move { brokerage.sweep().await }
    }))
    .await;
    let closing_passes: usize = sweeps
        .iter()
        .map(|results| results.iter().filter(|r| r.success).count())
        .sum();
    assert_eq!(closing_passes, 1);

    // Lowest bid won and the assignment exists
    let status = brokerage.auction_status(&task.id).unwrap();
    assert_eq!(status.task.status, TaskStatus::Assigned);
    let assignment = status.assignment.expect("assignment created");
    assert_eq!(assignment.agent, b);
    assert_eq!(assignment.amount, Amount::usd(75.0));

    // Release pays the winner; counters increment exactly once
    let settlement = brokerage.release(&escrow.id, &b).await.unwrap();
    assert_eq!(settlement.escrow.status, EscrowStatus::Released);

    let stats = brokerage.revenue(&b);
    assert_eq!(stats.payouts, 1);
    assert_eq!(stats.earned_in(Currency::USD), Amount::usd(100.0));

    let again = brokerage.release(&escrow.id, &b).await;
    assert!(matches!(again, Err(AgoraError::EscrowAlreadyReleased { .. })));
    assert_eq!(brokerage.revenue(&b).payouts, 1);

    // Task completed, audit chain intact, winner notified
    assert_eq!(
        brokerage.auction_status(&task.id).unwrap().task.status,
        TaskStatus::Completed
    );
    assert!(wiring.audit.verify_chain().await.unwrap());
    assert!(wiring.notifier.sent().iter().any(|n| matches!(
        n,
        Notification::AuctionWon { agent, .. } if *agent == b
    )));
}

#[tokio::test]
async fn manual_close_races_sweep_to_one_outcome() {
    let (brokerage, wiring) = Brokerage::in_memory("hosted");
    let (task, _escrow) = brokerage
        .fund_task(
            BuyerId::new(),
            "Dedupe records".to_string(),
            Amount::usd(60.0),
            requirements(),
            AuctionType::English,
        )
        .await
        .unwrap();
    brokerage
        .open_auction(&task.id, AuctionType::English, Duration::milliseconds(50))
        .await
        .unwrap();
    let agent = enroll(&wiring, 70.0);
    brokerage
        .submit_bid(&task.id, &agent, Amount::usd(45.0))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(80)).await;

    // Manual closes and sweeps all race on the same task
    let mut close_wins = 0;
    let mut conflicts = 0;
    let manual: Vec<_> = (0..4)
        .map(|_| {
            let brokerage = brokerage.clone();
            let task_id = task.id.clone();
            tokio::spawn(async move { brokerage.close_auction(&task_id).await })
        })
        .collect();
    let swept = {
        let brokerage = brokerage.clone();
        tokio::spawn(async move { brokerage.sweep().await })
    };

    for handle in manual {
        match handle.await.unwrap() {
            Ok(_) => close_wins += 1,
            Err(AgoraError::AuctionAlreadyClosed { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    let sweep_results = swept.await.unwrap();
    let sweep_wins = sweep_results.iter().filter(|r| r.success).count();

    assert_eq!(close_wins + sweep_wins, 1);
    assert_eq!(conflicts, 4 - close_wins);
}

#[tokio::test]
async fn zero_bids_cancels_refunds_and_notifies_buyer() {
    let (brokerage, wiring) = Brokerage::in_memory("hosted");
    let buyer = BuyerId::new();
    let (task, escrow) = brokerage
        .fund_task(
            buyer.clone(),
            "Transcribe calls".to_string(),
            Amount::usd(40.0),
            requirements(),
            AuctionType::SealedBid,
        )
        .await
        .unwrap();
    brokerage
        .open_auction(&task.id, AuctionType::SealedBid, Duration::milliseconds(30))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let results = brokerage.sweep().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert!(results[0].winner.is_none());

    assert_eq!(
        brokerage.auction_status(&task.id).unwrap().task.status,
        TaskStatus::Cancelled
    );
    assert_eq!(
        brokerage.escrow_snapshot(&escrow.id).unwrap().status,
        EscrowStatus::Refunded
    );
    assert!(wiring.notifier.sent().iter().any(|n| matches!(
        n,
        Notification::AuctionCancelled { buyer: b, .. } if *b == buyer
    )));
}

#[tokio::test]
async fn dispute_freezes_escrow_until_split_resolution() {
    let (brokerage, wiring) = Brokerage::in_memory("hosted");
    let (task, escrow) = brokerage
        .fund_task(
            BuyerId::new(),
            "Summarize papers".to_string(),
            Amount::usd(100.0),
            requirements(),
            AuctionType::SealedBid,
        )
        .await
        .unwrap();
    brokerage
        .open_auction(&task.id, AuctionType::SealedBid, Duration::minutes(10))
        .await
        .unwrap();
    let agent = enroll(&wiring, 75.0);
    brokerage
        .submit_bid(&task.id, &agent, Amount::usd(90.0))
        .await
        .unwrap();

    let outcome = brokerage.close_auction(&task.id).await.unwrap();
    let assignment = match outcome {
        CloseOutcome::Winner { assignment, .. } => assignment,
        CloseOutcome::NoBids => panic!("expected winner"),
    };

    // Buyer contests; escrow freezes and release is blocked
    let dispute = brokerage
        .raise_dispute(
            &assignment.id,
            Party::Buyer,
            "Half the summaries are empty".to_string(),
            vec![],
        )
        .await
        .unwrap();
    assert_eq!(
        brokerage.escrow_snapshot(&escrow.id).unwrap().status,
        EscrowStatus::Disputed
    );
    let blocked = brokerage.release(&escrow.id, &agent).await;
    assert!(matches!(blocked, Err(AgoraError::EscrowDisputed { .. })));

    // A second dispute on the same assignment is rejected
    let duplicate = brokerage
        .raise_dispute(&assignment.id, Party::Agent, "counter".to_string(), vec![])
        .await;
    assert!(matches!(duplicate, Err(AgoraError::DisputeAlreadyOpen { .. })));

    // Split resolution divides the held amount and is terminal
    let resolution = brokerage
        .resolve_dispute(
            &dispute.id,
            DisputeOutcome::Split {
                to_agent: Amount::usd(60.0),
            },
        )
        .await
        .unwrap();
    let (_, agent_share) = resolution.settlement.to_agent.clone().unwrap();
    let (_, buyer_share) = resolution.settlement.to_buyer.clone().unwrap();
    assert_eq!(
        agent_share.checked_add(buyer_share).unwrap(),
        Amount::usd(100.0)
    );
    assert_eq!(brokerage.revenue(&agent).earned_in(Currency::USD), Amount::usd(60.0));

    let repeat = brokerage
        .resolve_dispute(&dispute.id, DisputeOutcome::Refund)
        .await;
    assert!(matches!(repeat, Err(AgoraError::DisputeAlreadyResolved { .. })));

    assert!(wiring.audit.verify_chain().await.unwrap());
}

#[tokio::test]
async fn ineligible_and_invalid_bids_never_enter_the_ledger() {
    let (brokerage, wiring) = Brokerage::in_memory("hosted");
    let (task, _escrow) = brokerage
        .fund_task(
            BuyerId::new(),
            "Audit contracts".to_string(),
            Amount::usd(100.0),
            requirements(),
            AuctionType::SealedBid,
        )
        .await
        .unwrap();
    brokerage
        .open_auction(&task.id, AuctionType::SealedBid, Duration::minutes(5))
        .await
        .unwrap();

    // Low trust fails eligibility
    let untrusted = enroll(&wiring, 10.0);
    let rejected = brokerage
        .submit_bid(&task.id, &untrusted, Amount::usd(50.0))
        .await;
    assert!(matches!(rejected, Err(AgoraError::AgentNotEligible { .. })));

    // Non-positive amounts are rejected for anyone
    let trusted = enroll(&wiring, 90.0);
    let zero = brokerage
        .submit_bid(&task.id, &trusted, Amount::usd(0.0))
        .await;
    assert!(matches!(zero, Err(AgoraError::InvalidBidAmount { .. })));

    assert_eq!(brokerage.auction_status(&task.id).unwrap().active_bids, 0);
}

#[tokio::test]
async fn sweep_batch_bound_is_respected() {
    let (brokerage, _wiring) = Brokerage::in_memory("hosted");

    for i in 0..5 {
        let (task, _escrow) = brokerage
            .fund_task(
                BuyerId::new(),
                format!("Batch task {i}"),
                Amount::usd(10.0),
                requirements(),
                AuctionType::SealedBid,
            )
            .await
            .unwrap();
        brokerage
            .open_auction(&task.id, AuctionType::SealedBid, Duration::milliseconds(10))
            .await
            .unwrap();
    }

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    // Bounded batches drain the backlog across passes
    assert_eq!(brokerage.sweep_with(2).await.len(), 2);
    assert_eq!(brokerage.sweep_with(2).await.len(), 2);
    assert_eq!(brokerage.sweep_with(2).await.len(), 1);
    assert!(brokerage.sweep_with(2).await.is_empty());
}
