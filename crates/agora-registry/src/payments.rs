//! Payment gateway interface
//!
//! Deposits and payouts ride external rails. The escrow ledger is the source
//! of truth for who is owed what; the gateway merely moves money, and payout
//! failures after a committed release are retried out of band.

use agora_types::{AgentId, AgoraError, Amount, BuyerId, DepositId, Result};
use dashmap::DashMap;
use tracing::info;

/// Payment rails interface
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Collect a deposit from a buyer; the returned ID proves funds are held
    async fn collect_deposit(&self, buyer: &BuyerId, amount: Amount) -> Result<DepositId>;

    /// Pay out to an agent
    async fn pay_out(&self, agent: &AgentId, amount: Amount) -> Result<()>;

    /// Return a deposit to a buyer
    async fn return_deposit(&self, buyer: &BuyerId, amount: Amount) -> Result<()>;
}

/// In-memory payment gateway
#[derive(Default)]
pub struct InMemoryGateway {
    deposits: DashMap<DepositId, (BuyerId, Amount)>,
    buyer_limits: DashMap<BuyerId, Amount>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap what a buyer may deposit (unset means unlimited)
    pub fn set_limit(&self, buyer: BuyerId, limit: Amount) {
        self.buyer_limits.insert(buyer, limit);
    }

    /// Number of deposits currently held
    pub fn deposit_count(&self) -> usize {
        self.deposits.len()
    }
}

#[async_trait::async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn collect_deposit(&self, buyer: &BuyerId, amount: Amount) -> Result<DepositId> {
        if !amount.is_positive() {
            return Err(AgoraError::invalid_input(
                "amount",
                "deposit must be positive",
            ));
        }
        if let Some(limit) = self.buyer_limits.get(buyer) {
            if amount.compare(&limit)? == std::cmp::Ordering::Greater {
                return Err(AgoraError::ExternalUnavailable {
                    service: "payment-gateway".to_string(),
                });
            }
        }
        let deposit = DepositId::new();
        self.deposits.insert(deposit.clone(), (buyer.clone(), amount));
        info!(%deposit, %buyer, %amount, "deposit collected");
        Ok(deposit)
    }

    async fn pay_out(&self, agent: &AgentId, amount: Amount) -> Result<()> {
        info!(%agent, %amount, "payout sent");
        Ok(())
    }

    async fn return_deposit(&self, buyer: &BuyerId, amount: Amount) -> Result<()> {
        info!(%buyer, %amount, "deposit returned");
        Ok(())
    }
}
