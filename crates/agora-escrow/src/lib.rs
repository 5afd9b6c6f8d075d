//! Agora Escrow - The escrow ledger
//!
//! Holds buyer funds against a task and moves them to exactly one terminal
//! outcome. Every transition is a conditional write performed under the
//! escrow's entry lock: the current status is checked and the new status
//! written in the same critical section, so concurrent release/refund/dispute
//! calls can never double-settle.
//!
//! Revenue counters are credited in the same critical section as the
//! transition that earns them, which is what makes "pay the winner exactly
//! once" hold under retries.

use agora_types::{
    AgentId, AgoraError, Amount, AssignmentId, BuyerId, Escrow, EscrowId, EscrowStatus, Result,
    RevenueStats, TaskId,
};
use chrono::Utc;
use dashmap::DashMap;
use tracing::info;

/// Outcome of a settlement transition, for the orchestrator's side effects
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// The escrow after the transition
    pub escrow: Escrow,
    /// Amount owed to the agent on external rails, if any
    pub to_agent: Option<(AgentId, Amount)>,
    /// Amount owed back to the buyer on external rails, if any
    pub to_buyer: Option<(BuyerId, Amount)>,
}

/// In-memory escrow ledger with per-agent revenue counters
#[derive(Default)]
pub struct EscrowLedger {
    escrows: DashMap<EscrowId, Escrow>,
    revenue: DashMap<AgentId, RevenueStats>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a held escrow for a funded task
    pub fn open(&self, task: TaskId, payer: BuyerId, amount: Amount) -> Escrow {
        let escrow = Escrow::new(task, payer, amount);
        info!(escrow = %escrow.id, amount = %escrow.amount, "escrow held");
        self.escrows.insert(escrow.id.clone(), escrow.clone());
        escrow
    }

    /// Fetch an escrow snapshot
    pub fn get(&self, escrow_id: &EscrowId) -> Result<Escrow> {
        self.escrows
            .get(escrow_id)
            .map(|e| e.clone())
            .ok_or_else(|| AgoraError::EscrowNotFound {
                escrow_id: escrow_id.to_string(),
            })
    }

    /// Bind the winning assignment and payee, once, while the escrow is held
    pub fn bind_assignment(
        &self,
        escrow_id: &EscrowId,
        assignment: AssignmentId,
        payee: AgentId,
    ) -> Result<Escrow> {
        let mut entry = self.entry(escrow_id)?;
        if entry.status != EscrowStatus::Held {
            return Err(AgoraError::EscrowNotHeld {
                escrow_id: escrow_id.to_string(),
                status: entry.status.to_string(),
            });
        }
        if entry.assignment.is_some() {
            return Err(AgoraError::internal(format!(
                "escrow {} already bound to an assignment",
                escrow_id
            )));
        }
        entry.assignment = Some(assignment);
        entry.payee = Some(payee);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Release held funds to the winning agent
    ///
    /// Conditional write: only legal from Held, only to the bound payee, and
    /// idempotence-safe: a second call reports `EscrowAlreadyReleased`
    /// without touching the revenue counters again.
    pub fn release(&self, escrow_id: &EscrowId, to: &AgentId) -> Result<Settlement> {
        let mut entry = self.entry(escrow_id)?;
        match entry.status {
            EscrowStatus::Held => {}
            EscrowStatus::Released => {
                return Err(AgoraError::EscrowAlreadyReleased {
                    escrow_id: escrow_id.to_string(),
                })
            }
            EscrowStatus::Disputed => {
                return Err(AgoraError::EscrowDisputed {
                    escrow_id: escrow_id.to_string(),
                })
            }
            status => {
                return Err(AgoraError::EscrowNotHeld {
                    escrow_id: escrow_id.to_string(),
                    status: status.to_string(),
                })
            }
        }
        if entry.payee.as_ref() != Some(to) {
            return Err(AgoraError::RecipientMismatch {
                escrow_id: escrow_id.to_string(),
                agent_id: to.to_string(),
            });
        }

        entry.status = EscrowStatus::Released;
        entry.updated_at = Utc::now();
        let amount = entry.amount;
        self.credit(&mut entry, to.clone(), amount);
        info!(escrow = %escrow_id, agent = %to, %amount, "escrow released");

        Ok(Settlement {
            escrow: entry.clone(),
            to_agent: Some((to.clone(), amount)),
            to_buyer: None,
        })
    }

    /// Return held funds to the buyer
    pub fn refund(&self, escrow_id: &EscrowId) -> Result<Settlement> {
        let mut entry = self.entry(escrow_id)?;
        match entry.status {
            EscrowStatus::Held => {}
            EscrowStatus::Refunded => {
                return Err(AgoraError::EscrowAlreadyRefunded {
                    escrow_id: escrow_id.to_string(),
                })
            }
            EscrowStatus::Disputed => {
                return Err(AgoraError::EscrowDisputed {
                    escrow_id: escrow_id.to_string(),
                })
            }
            status => {
                return Err(AgoraError::EscrowNotHeld {
                    escrow_id: escrow_id.to_string(),
                    status: status.to_string(),
                })
            }
        }

        entry.status = EscrowStatus::Refunded;
        entry.updated_at = Utc::now();
        let amount = entry.amount;
        let payer = entry.payer.clone();
        info!(escrow = %escrow_id, buyer = %payer, %amount, "escrow refunded");

        Ok(Settlement {
            escrow: entry.clone(),
            to_agent: None,
            to_buyer: Some((payer, amount)),
        })
    }

    /// Freeze the escrow under contention
    ///
    /// Legal from Held, or from Released while the payout has not yet settled
    /// on external rails. Blocks release and refund until a resolution.
    pub fn mark_disputed(&self, escrow_id: &EscrowId) -> Result<Escrow> {
        let mut entry = self.entry(escrow_id)?;
        let allowed = entry.status == EscrowStatus::Held
            || (entry.status == EscrowStatus::Released && !entry.settled_externally);
        if !allowed {
            return Err(AgoraError::EscrowNotHeld {
                escrow_id: escrow_id.to_string(),
                status: entry.status.to_string(),
            });
        }
        entry.status = EscrowStatus::Disputed;
        entry.updated_at = Utc::now();
        info!(escrow = %escrow_id, "escrow disputed");
        Ok(entry.clone())
    }

    /// Resolve a disputed escrow in the agent's favor
    pub fn resolve_release(&self, escrow_id: &EscrowId) -> Result<Settlement> {
        let mut entry = self.disputed_entry(escrow_id)?;
        let payee = entry.payee.clone().ok_or_else(|| {
            AgoraError::internal(format!("escrow {} has no bound payee", escrow_id))
        })?;

        entry.status = EscrowStatus::Resolved;
        entry.updated_at = Utc::now();
        let amount = entry.amount;
        let already_credited = entry.credited;
        if !already_credited {
            self.credit(&mut entry, payee.clone(), amount);
        }
        info!(escrow = %escrow_id, agent = %payee, %amount, "dispute resolved: release");

        Ok(Settlement {
            escrow: entry.clone(),
            to_agent: (!already_credited).then(|| (payee, amount)),
            to_buyer: None,
        })
    }

    /// Resolve a disputed escrow in the buyer's favor
    pub fn resolve_refund(&self, escrow_id: &EscrowId) -> Result<Settlement> {
        let mut entry = self.disputed_entry(escrow_id)?;

        entry.status = EscrowStatus::Resolved;
        entry.updated_at = Utc::now();
        let amount = entry.amount;
        let payer = entry.payer.clone();
        // A payout credited before the dispute froze the escrow is reversed
        if entry.credited {
            if let Some(payee) = entry.payee.clone() {
                entry.credited = false;
                self.revenue.entry(payee).or_default().claw_back(amount);
            }
        }
        info!(escrow = %escrow_id, buyer = %payer, %amount, "dispute resolved: refund");

        Ok(Settlement {
            escrow: entry.clone(),
            to_agent: None,
            to_buyer: Some((payer, amount)),
        })
    }

    /// Resolve a disputed escrow by splitting the held amount
    ///
    /// `to_agent` goes to the payee and the remainder to the buyer; the two
    /// transfers always sum to the held amount.
    pub fn resolve_split(&self, escrow_id: &EscrowId, to_agent: Amount) -> Result<Settlement> {
        let mut entry = self.disputed_entry(escrow_id)?;
        let payee = entry.payee.clone().ok_or_else(|| {
            AgoraError::internal(format!("escrow {} has no bound payee", escrow_id))
        })?;

        if to_agent.currency != entry.amount.currency {
            return Err(AgoraError::CurrencyMismatch {
                expected: entry.amount.currency.code().to_string(),
                actual: to_agent.currency.code().to_string(),
            });
        }
        if to_agent.is_negative() || to_agent.value > entry.amount.value {
            return Err(AgoraError::InvalidSplit {
                escrow_id: escrow_id.to_string(),
                reason: format!(
                    "agent share {} must be between zero and the held amount {}",
                    to_agent, entry.amount
                ),
            });
        }
        let to_buyer = entry.amount.checked_sub(to_agent)?;

        entry.status = EscrowStatus::Resolved;
        entry.updated_at = Utc::now();
        if entry.credited {
            // Earlier full credit is replaced by the split share
            self.revenue
                .entry(payee.clone())
                .or_default()
                .claw_back(entry.amount);
            entry.credited = false;
        }
        if to_agent.is_positive() {
            self.credit(&mut entry, payee.clone(), to_agent);
        }
        let payer = entry.payer.clone();
        info!(escrow = %escrow_id, agent = %payee, %to_agent, %to_buyer, "dispute resolved: split");

        Ok(Settlement {
            escrow: entry.clone(),
            to_agent: to_agent.is_positive().then(|| (payee, to_agent)),
            to_buyer: to_buyer.is_positive().then(|| (payer, to_buyer)),
        })
    }

    /// Record that a released payout settled on external rails
    pub fn mark_settled_externally(&self, escrow_id: &EscrowId) -> Result<Escrow> {
        let mut entry = self.entry(escrow_id)?;
        if entry.status != EscrowStatus::Released {
            return Err(AgoraError::EscrowNotHeld {
                escrow_id: escrow_id.to_string(),
                status: entry.status.to_string(),
            });
        }
        entry.settled_externally = true;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Revenue counters for an agent
    pub fn revenue(&self, agent: &AgentId) -> RevenueStats {
        self.revenue.get(agent).map(|r| r.clone()).unwrap_or_default()
    }

    fn entry(
        &self,
        escrow_id: &EscrowId,
    ) -> Result<dashmap::mapref::one::RefMut<'_, EscrowId, Escrow>> {
        self.escrows
            .get_mut(escrow_id)
            .ok_or_else(|| AgoraError::EscrowNotFound {
                escrow_id: escrow_id.to_string(),
            })
    }

    fn disputed_entry(
        &self,
        escrow_id: &EscrowId,
    ) -> Result<dashmap::mapref::one::RefMut<'_, EscrowId, Escrow>> {
        let entry = self.entry(escrow_id)?;
        match entry.status {
            EscrowStatus::Disputed => Ok(entry),
            EscrowStatus::Resolved => Err(AgoraError::DisputeAlreadyResolved {
                dispute_id: escrow_id.to_string(),
            }),
            status => Err(AgoraError::EscrowNotHeld {
                escrow_id: escrow_id.to_string(),
                status: status.to_string(),
            }),
        }
    }

    fn credit(
        &self,
        entry: &mut dashmap::mapref::one::RefMut<'_, EscrowId, Escrow>,
        agent: AgentId,
        amount: Amount,
    ) {
        entry.credited = true;
        self.revenue.entry(agent).or_default().credit(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::Currency;

    fn held_escrow(ledger: &EscrowLedger) -> (EscrowId, AgentId) {
        let escrow = ledger.open(TaskId::new(), BuyerId::new(), Amount::usd(100.0));
        let agent = AgentId::new();
        ledger
            .bind_assignment(&escrow.id, AssignmentId::new(), agent.clone())
            .unwrap();
        (escrow.id, agent)
    }

    #[test]
    fn test_release_pays_and_credits_once() {
        let ledger = EscrowLedger::new();
        let (escrow_id, agent) = held_escrow(&ledger);

        let settlement = ledger.release(&escrow_id, &agent).unwrap();
        assert_eq!(settlement.escrow.status, EscrowStatus::Released);
        assert_eq!(settlement.to_agent, Some((agent.clone(), Amount::usd(100.0))));

        let stats = ledger.revenue(&agent);
        assert_eq!(stats.payouts, 1);
        assert_eq!(stats.earned_in(Currency::USD), Amount::usd(100.0));

        // Second call is rejected and does not re-credit
        let again = ledger.release(&escrow_id, &agent);
        assert!(matches!(again, Err(AgoraError::EscrowAlreadyReleased { .. })));
        assert_eq!(ledger.revenue(&agent).payouts, 1);
    }

    #[test]
    fn test_release_to_wrong_agent_rejected() {
        let ledger = EscrowLedger::new();
        let (escrow_id, _agent) = held_escrow(&ledger);

        let imposter = AgentId::new();
        let result = ledger.release(&escrow_id, &imposter);
        assert!(matches!(result, Err(AgoraError::RecipientMismatch { .. })));
        assert_eq!(ledger.get(&escrow_id).unwrap().status, EscrowStatus::Held);
    }

    #[test]
    fn test_refund_only_from_held() {
        let ledger = EscrowLedger::new();
        let (escrow_id, agent) = held_escrow(&ledger);

        ledger.release(&escrow_id, &agent).unwrap();
        let result = ledger.refund(&escrow_id);
        assert!(matches!(result, Err(AgoraError::EscrowNotHeld { .. })));
    }

    #[test]
    fn test_refund_is_terminal() {
        let ledger = EscrowLedger::new();
        let escrow = ledger.open(TaskId::new(), BuyerId::new(), Amount::usd(100.0));

        let settlement = ledger.refund(&escrow.id).unwrap();
        assert_eq!(settlement.escrow.status, EscrowStatus::Refunded);

        let again = ledger.refund(&escrow.id);
        assert!(matches!(again, Err(AgoraError::EscrowAlreadyRefunded { .. })));
    }

    #[test]
    fn test_dispute_blocks_release_and_refund() {
        let ledger = EscrowLedger::new();
        let (escrow_id, agent) = held_escrow(&ledger);

        ledger.mark_disputed(&escrow_id).unwrap();
        assert!(matches!(
            ledger.release(&escrow_id, &agent),
            Err(AgoraError::EscrowDisputed { .. })
        ));
        assert!(matches!(
            ledger.refund(&escrow_id),
            Err(AgoraError::EscrowDisputed { .. })
        ));
    }

    #[test]
    fn test_dispute_after_release_before_external_settlement() {
        let ledger = EscrowLedger::new();
        let (escrow_id, agent) = held_escrow(&ledger);

        ledger.release(&escrow_id, &agent).unwrap();
        ledger.mark_disputed(&escrow_id).unwrap();

        // Refund resolution claws the credit back
        let settlement = ledger.resolve_refund(&escrow_id).unwrap();
        assert_eq!(settlement.escrow.status, EscrowStatus::Resolved);
        let stats = ledger.revenue(&agent);
        assert_eq!(stats.payouts, 0);
        assert!(stats.earned_in(Currency::USD).is_zero());
    }

    #[test]
    fn test_dispute_after_external_settlement_rejected() {
        let ledger = EscrowLedger::new();
        let (escrow_id, agent) = held_escrow(&ledger);

        ledger.release(&escrow_id, &agent).unwrap();
        ledger.mark_settled_externally(&escrow_id).unwrap();

        let result = ledger.mark_disputed(&escrow_id);
        assert!(matches!(result, Err(AgoraError::EscrowNotHeld { .. })));
    }

    #[test]
    fn test_resolve_release_credits_once() {
        let ledger = EscrowLedger::new();
        let (escrow_id, agent) = held_escrow(&ledger);

        ledger.mark_disputed(&escrow_id).unwrap();
        let settlement = ledger.resolve_release(&escrow_id).unwrap();
        assert_eq!(settlement.escrow.status, EscrowStatus::Resolved);
        assert_eq!(ledger.revenue(&agent).payouts, 1);

        let again = ledger.resolve_release(&escrow_id);
        assert!(matches!(again, Err(AgoraError::DisputeAlreadyResolved { .. })));
        assert_eq!(ledger.revenue(&agent).payouts, 1);
    }

    #[test]
    fn test_split_sums_to_held_amount() {
        let ledger = EscrowLedger::new();
        let (escrow_id, agent) = held_escrow(&ledger);

        ledger.mark_disputed(&escrow_id).unwrap();
        let settlement = ledger.resolve_split(&escrow_id, Amount::usd(35.0)).unwrap();

        let (_, agent_share) = settlement.to_agent.clone().unwrap();
        let (_, buyer_share) = settlement.to_buyer.clone().unwrap();
        assert_eq!(
            agent_share.checked_add(buyer_share).unwrap(),
            Amount::usd(100.0)
        );
        assert_eq!(ledger.revenue(&agent).earned_in(Currency::USD), Amount::usd(35.0));
    }

    #[test]
    fn test_split_larger_than_held_rejected() {
        let ledger = EscrowLedger::new();
        let (escrow_id, _agent) = held_escrow(&ledger);

        ledger.mark_disputed(&escrow_id).unwrap();
        let result = ledger.resolve_split(&escrow_id, Amount::usd(150.0));
        assert!(matches!(result, Err(AgoraError::InvalidSplit { .. })));
        assert_eq!(
            ledger.get(&escrow_id).unwrap().status,
            EscrowStatus::Disputed
        );
    }

    #[test]
    fn test_release_without_bound_payee_rejected() {
        let ledger = EscrowLedger::new();
        let escrow = ledger.open(TaskId::new(), BuyerId::new(), Amount::usd(100.0));

        let result = ledger.release(&escrow.id, &AgentId::new());
        assert!(matches!(result, Err(AgoraError::RecipientMismatch { .. })));
    }
}
