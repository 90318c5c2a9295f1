use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

/// Points granted for each listing a donor publishes.
pub const DONATION_POINTS: u64 = 10;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reward {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub cost: u64,
}

pub static REWARDS: [Reward; 8] = [
    Reward {
        id: "1",
        title: "Bronze Donor Badge",
        description: "Earn this badge for your first successful donation",
        cost: 100,
    },
    Reward {
        id: "2",
        title: "Silver Donor Badge",
        description: "Achieve this badge after 5 successful donations",
        cost: 500,
    },
    Reward {
        id: "3",
        title: "Gold Donor Badge",
        description: "Earn this prestigious badge after 10 successful donations",
        cost: 1000,
    },
    Reward {
        id: "4",
        title: "Community Champion",
        description: "Special recognition for consistent community contribution",
        cost: 2000,
    },
    Reward {
        id: "5",
        title: "₹500 Shopping Voucher",
        description: "Redeem at major retail stores",
        cost: 1500,
    },
    Reward {
        id: "6",
        title: "Restaurant Dining Coupon",
        description: "30% off at selected restaurants in your city",
        cost: 800,
    },
    Reward {
        id: "7",
        title: "Movie Tickets",
        description: "Two free movie tickets",
        cost: 1200,
    },
    Reward {
        id: "8",
        title: "₹200 Food Delivery Coupon",
        description: "Valid on food delivery orders above ₹500",
        cost: 600,
    },
];

pub fn find_reward(id: &str) -> Option<&'static Reward> {
    REWARDS.iter().find(|r| r.id == id)
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub points: u64,
    pub successful_donations: u64,
    pub badges_earned: u64,
}

impl Progress {
    pub fn from_points(points: u64) -> Self {
        Self {
            points,
            successful_donations: points / 10,
            badges_earned: points / 50,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("insufficient points: {cost} needed, {balance} available")]
pub struct InsufficientPoints {
    pub cost: u64,
    pub balance: u64,
}

/// Per-user balances, held in memory only. A restart resets every balance
/// to zero.
#[derive(Clone, Default)]
pub struct PointsLedger {
    balances: Arc<RwLock<HashMap<String, u64>>>,
}

impl PointsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn balance(&self, user_id: &str) -> u64 {
        self.balances.read().await.get(user_id).copied().unwrap_or(0)
    }

    pub async fn award(&self, user_id: &str, amount: u64) -> u64 {
        let mut balances = self.balances.write().await;
        let entry = balances.entry(user_id.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
        *entry
    }

    /// Checks and deducts under one lock so concurrent redemptions cannot
    /// overdraw the balance.
    pub async fn redeem(&self, user_id: &str, reward: &Reward) -> Result<u64, InsufficientPoints> {
        let mut balances = self.balances.write().await;
        let entry = balances.entry(user_id.to_string()).or_insert(0);
        if *entry < reward.cost {
            return Err(InsufficientPoints { cost: reward.cost, balance: *entry });
        }
        *entry -= reward.cost;
        tracing::info!(user_id, reward = reward.id, remaining = *entry, "reward redeemed");
        Ok(*entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn redeem_can_drain_to_exactly_zero() {
        let ledger = PointsLedger::new();
        let bronze = find_reward("1").expect("bronze badge");
        assert_eq!(ledger.balance("nobody").await, 0);
        assert_eq!(ledger.award("u1", 100).await, 100);
        assert_eq!(ledger.redeem("u1", bronze).await, Ok(0));
        assert_eq!(
            ledger.redeem("u1", bronze).await,
            Err(InsufficientPoints { cost: 100, balance: 0 })
        );
        assert_eq!(ledger.balance("u1").await, 0);
    }

    #[tokio::test]
    async fn redeem_requires_full_cost() {
        let ledger = PointsLedger::new();
        let bronze = find_reward("1").expect("bronze badge");
        ledger.award("u1", 90).await;
        assert_eq!(
            ledger.redeem("u1", bronze).await,
            Err(InsufficientPoints { cost: 100, balance: 90 })
        );
        assert_eq!(ledger.balance("u1").await, 90);

        ledger.award("u1", 20).await;
        assert_eq!(ledger.redeem("u1", bronze).await, Ok(10));
    }

    #[tokio::test]
    async fn balances_are_per_user() {
        let ledger = PointsLedger::new();
        ledger.award("a", DONATION_POINTS).await;
        ledger.award("a", DONATION_POINTS).await;
        ledger.award("b", DONATION_POINTS).await;
        assert_eq!(ledger.balance("a").await, 20);
        assert_eq!(ledger.balance("b").await, 10);
    }

    #[test]
    fn progress_uses_integer_division() {
        assert_eq!(
            Progress::from_points(120),
            Progress { points: 120, successful_donations: 12, badges_earned: 2 }
        );
        assert!(find_reward("9").is_none());
    }
}
