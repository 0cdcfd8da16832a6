//! Customer records and the loyalty accrual transition.

use crate::phone::PhoneNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistent loyalty record, one per normalized phone number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Sequential id assigned on first sighting
    pub id: u64,

    /// Natural key
    pub phone: PhoneNumber,

    /// Most recently submitted name
    pub name: String,

    /// Most recently submitted email
    pub email: String,

    /// Points toward the next reward, always below the reward threshold at rest
    pub current_points: u32,

    pub total_visits: u64,

    pub total_rewards: u64,

    pub created_at: DateTime<Utc>,

    pub last_visit_at: Option<DateTime<Utc>>,
}

impl Customer {
    /// Create a record for a previously unseen phone number with zeroed counters.
    pub fn new(
        id: u64,
        phone: PhoneNumber,
        name: String,
        email: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            phone,
            name,
            email,
            current_points: 0,
            total_visits: 0,
            total_rewards: 0,
            created_at: now,
            last_visit_at: None,
        }
    }

    /// Apply one successful check-in.
    ///
    /// Overwrites the contact details, counts the visit and awards one point.
    /// Crossing `reward_threshold` grants a reward and subtracts the threshold
    /// from the point balance. Returns whether a reward was earned.
    pub fn record_visit(
        &mut self,
        name: &str,
        email: &str,
        reward_threshold: u32,
        now: DateTime<Utc>,
    ) -> bool {
        self.name = name.to_string();
        self.email = email.to_string();
        self.last_visit_at = Some(now);

        self.total_visits += 1;
        self.current_points += 1;

        if self.current_points >= reward_threshold {
            self.total_rewards += 1;
            self.current_points -= reward_threshold;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> CustomerSnapshot {
        CustomerSnapshot {
            id: self.id,
            name: self.name.clone(),
            current_points: self.current_points,
            total_visits: self.total_visits,
            total_rewards: self.total_rewards,
        }
    }
}

/// Customer fields exposed to the check-in form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSnapshot {
    pub id: u64,
    pub name: String,
    pub current_points: u32,
    pub total_visits: u64,
    pub total_rewards: u64,
}

/// Outcome of one accrual transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualResult {
    pub customer: CustomerSnapshot,
    pub earned_reward: bool,
    pub points_to_next_reward: u32,
}

impl AccrualResult {
    pub fn new(customer: &Customer, earned_reward: bool, reward_threshold: u32) -> Self {
        Self {
            customer: customer.snapshot(),
            earned_reward,
            points_to_next_reward: reward_threshold.saturating_sub(customer.current_points),
        }
    }
}
