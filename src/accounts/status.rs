//! Account status state machine and aging classification
//!
//! Statuses follow a fixed transition table. Closed is terminal; disputed
//! accounts can only return to in_contact or be closed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Collection lifecycle status of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    New,
    Assigned,
    InContact,
    Negotiating,
    PaymentPlan,
    Settled,
    Closed,
    Disputed,
}

impl AccountStatus {
    /// Convert to database string representation
    pub fn to_db_status(&self) -> &'static str {
        match self {
            AccountStatus::New => "new",
            AccountStatus::Assigned => "assigned",
            AccountStatus::InContact => "in_contact",
            AccountStatus::Negotiating => "negotiating",
            AccountStatus::PaymentPlan => "payment_plan",
            AccountStatus::Settled => "settled",
            AccountStatus::Closed => "closed",
            AccountStatus::Disputed => "disputed",
        }
    }

    /// Parse from database string representation
    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "new" => Some(AccountStatus::New),
            "assigned" => Some(AccountStatus::Assigned),
            "in_contact" => Some(AccountStatus::InContact),
            "negotiating" => Some(AccountStatus::Negotiating),
            "payment_plan" => Some(AccountStatus::PaymentPlan),
            "settled" => Some(AccountStatus::Settled),
            "closed" => Some(AccountStatus::Closed),
            "disputed" => Some(AccountStatus::Disputed),
            _ => None,
        }
    }

    /// Statuses this status may transition to
    pub fn allowed_transitions(&self) -> &'static [AccountStatus] {
        match self {
            AccountStatus::New => &[AccountStatus::Assigned, AccountStatus::Closed],
            AccountStatus::Assigned => &[
                AccountStatus::InContact,
                AccountStatus::Closed,
                AccountStatus::Disputed,
            ],
            AccountStatus::InContact => &[
                AccountStatus::Negotiating,
                AccountStatus::Closed,
                AccountStatus::Disputed,
            ],
            AccountStatus::Negotiating => &[
                AccountStatus::PaymentPlan,
                AccountStatus::Settled,
                AccountStatus::Closed,
                AccountStatus::Disputed,
            ],
            AccountStatus::PaymentPlan => &[
                AccountStatus::Settled,
                AccountStatus::Closed,
                AccountStatus::Disputed,
            ],
            AccountStatus::Settled => &[AccountStatus::Closed],
            AccountStatus::Closed => &[],
            AccountStatus::Disputed => &[AccountStatus::InContact, AccountStatus::Closed],
        }
    }

    pub fn can_transition_to(&self, next: AccountStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_status())
    }
}

/// Delinquency age bucket, classified by days past due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgingBucket {
    Days0To30,
    Days31To60,
    Days61To90,
    Over90,
}

impl AgingBucket {
    pub fn from_days_past_due(days: i64) -> Self {
        match days {
            ..=30 => AgingBucket::Days0To30,
            31..=60 => AgingBucket::Days31To60,
            61..=90 => AgingBucket::Days61To90,
            _ => AgingBucket::Over90,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgingBucket::Days0To30 => "0-30 days",
            AgingBucket::Days31To60 => "31-60 days",
            AgingBucket::Days61To90 => "61-90 days",
            AgingBucket::Over90 => "90+ days",
        }
    }
}

impl fmt::Display for AgingBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_transitions() {
        assert!(AccountStatus::New.can_transition_to(AccountStatus::Assigned));
        assert!(AccountStatus::New.can_transition_to(AccountStatus::Closed));
        assert!(!AccountStatus::New.can_transition_to(AccountStatus::Settled));
        assert!(!AccountStatus::New.can_transition_to(AccountStatus::InContact));
    }

    #[test]
    fn test_closed_is_terminal() {
        assert!(AccountStatus::Closed.is_terminal());
        assert!(AccountStatus::Closed.allowed_transitions().is_empty());
        assert!(!AccountStatus::Closed.can_transition_to(AccountStatus::New));
    }

    #[test]
    fn test_disputed_can_return_to_contact() {
        assert!(AccountStatus::Disputed.can_transition_to(AccountStatus::InContact));
        assert!(AccountStatus::Disputed.can_transition_to(AccountStatus::Closed));
        assert!(!AccountStatus::Disputed.can_transition_to(AccountStatus::Negotiating));
    }

    #[test]
    fn test_settled_only_closes() {
        assert_eq!(
            AccountStatus::Settled.allowed_transitions(),
            &[AccountStatus::Closed]
        );
    }

    #[test]
    fn test_no_self_transitions() {
        let all = [
            AccountStatus::New,
            AccountStatus::Assigned,
            AccountStatus::InContact,
            AccountStatus::Negotiating,
            AccountStatus::PaymentPlan,
            AccountStatus::Settled,
            AccountStatus::Closed,
            AccountStatus::Disputed,
        ];
        for status in all {
            assert!(
                !status.can_transition_to(status),
                "{} should not transition to itself",
                status
            );
        }
    }

    #[test]
    fn test_db_status_round_trip() {
        let all = [
            AccountStatus::New,
            AccountStatus::Assigned,
            AccountStatus::InContact,
            AccountStatus::Negotiating,
            AccountStatus::PaymentPlan,
            AccountStatus::Settled,
            AccountStatus::Closed,
            AccountStatus::Disputed,
        ];
        for status in all {
            assert_eq!(AccountStatus::from_db_status(status.to_db_status()), Some(status));
        }
        assert_eq!(AccountStatus::from_db_status("bogus"), None);
    }

    #[test]
    fn test_aging_bucket_boundaries() {
        assert_eq!(AgingBucket::from_days_past_due(0), AgingBucket::Days0To30);
        assert_eq!(AgingBucket::from_days_past_due(30), AgingBucket::Days0To30);
        assert_eq!(AgingBucket::from_days_past_due(31), AgingBucket::Days31To60);
        assert_eq!(AgingBucket::from_days_past_due(60), AgingBucket::Days31To60);
        assert_eq!(AgingBucket::from_days_past_due(61), AgingBucket::Days61To90);
        assert_eq!(AgingBucket::from_days_past_due(90), AgingBucket::Days61To90);
        assert_eq!(AgingBucket::from_days_past_due(91), AgingBucket::Over90);
        assert_eq!(AgingBucket::from_days_past_due(365), AgingBucket::Over90);
    }

    #[test]
    fn test_aging_bucket_labels() {
        assert_eq!(AgingBucket::Days0To30.label(), "0-30 days");
        assert_eq!(AgingBucket::Over90.to_string(), "90+ days");
    }
}
