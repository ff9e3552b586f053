use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Premium,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Free => f.write_str("free"),
            Plan::Premium => f.write_str("premium"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Events,
    Participants,
    ExpenseItems,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::Events => f.write_str("event"),
            LimitKind::Participants => f.write_str("participant"),
            LimitKind::ExpenseItems => f.write_str("expense item"),
        }
    }
}

/// Caps per plan; `None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub max_events: Option<usize>,
    pub max_participants: Option<usize>,
    pub max_expense_items: Option<usize>,
}

pub const FREE_LIMITS: PlanLimits = PlanLimits {
    max_events: Some(3),
    max_participants: Some(10),
    max_expense_items: Some(10),
};

pub const PREMIUM_LIMITS: PlanLimits = PlanLimits {
    max_events: None,
    max_participants: None,
    max_expense_items: None,
};

impl PlanLimits {
    pub fn for_plan(plan: Plan) -> Self {
        match plan {
            Plan::Free => FREE_LIMITS,
            Plan::Premium => PREMIUM_LIMITS,
        }
    }

    pub fn cap(&self, kind: LimitKind) -> Option<usize> {
        match kind {
            LimitKind::Events => self.max_events,
            LimitKind::Participants => self.max_participants,
            LimitKind::ExpenseItems => self.max_expense_items,
        }
    }

    pub fn allows(&self, kind: LimitKind, current_count: usize) -> bool {
        self.cap(kind).is_none_or(|max| current_count < max)
    }

    pub fn can_create_event(&self, current_count: usize) -> bool {
        self.allows(LimitKind::Events, current_count)
    }

    pub fn can_add_participant(&self, current_count: usize) -> bool {
        self.allows(LimitKind::Participants, current_count)
    }

    pub fn can_add_expense_item(&self, current_count: usize) -> bool {
        self.allows(LimitKind::ExpenseItems, current_count)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionState {
    pub plan: Plan,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
}

impl SubscriptionState {
    pub fn free() -> Self {
        Self::default()
    }

    pub fn premium(expiry_date: Option<DateTime<Utc>>) -> Self {
        Self {
            plan: Plan::Premium,
            expiry_date,
        }
    }

    pub fn is_premium(&self) -> bool {
        self.plan == Plan::Premium
    }

    pub fn limits(&self) -> PlanLimits {
        PlanLimits::for_plan(self.plan)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_premium() && self.expiry_date.is_some_and(|expiry| expiry < now)
    }

    /// Premium past its expiry falls back to free.
    pub fn effective(self, now: DateTime<Utc>) -> Self {
        if self.is_expired(now) {
            Self::free()
        } else {
            self
        }
    }
}
