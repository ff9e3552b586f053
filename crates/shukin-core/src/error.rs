//! Errors raised by the event commands.
//!
//! - [`MissingField`] and [`InvalidField`] reject input before anything changes.
//! - [`LimitExceeded`] is the plan gate refusing a creation.
//! - [`NotFound`] names the kind and id that was looked up.
//! - [`Storage`] wraps a failed write; in-memory state is left as it was.
//!
//! [`MissingField`]: ShukinError::MissingField
//! [`InvalidField`]: ShukinError::InvalidField
//! [`LimitExceeded`]: ShukinError::LimitExceeded
//! [`NotFound`]: ShukinError::NotFound
//! [`Storage`]: ShukinError::Storage
use thiserror::Error;

use crate::plan::{LimitKind, Plan};

#[derive(Error, Debug)]
pub enum ShukinError {
    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("the {plan} plan allows at most {max} {kind}s; upgrade to premium to add more")]
    LimitExceeded {
        kind: LimitKind,
        plan: Plan,
        max: usize,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ShukinError {
    pub fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingField { .. } | Self::InvalidField { .. })
    }
}

pub type ShukinResult<T> = Result<T, ShukinError>;
