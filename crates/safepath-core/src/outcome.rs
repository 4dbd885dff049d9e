//! Three-way result for operations that fall back instead of failing.

use crate::error::SafetyError;

/// Good data, best-effort data, or no data.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    Degraded { value: T, reason: SafetyError },
    Failed(SafetyError),
}

impl<T> Outcome<T> {
    pub fn degraded(value: T, reason: SafetyError) -> Self {
        Outcome::Degraded { value, reason }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Ok(value) | Outcome::Degraded { value, .. } => Some(value),
            Outcome::Failed(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Ok(value) | Outcome::Degraded { value, .. } => Some(value),
            Outcome::Failed(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&SafetyError> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Degraded { reason, .. } | Outcome::Failed(reason) => Some(reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Outcome::Ok(value) => Outcome::Ok(f(value)),
            Outcome::Degraded { value, reason } => Outcome::Degraded {
                value: f(value),
                reason,
            },
            Outcome::Failed(reason) => Outcome::Failed(reason),
        }
    }
}
