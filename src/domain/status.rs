//! Validation status: the canonical status domain and the rollup rule
//! applied at tab → page and page → session scope.

use serde::{Deserialize, Serialize};

/// Validation status of a parameter, tab, page, or session.
///
/// Variant order is ascending severity and is used for tie-breaking;
/// `rollup` relies on it only through the explicit precedence rule below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    None,
    Manual,
    Passed,
    InProgress,
    Warning,
    Failed,
}

impl ValidationStatus {
    /// Whether this status is terminal for a parameter. `InProgress` is the
    /// only non-terminal state; it is set exactly once at dispatch and
    /// replaced exactly once on completion.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ValidationStatus::InProgress)
    }

    /// Compute a parent node's status from its children's statuses.
    ///
    /// Precedence: any `Failed` wins; else any `Warning` or `InProgress`
    /// yields `Warning`; else any `Passed` yields `Passed`; else `None`.
    ///
    /// An `InProgress` child at parent-evaluation time is treated as a risk
    /// signal rather than "still running": aggregation only runs after the
    /// local counter reaches zero, so `InProgress` there means something
    /// never reached a terminal state for that child.
    pub fn rollup<I>(children: I) -> ValidationStatus
    where
        I: IntoIterator<Item = ValidationStatus>,
    {
        let mut any_warning = false;
        let mut any_passed = false;
        for child in children {
            match child {
                ValidationStatus::Failed => return ValidationStatus::Failed,
                ValidationStatus::Warning | ValidationStatus::InProgress => any_warning = true,
                ValidationStatus::Passed => any_passed = true,
                ValidationStatus::None | ValidationStatus::Manual => {}
            }
        }
        if any_warning {
            ValidationStatus::Warning
        } else if any_passed {
            ValidationStatus::Passed
        } else {
            ValidationStatus::None
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValidationStatus::None => "NONE",
            ValidationStatus::Manual => "MANUAL",
            ValidationStatus::Passed => "PASSED",
            ValidationStatus::InProgress => "IN_PROGRESS",
            ValidationStatus::Warning => "WARNING",
            ValidationStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}
