//! Workflow roles and their hand-off edges

use crate::error::CoordinatorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One stage of the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Deciding role; routes, previews, answers and asks for confirmation
    #[default]
    Planner,
    /// Copies named documents into the suite
    Fetcher,
    /// Extracts requirements from documents
    Extractor,
    /// Generates the test design for a testing focus
    Designer,
    /// Generates viewpoints (the checklist)
    Checklist,
    /// Generates, writes directly or edits test cases
    Writer,
}

impl Role {
    /// Every role
    pub const ALL: [Role; 6] = [
        Role::Planner,
        Role::Fetcher,
        Role::Extractor,
        Role::Designer,
        Role::Checklist,
        Role::Writer,
    ];

    /// Role name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Fetcher => "fetcher",
            Self::Extractor => "extractor",
            Self::Designer => "designer",
            Self::Checklist => "checklist",
            Self::Writer => "writer",
        }
    }

    /// Roles this role may hand off to
    #[must_use]
    pub fn handoffs(self) -> &'static [Role] {
        match self {
            Self::Planner => &[
                Role::Fetcher,
                Role::Extractor,
                Role::Designer,
                Role::Checklist,
                Role::Writer,
            ],
            Self::Fetcher => &[Role::Planner],
            Self::Extractor => &[Role::Planner, Role::Designer, Role::Checklist],
            Self::Designer => &[Role::Planner, Role::Checklist],
            Self::Checklist | Self::Writer => &[Role::Planner],
        }
    }

    /// Whether control may pass from `self` to `next`
    ///
    /// A role may always take another turn itself.
    #[inline]
    #[must_use]
    pub fn can_hand_off(self, next: Role) -> bool {
        self == next || self.handoffs().contains(&next)
    }
}

/// Check a hand-off edge
///
/// # Errors
/// Returns [`CoordinatorError::IllegalHandoff`] when `from` has no edge to `to`
pub fn validate_handoff(from: Role, to: Role) -> Result<(), CoordinatorError> {
    if from.can_hand_off(to) {
        Ok(())
    } else {
        Err(CoordinatorError::IllegalHandoff { from, to })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoordinatorError::UnknownRole(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetcher_only_returns_to_planner() {
        assert!(validate_handoff(Role::Fetcher, Role::Planner).is_ok());
        assert!(matches!(
            validate_handoff(Role::Fetcher, Role::Writer),
            Err(CoordinatorError::IllegalHandoff {
                from: Role::Fetcher,
                to: Role::Writer
            })
        ));
    }

    #[test]
    fn forward_edges() {
        assert!(Role::Extractor.can_hand_off(Role::Designer));
        assert!(Role::Designer.can_hand_off(Role::Checklist));
        assert!(!Role::Checklist.can_hand_off(Role::Writer));
        assert!(!Role::Writer.can_hand_off(Role::Extractor));
    }

    #[test]
    fn every_role_reaches_the_planner() {
        for role in Role::ALL {
            assert!(role.can_hand_off(Role::Planner), "{role}");
        }
    }

    #[test]
    fn names_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("user".parse::<Role>().is_err());
    }
}
