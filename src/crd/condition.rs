//! # Conditions
//!
//! Status conditions shared by every resource kind, and the upsert-by-type
//! store used to maintain them.
//!
//! A condition list holds at most one entry per `type`. Entries are never
//! removed; a condition can only be reasserted with a new status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle condition types seeded and maintained by the reconcile engine
pub const PROGRESSING: &str = "Progressing";
pub const AVAILABLE: &str = "Available";
pub const DEGRADED: &str = "Degraded";
pub const UPGRADEABLE: &str = "Upgradeable";

/// Status value of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Condition represents one observed fact about a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, unique within a status
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Machine or human readable reason for the last transition
    #[serde(default)]
    pub reason: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Last time the status value changed (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn new(
        r#type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            r#type: r#type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Upsert a condition keyed by its type
///
/// An existing entry is overwritten in place, keeping its list position.
/// The transition time only moves when the status value changes.
/// Returns true when the list changed.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    let now = chrono::Utc::now().to_rfc3339();
    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.r#type == condition.r#type)
    {
        if existing.status == condition.status
            && existing.reason == condition.reason
            && existing.message == condition.message
        {
            return false;
        }
        condition.last_transition_time = if existing.status == condition.status {
            existing.last_transition_time.take()
        } else {
            Some(now)
        };
        *existing = condition;
        return true;
    }

    condition.last_transition_time = Some(now);
    conditions.push(condition);
    true
}

/// Check whether a condition of the given type is present, whatever its status
pub fn has_condition(conditions: &[Condition], r#type: &str) -> bool {
    conditions.iter().any(|c| c.r#type == r#type)
}

pub fn find_condition<'a>(conditions: &'a [Condition], r#type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}

/// Access to the condition list of a resource's status
///
/// Implemented by every kind the reconcile engine drives.
pub trait Conditioned {
    fn conditions(&self) -> &[Condition];
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    fn set_condition(&mut self, condition: Condition) -> bool {
        set_condition(self.conditions_mut(), condition)
    }

    fn has_condition(&self, r#type: &str) -> bool {
        has_condition(self.conditions(), r#type)
    }
}

/// Implement [`Conditioned`] for a kind whose `status` is an `Option<Status>`
/// with a `conditions: Vec<Condition>` field
macro_rules! impl_conditioned {
    ($kind:ty) => {
        impl $crate::crd::condition::Conditioned for $kind {
            fn conditions(&self) -> &[$crate::crd::condition::Condition] {
                self.status
                    .as_ref()
                    .map(|s| s.conditions.as_slice())
                    .unwrap_or_default()
            }

            fn conditions_mut(&mut self) -> &mut Vec<$crate::crd::condition::Condition> {
                &mut self.status.get_or_insert_with(Default::default).conditions
            }
        }
    };
}

pub(crate) use impl_conditioned;
