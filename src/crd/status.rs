//! # ManilaDriver Status

use serde::{Deserialize, Serialize};

pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManilaDriverStatus {
    /// `<Controller>Available` and `<Controller>Degraded` per controller
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation of the spec the conditions were computed for
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last time the status flipped (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Insert or update a condition
///
/// `lastTransitionTime` only moves when the status changes. Returns whether
/// anything about the condition changed.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: bool,
    reason: &str,
    message: &str,
    now: &str,
) -> bool {
    let status = if status { CONDITION_TRUE } else { CONDITION_FALSE };
    match conditions.iter_mut().find(|c| c.r#type == condition_type) {
        Some(existing) => {
            let flipped = existing.status != status;
            let changed = flipped
                || existing.reason.as_deref() != Some(reason)
                || existing.message.as_deref() != Some(message);
            if flipped {
                existing.status = status.to_string();
                existing.last_transition_time = Some(now.to_string());
            }
            existing.reason = Some(reason.to_string());
            existing.message = Some(message.to_string());
            changed
        }
        None => {
            conditions.push(Condition {
                r#type: condition_type.to_string(),
                status: status.to_string(),
                last_transition_time: Some(now.to_string()),
                reason: Some(reason.to_string()),
                message: Some(message.to_string()),
            });
            true
        }
    }
}
