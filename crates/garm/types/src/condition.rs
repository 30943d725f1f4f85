//! Condition ledger attached to every reconciled resource
//!
//! A ledger holds at most one [`Condition`] per [`ConditionType`], keeps
//! `Ready` first, and only moves `last_transition_time` when the status,
//! reason or message of a condition actually changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aspect of reconciliation health a condition describes
///
/// Variant order is the ledger order; `Ready` must stay first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConditionType {
    Ready,
    ScopeReference,
    ImageReference,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready"),
            Self::ScopeReference => write!(f, "ScopeReference"),
            Self::ImageReference => write!(f, "ImageReference"),
        }
    }
}

/// Tri-state condition status following Kubernetes conventions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Machine-readable reason codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionReason {
    ReconcileSuccess,
    ReconcileError,
    #[serde(rename = "GarmAPIError")]
    GarmApiError,
    ScopeRefNotReady,
    FetchingScopeRefSuccess,
    FetchingScopeRefFailed,
    FetchingImageRefSuccess,
    FetchingImageRefFailed,
    Deleting,
    DeletionFailed,
}

impl fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::ReconcileSuccess => "ReconcileSuccess",
            Self::ReconcileError => "ReconcileError",
            Self::GarmApiError => "GarmAPIError",
            Self::ScopeRefNotReady => "ScopeRefNotReady",
            Self::FetchingScopeRefSuccess => "FetchingScopeRefSuccess",
            Self::FetchingScopeRefFailed => "FetchingScopeRefFailed",
            Self::FetchingImageRefSuccess => "FetchingImageRefSuccess",
            Self::FetchingImageRefFailed => "FetchingImageRefFailed",
            Self::Deleting => "Deleting",
            Self::DeletionFailed => "DeletionFailed",
        };
        f.write_str(reason)
    }
}

/// One typed status entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,

    pub status: ConditionStatus,

    pub reason: ConditionReason,

    #[serde(default)]
    pub message: String,

    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        type_: ConditionType,
        status: ConditionStatus,
        reason: ConditionReason,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_,
            status,
            reason,
            message: message.into(),
            last_transition_time: now,
        }
    }

    fn same_state(&self, other: &Condition) -> bool {
        self.status == other.status && self.reason == other.reason && self.message == other.message
    }
}

/// Ordered, deduplicated set of conditions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    pub fn is_true(&self, type_: ConditionType) -> bool {
        self.get(type_)
            .map_or(false, |c| c.status == ConditionStatus::True)
    }

    pub fn is_ready(&self) -> bool {
        self.is_true(ConditionType::Ready)
    }

    /// Set a condition using the current time
    ///
    /// Returns `true` if the ledger changed.
    pub fn set(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: ConditionReason,
        message: impl Into<String>,
    ) -> bool {
        self.set_at(type_, status, reason, message, Utc::now())
    }

    /// Set a condition, stamping `now` only if its state actually changed
    pub fn set_at(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: ConditionReason,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let incoming = Condition::new(type_, status, reason, message, now);

        match self.0.iter_mut().find(|c| c.type_ == type_) {
            Some(existing) if existing.same_state(&incoming) => false,
            Some(existing) => {
                *existing = incoming;
                true
            }
            None => {
                self.0.push(incoming);
                self.0.sort_by_key(|c| c.type_);
                true
            }
        }
    }

    pub fn mark_true(
        &mut self,
        type_: ConditionType,
        reason: ConditionReason,
        message: impl Into<String>,
    ) -> bool {
        self.set(type_, ConditionStatus::True, reason, message)
    }

    pub fn mark_false(
        &mut self,
        type_: ConditionType,
        reason: ConditionReason,
        message: impl Into<String>,
    ) -> bool {
        self.set(type_, ConditionStatus::False, reason, message)
    }

    pub fn remove(&mut self, type_: ConditionType) -> Option<Condition> {
        let pos = self.0.iter().position(|c| c.type_ == type_)?;
        Some(self.0.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Condition>> for Conditions {
    /// Later entries win when a type appears more than once
    fn from(conditions: Vec<Condition>) -> Self {
        let mut deduped: Vec<Condition> = Vec::with_capacity(conditions.len());
        for condition in conditions {
            match deduped.iter_mut().find(|c| c.type_ == condition.type_) {
                Some(existing) => *existing = condition,
                None => deduped.push(condition),
            }
        }
        deduped.sort_by_key(|c| c.type_);
        Self(deduped)
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(conditions: Conditions) -> Self {
        conditions.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_reaffirming_keeps_transition_time() {
        let mut ledger = Conditions::new();
        assert!(ledger.set_at(
            ConditionType::Ready,
            ConditionStatus::True,
            ConditionReason::ReconcileSuccess,
            "",
            t0(),
        ));
        assert!(!ledger.set_at(
            ConditionType::Ready,
            ConditionStatus::True,
            ConditionReason::ReconcileSuccess,
            "",
            t0() + Duration::minutes(5),
        ));

        let ready = ledger.get(ConditionType::Ready).unwrap();
        assert_eq!(ready.last_transition_time, t0());
    }

    #[test]
    fn test_message_change_moves_transition_time() {
        let mut ledger = Conditions::new();
        ledger.set_at(
            ConditionType::Ready,
            ConditionStatus::False,
            ConditionReason::GarmApiError,
            "connection refused",
            t0(),
        );
        let later = t0() + Duration::seconds(30);
        assert!(ledger.set_at(
            ConditionType::Ready,
            ConditionStatus::False,
            ConditionReason::GarmApiError,
            "503 service unavailable",
            later,
        ));
        assert_eq!(
            ledger.get(ConditionType::Ready).unwrap().last_transition_time,
            later
        );
    }

    #[test]
    fn test_ready_sorted_first_and_unique() {
        let mut ledger = Conditions::new();
        ledger.mark_true(
            ConditionType::ImageReference,
            ConditionReason::FetchingImageRefSuccess,
            "",
        );
        ledger.mark_true(
            ConditionType::ScopeReference,
            ConditionReason::FetchingScopeRefSuccess,
            "",
        );
        ledger.mark_false(ConditionType::Ready, ConditionReason::ScopeRefNotReady, "");
        ledger.mark_true(ConditionType::Ready, ConditionReason::ReconcileSuccess, "");

        let types: Vec<_> = ledger.iter().map(|c| c.type_).collect();
        assert_eq!(
            types,
            vec![
                ConditionType::Ready,
                ConditionType::ScopeReference,
                ConditionType::ImageReference
            ]
        );
        assert!(ledger.is_ready());
    }

    #[test]
    fn test_deserialize_dedupes_and_sorts() {
        let json = serde_json::json!([
            {"type": "ImageReference", "status": "True", "reason": "FetchingImageRefSuccess", "message": "", "lastTransitionTime": "2024-05-01T10:00:00Z"},
            {"type": "Ready", "status": "False", "reason": "GarmAPIError", "message": "old", "lastTransitionTime": "2024-05-01T10:00:00Z"},
            {"type": "Ready", "status": "True", "reason": "ReconcileSuccess", "message": "", "lastTransitionTime": "2024-05-01T10:01:00Z"}
        ]);
        let ledger: Conditions = serde_json::from_value(json).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.iter().next().unwrap().type_, ConditionType::Ready);
        assert!(ledger.is_ready());
    }

    #[test]
    fn test_reason_wire_name() {
        let json = serde_json::to_value(ConditionReason::GarmApiError).unwrap();
        assert_eq!(json, serde_json::json!("GarmAPIError"));
        assert_eq!(ConditionReason::GarmApiError.to_string(), "GarmAPIError");
    }
}
