#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::domain::DeviceId;

/// What a resolution action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActionVerb {
    Charge,
    Discharge,
    Sell,
    Buy,
    SetOutput,
    Activate,
    Deactivate,
    Reduce,
}

/// The resource an action touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum ActionTarget {
    Battery,
    GridContract,
    Generation(DeviceId),
    Load(DeviceId),
}

/// A single proposed-or-executed unit of dispatch work.
///
/// Doubles as the audit record and, in semi-automatic operation, as the
/// pending-approval record handed to collaborators; the serialized shape is
/// the boundary contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionAction {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub target: ActionTarget,
    pub verb: ActionVerb,
    pub requested_kw: f64,
    pub applied_kw: f64,
    pub succeeded: bool,
    pub detail: Option<String>,
}

impl ResolutionAction {
    pub fn executed(target: ActionTarget, verb: ActionVerb, requested_kw: f64, applied_kw: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            at: Utc::now(),
            target,
            verb,
            requested_kw,
            applied_kw,
            succeeded: applied_kw > 0.0,
            detail: None,
        }
    }

    pub fn failed(target: ActionTarget, verb: ActionVerb, requested_kw: f64, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            at: Utc::now(),
            target,
            verb,
            requested_kw,
            applied_kw: 0.0,
            succeeded: false,
            detail: Some(reason.into()),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Bounded in-memory record of recent dispatch actions.
///
/// Persistence of decision history is a collaborator's job; this buffer only
/// backs operator inspection and the tick result.
#[derive(Debug)]
pub struct ActionJournal {
    entries: VecDeque<ResolutionAction>,
    max_entries: usize,
}

impl ActionJournal {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn record(&mut self, action: ResolutionAction) {
        if self.entries.len() == self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(action);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent actions, newest last.
    pub fn recent(&self, count: usize) -> Vec<ResolutionAction> {
        self.entries
            .iter()
            .rev()
            .take(count)
            .rev()
            .cloned()
            .collect()
    }

    /// Serialize the journal for handoff across the approval boundary.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.entries.iter().collect::<Vec<_>>())
    }
}

impl Default for ActionJournal {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charge_action(kw: f64) -> ResolutionAction {
        ResolutionAction::executed(ActionTarget::Battery, ActionVerb::Charge, kw, kw)
    }

    #[test]
    fn journal_caps_its_length() {
        let mut journal = ActionJournal::new(3);
        for i in 0..5 {
            journal.record(charge_action(i as f64));
        }
        assert_eq!(journal.len(), 3);
        let recent = journal.recent(10);
        assert_eq!(recent.first().unwrap().requested_kw, 2.0);
        assert_eq!(recent.last().unwrap().requested_kw, 4.0);
    }

    #[test]
    fn failed_action_carries_reason_and_zero_applied() {
        let action = ResolutionAction::failed(
            ActionTarget::GridContract,
            ActionVerb::Sell,
            25.0,
            "sales limit reached",
        );
        assert!(!action.succeeded);
        assert_eq!(action.applied_kw, 0.0);
        assert_eq!(action.detail.as_deref(), Some("sales limit reached"));
    }

    #[test]
    fn serialized_shape_preserves_boundary_fields() {
        let mut journal = ActionJournal::default();
        journal.record(charge_action(12.5));
        let json = journal.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let entry = &value[0];
        for field in ["id", "at", "target", "verb", "requested_kw", "applied_kw", "succeeded"] {
            assert!(entry.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(entry["verb"], "charge");
        assert_eq!(entry["target"]["kind"], "battery");
    }
}
