//! Requisition status lifecycle.
//!
//! ```text
//! pending ──► scheduled ──► completed
//!    │            │  ▲
//!    │            │  └──────────┐
//!    │            ├──► resolicited
//!    ▼            ▼             │
//! canceled ◄──────┴─────────────┘
//! ```
//!
//! Transitions are planned here as pure functions that either reject the move or return the
//! history entry to append. The history itself is append-only.

use crate::constants::MAX_NOTE_CHARS;
use crate::error::{CoreError, CoreResult, FieldError};
use chrono::{DateTime, NaiveDate, Utc};
use reqtrack_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequisitionStatus {
    Pending,
    Scheduled,
    Completed,
    Canceled,
    Resolicited,
}

impl RequisitionStatus {
    pub const ALL: [RequisitionStatus; 5] = [
        RequisitionStatus::Pending,
        RequisitionStatus::Scheduled,
        RequisitionStatus::Completed,
        RequisitionStatus::Canceled,
        RequisitionStatus::Resolicited,
    ];

    pub fn allowed_targets(&self) -> &'static [RequisitionStatus] {
        use RequisitionStatus::*;
        match self {
            Pending => &[Scheduled, Canceled],
            Scheduled => &[Completed, Canceled, Resolicited],
            Resolicited => &[Scheduled, Canceled],
            Completed | Canceled => &[],
        }
    }

    pub fn can_transition_to(&self, target: RequisitionStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_targets().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequisitionStatus::Pending => "pending",
            RequisitionStatus::Scheduled => "scheduled",
            RequisitionStatus::Completed => "completed",
            RequisitionStatus::Canceled => "canceled",
            RequisitionStatus::Resolicited => "resolicited",
        }
    }
}

impl fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequisitionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        RequisitionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| CoreError::field("status", format!("unknown status '{}'", s)))
    }
}

/// Where and when a scheduled procedure will happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Schedule(Schedule),
    Complete { note: Option<String> },
    Cancel { reason: String },
    Resolicit { reason: String },
}

impl Transition {
    pub fn target(&self) -> RequisitionStatus {
        match self {
            Transition::Schedule(_) => RequisitionStatus::Scheduled,
            Transition::Complete { .. } => RequisitionStatus::Completed,
            Transition::Cancel { .. } => RequisitionStatus::Canceled,
            Transition::Resolicit { .. } => RequisitionStatus::Resolicited,
        }
    }
}

/// One entry of a requisition's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// `None` only for the entry recording creation.
    pub from: Option<RequisitionStatus>,
    pub to: RequisitionStatus,
    pub at: DateTime<Utc>,
    pub by: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl HistoryEntry {
    pub fn created(by: RecordId, at: DateTime<Utc>) -> Self {
        Self {
            from: None,
            to: RequisitionStatus::Pending,
            at,
            by,
            note: None,
        }
    }
}

/// Checks `transition` against the current status and builds the history entry for it.
///
/// `created_on` is the requisition's creation date; a schedule cannot predate it.
pub fn plan(
    current: RequisitionStatus,
    transition: &Transition,
    created_on: NaiveDate,
    by: RecordId,
    at: DateTime<Utc>,
) -> CoreResult<HistoryEntry> {
    let target = transition.target();
    if !current.can_transition_to(target) {
        return Err(CoreError::InvalidTransition {
            from: current,
            to: target,
        });
    }

    let note = match transition {
        Transition::Schedule(schedule) => {
            if schedule.date < created_on {
                return Err(CoreError::field(
                    "date",
                    "cannot be earlier than the requisition's creation date",
                ));
            }
            let mut summary = format!("scheduled for {}", schedule.date);
            if let Some(location) = &schedule.location {
                summary.push_str(&format!(" at {}", location));
            }
            Some(summary)
        }
        Transition::Complete { note } => bounded(note.as_deref())?,
        Transition::Cancel { reason } | Transition::Resolicit { reason } => {
            let reason = bounded(Some(reason))?
                .ok_or_else(|| CoreError::field("reason", "is required"))?;
            Some(reason)
        }
    };

    Ok(HistoryEntry {
        from: Some(current),
        to: target,
        at,
        by,
        note,
    })
}

fn bounded(note: Option<&str>) -> CoreResult<Option<String>> {
    let note = note.map(str::trim).filter(|n| !n.is_empty());
    match note {
        Some(n) if n.chars().count() > MAX_NOTE_CHARS => Err(CoreError::Validation(vec![
            FieldError::new("note", format!("must be at most {} characters", MAX_NOTE_CHARS)),
        ])),
        other => Ok(other.map(str::to_string)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequisitionStatus::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule_on(date: NaiveDate) -> Transition {
        Transition::Schedule(Schedule {
            date,
            location: Some("Policlínica Norte".into()),
            notes: None,
        })
    }

    #[test]
    fn transition_table() {
        assert_eq!(Pending.allowed_targets(), &[Scheduled, Canceled]);
        assert_eq!(Scheduled.allowed_targets(), &[Completed, Canceled, Resolicited]);
        assert_eq!(Resolicited.allowed_targets(), &[Scheduled, Canceled]);
        assert!(Completed.is_terminal());
        assert!(Canceled.is_terminal());
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn scheduling_from_pending_produces_entry() {
        let by = RecordId::new();
        let at = Utc::now();
        let entry = plan(Pending, &schedule_on(day(2024, 5, 2)), day(2024, 5, 1), by, at).unwrap();

        assert_eq!(entry.from, Some(Pending));
        assert_eq!(entry.to, Scheduled);
        assert_eq!(entry.by, by);
        assert_eq!(
            entry.note.as_deref(),
            Some("scheduled for 2024-05-02 at Policlínica Norte")
        );
    }

    #[test]
    fn schedule_before_creation_rejected() {
        let err = plan(
            Pending,
            &schedule_on(day(2024, 4, 30)),
            day(2024, 5, 1),
            RecordId::new(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn completing_pending_is_invalid() {
        let err = plan(
            Pending,
            &Transition::Complete { note: None },
            day(2024, 5, 1),
            RecordId::new(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition {
                from: Pending,
                to: Completed
            }
        ));
    }

    #[test]
    fn cancel_requires_reason() {
        let err = plan(
            Pending,
            &Transition::Cancel { reason: "   ".into() },
            day(2024, 5, 1),
            RecordId::new(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ref e) if e[0].field == "reason"));
    }

    #[test]
    fn terminal_states_reject_everything() {
        for transition in [
            schedule_on(day(2024, 6, 1)),
            Transition::Complete { note: None },
            Transition::Cancel { reason: "x".into() },
            Transition::Resolicit { reason: "x".into() },
        ] {
            for terminal in [Completed, Canceled] {
                assert!(plan(terminal, &transition, day(2024, 5, 1), RecordId::new(), Utc::now())
                    .is_err());
            }
        }
    }

    #[test]
    fn status_parses_from_query_values() {
        assert_eq!("Scheduled".parse::<RequisitionStatus>().unwrap(), Scheduled);
        assert!("archived".parse::<RequisitionStatus>().is_err());
    }
}
