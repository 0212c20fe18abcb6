//! Complaint models: priority levels, SLA offsets, statuses, and rows.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// SLA offset in days applied when a complaint's priority label is not
/// recognized.
pub const DEFAULT_SLA_DAYS: u64 = 7;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Complaint priority. Ordered from most urgent to least.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Priority {
    /// Days allowed between assignment and due date.
    pub fn sla_days(self) -> u64 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Medium => 5,
            Priority::Low => 7,
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "urgent" | "critical" => Some(Priority::Urgent),
            "high" => Some(Priority::High),
            "medium" | "normal" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Urgent => "Urgent",
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

/// SLA offset for a raw priority label. Unrecognized labels get the default
/// offset rather than an error; legacy rows carry free-form labels.
pub fn sla_days_for_label(label: &str) -> u64 {
    Priority::from_str_loose(label)
        .map(Priority::sla_days)
        .unwrap_or(DEFAULT_SLA_DAYS)
}

/// Due date derived from an assignment timestamp and a priority label.
/// Calendar-day arithmetic on the timestamp's UTC date; no timezone
/// normalization.
pub fn due_date_for(assigned_at: DateTime<Utc>, priority_label: &str) -> NaiveDate {
    assigned_at.date_naive() + Days::new(sla_days_for_label(priority_label))
}

/// Lifecycle status of a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComplaintStatus {
    Open,
    Assigned,
    Resolved,
    Closed,
}

impl ComplaintStatus {
    /// Parse from string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(ComplaintStatus::Open),
            "assigned" => Some(ComplaintStatus::Assigned),
            "resolved" => Some(ComplaintStatus::Resolved),
            "closed" => Some(ComplaintStatus::Closed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComplaintStatus::Open => "open",
            ComplaintStatus::Assigned => "assigned",
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Closed => "closed",
        }
    }
}

// ---------------------------------------------------------------------------
// Database row structs
// ---------------------------------------------------------------------------

/// Complaint entity.
///
/// `priority` and `status` are stored as raw labels; the enums above parse
/// them where logic needs them, and unknown priority labels fall back to
/// [`DEFAULT_SLA_DAYS`].
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Complaint {
    pub id: Uuid,
    pub ticket_no: String,
    pub subject: String,
    pub description: String,
    pub complainant_name: String,
    #[schema(example = "High")]
    pub priority: String,
    #[schema(example = "open")]
    pub status: String,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub due_date: Option<NaiveDate>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // -----------------------------------------------------------------------
    // Priority / SLA offsets
    // -----------------------------------------------------------------------

    #[test]
    fn test_sla_days_table() {
        assert_eq!(Priority::Urgent.sla_days(), 0);
        assert_eq!(Priority::High.sla_days(), 1);
        assert_eq!(Priority::Medium.sla_days(), 5);
        assert_eq!(Priority::Low.sla_days(), 7);
    }

    #[test]
    fn test_sla_days_for_label_known() {
        assert_eq!(sla_days_for_label("Urgent"), 0);
        assert_eq!(sla_days_for_label("High"), 1);
        assert_eq!(sla_days_for_label("Medium"), 5);
        assert_eq!(sla_days_for_label("Low"), 7);
    }

    #[test]
    fn test_sla_days_for_label_case_insensitive() {
        assert_eq!(sla_days_for_label("urgent"), 0);
        assert_eq!(sla_days_for_label("HIGH"), 1);
        assert_eq!(sla_days_for_label("medium"), 5);
    }

    #[test]
    fn test_sla_days_for_label_unknown_defaults() {
        assert_eq!(sla_days_for_label("unknown-garbage"), DEFAULT_SLA_DAYS);
        assert_eq!(sla_days_for_label(""), DEFAULT_SLA_DAYS);
        assert_eq!(sla_days_for_label("priority-9"), DEFAULT_SLA_DAYS);
    }

    #[test]
    fn test_priority_from_str_loose_aliases() {
        assert_eq!(Priority::from_str_loose("critical"), Some(Priority::Urgent));
        assert_eq!(Priority::from_str_loose("normal"), Some(Priority::Medium));
        assert_eq!(Priority::from_str_loose("snail"), None);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Urgent < Priority::High);
        assert!(Priority::High < Priority::Medium);
        assert!(Priority::Medium < Priority::Low);
    }

    // -----------------------------------------------------------------------
    // Due date arithmetic
    // -----------------------------------------------------------------------

    #[test]
    fn test_due_date_urgent_is_same_day() {
        let assigned = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        assert_eq!(
            due_date_for(assigned, "Urgent"),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
    }

    #[test]
    fn test_due_date_low_adds_seven_days() {
        let assigned = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
        assert_eq!(
            due_date_for(assigned, "Low"),
            NaiveDate::from_ymd_opt(2024, 3, 17).unwrap()
        );
    }

    #[test]
    fn test_due_date_rolls_over_month_end() {
        let assigned = Utc.with_ymd_and_hms(2024, 1, 29, 12, 0, 0).unwrap();
        assert_eq!(
            due_date_for(assigned, "Medium"),
            NaiveDate::from_ymd_opt(2024, 2, 3).unwrap()
        );
    }

    #[test]
    fn test_due_date_unknown_label_uses_default() {
        let assigned = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(
            due_date_for(assigned, "whenever"),
            NaiveDate::from_ymd_opt(2024, 6, 8).unwrap()
        );
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    #[test]
    fn test_status_round_trip() {
        for status in [
            ComplaintStatus::Open,
            ComplaintStatus::Assigned,
            ComplaintStatus::Resolved,
            ComplaintStatus::Closed,
        ] {
            assert_eq!(ComplaintStatus::from_str_loose(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_status_from_str_loose_unknown() {
        assert_eq!(ComplaintStatus::from_str_loose("reopened"), None);
        assert_eq!(ComplaintStatus::from_str_loose(""), None);
    }
}
