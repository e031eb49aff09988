//! Table visit bookkeeping.

use chrono::{DateTime, Utc};

use resto_models::{PersonType, SentimentSummary, TableStatus, TableSummary};

/// The table the camera is currently watching.
#[derive(Debug, Clone)]
struct Visit {
    table_number: u32,
    start_time: DateTime<Utc>,
    guests: Vec<String>,
    staff: Vec<String>,
}

impl Visit {
    fn summary(&self) -> TableSummary {
        TableSummary {
            table_number: self.table_number,
            status: TableStatus::Engaged,
            guests: self.guests.clone(),
            staff: self.staff.clone(),
            guest_count: self.guests.len() as u32,
            start_time: self.start_time,
            end_time: None,
            guest_sentiment: None,
            staff_sentiment: None,
        }
    }
}

/// Tracks at most one open visit at a time.
#[derive(Debug, Default)]
pub struct TableTracker {
    current: Option<Visit>,
}

impl TableTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_table(&self) -> Option<u32> {
        self.current.as_ref().map(|v| v.table_number)
    }

    /// Start a visit. Returns the engaged summary, or `None` if that table is already open.
    ///
    /// A different table's visit must be [`close`](Self::close)d first.
    pub fn open(&mut self, table_number: u32, at: DateTime<Utc>) -> Option<TableSummary> {
        if self.current_table() == Some(table_number) {
            return None;
        }
        debug_assert!(
            self.current.is_none(),
            "table {} opened while table {:?} is still open",
            table_number,
            self.current_table()
        );
        let visit = Visit {
            table_number,
            start_time: at,
            guests: Vec::new(),
            staff: Vec::new(),
        };
        let summary = visit.summary();
        self.current = Some(visit);
        Some(summary)
    }

    /// Record a person at the open table. Returns true when first seen there.
    pub fn note_person(&mut self, person_type: PersonType, id: &str) -> bool {
        let Some(visit) = self.current.as_mut() else {
            return false;
        };
        let list = match person_type {
            PersonType::Guest => &mut visit.guests,
            PersonType::Staff => &mut visit.staff,
        };
        if list.iter().any(|p| p == id) {
            return false;
        }
        list.push(id.to_string());
        true
    }

    /// Close the open visit with its final sentiment.
    pub fn close(
        &mut self,
        at: DateTime<Utc>,
        guest_sentiment: Option<SentimentSummary>,
        staff_sentiment: Option<SentimentSummary>,
    ) -> Option<TableSummary> {
        let visit = self.current.take()?;
        Some(TableSummary {
            status: TableStatus::Free,
            end_time: Some(at.max(visit.start_time)),
            guest_sentiment,
            staff_sentiment,
            ..visit.summary()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use resto_models::{Emotion, Trend};

    #[test]
    fn test_visit_lifecycle() {
        let start = Utc::now();
        let mut tables = TableTracker::new();

        let engaged = tables.open(3, start).unwrap();
        assert_eq!(engaged.status, TableStatus::Engaged);
        assert!(tables.open(3, start).is_none());

        assert!(tables.note_person(PersonType::Guest, "guest_1"));
        assert!(!tables.note_person(PersonType::Guest, "guest_1"));
        assert!(tables.note_person(PersonType::Staff, "Maria"));

        let sentiment = SentimentSummary {
            avg_happiness: 72.0,
            dominant_emotion: Emotion::Happy,
            trend: Trend::Stable,
        };
        let free = tables
            .close(start + Duration::minutes(30), Some(sentiment), None)
            .unwrap();
        assert_eq!(free.status, TableStatus::Free);
        assert_eq!(free.guest_count, 1);
        assert_eq!(free.staff, vec!["Maria".to_string()]);
        assert_eq!(free.duration_minutes(), Some(30.0));
        assert!(free.validate().is_ok());
        assert!(tables.current_table().is_none());
    }

    #[test]
    fn test_note_without_visit_is_ignored() {
        let mut tables = TableTracker::new();
        assert!(!tables.note_person(PersonType::Guest, "guest_1"));
        assert!(tables.close(Utc::now(), None, None).is_none());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "still open")]
    fn test_open_over_another_table_panics() {
        let mut tables = TableTracker::new();
        tables.open(1, Utc::now());
        tables.open(2, Utc::now());
    }

    #[test]
    fn test_reopen_after_close() {
        let start = Utc::now();
        let mut tables = TableTracker::new();
        tables.open(1, start);
        let free = tables.close(start + Duration::minutes(5), None, None).unwrap();
        assert_eq!(free.table_number, 1);

        let engaged = tables.open(2, start + Duration::minutes(5)).unwrap();
        assert_eq!(engaged.table_number, 2);
        assert_eq!(tables.current_table(), Some(2));
    }
}
