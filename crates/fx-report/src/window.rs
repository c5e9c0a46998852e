//! Previous-calendar-month date window.

use chrono::{Datelike, Days, Local, NaiveDate};
use serde::Serialize;

/// Date format the portal's range inputs expect.
pub const FORM_DATE_FORMAT: &str = "%d.%m.%Y";

/// First and last day of one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// The window preceding the local current date.
    pub fn today() -> Self {
        previous_month_window(Local::now().date_naive())
    }

    pub fn start_str(&self) -> String {
        self.start.format(FORM_DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(FORM_DATE_FORMAT).to_string()
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} – {}", self.start_str(), self.end_str())
    }
}

/// Compute the calendar month immediately before `today`'s month.
pub fn previous_month_window(today: NaiveDate) -> DateWindow {
    let first_this_month = today - Days::new(u64::from(today.day0()));
    let end = first_this_month - Days::new(1);
    let start = end - Days::new(u64::from(end.day0()));
    DateWindow { start, end }
}
