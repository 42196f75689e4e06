use chrono::{DateTime, Days, NaiveDate};

use crate::error::{Error, Result};

/// Change-date range `[start, end)` for one extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, days: u32) -> Result<Self> {
        if days == 0 {
            return Err(Error::InvalidDate(
                "window must span at least one day".into(),
            ));
        }
        let end = start
            .checked_add_days(Days::new(u64::from(days)))
            .ok_or_else(|| Error::InvalidDate(format!("{start} + {days} days is out of range")))?;
        Ok(Self { start, end })
    }

    /// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp.
    pub fn parse(start: &str, days: u32) -> Result<Self> {
        Self::new(parse_date(start)?, days)
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.date_naive()))
        .map_err(|_| Error::InvalidDate(format!("unrecognised start date '{s}'")))
}

pub fn work_items_query(project: &str, window: &DateWindow) -> String {
    let project = project.replace('\'', "''");
    format!(
        "SELECT [System.Id] FROM WorkItems \
         WHERE [System.TeamProject] = '{project}' \
         AND [System.ChangedDate] >= '{}' \
         AND [System.ChangedDate] < '{}'",
        window.start.format("%Y-%m-%d"),
        window.end.format("%Y-%m-%d"),
    )
}
