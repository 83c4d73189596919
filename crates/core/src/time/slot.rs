use crate::scoring::AnalysisType;
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named recurring scan window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
    MorningScan,
    MidMorningScan,
    MidDayScan,
    AfternoonScan,
    WeeklySummary,
}

impl TimeSlot {
    pub const ALL: [TimeSlot; 5] = [
        TimeSlot::MorningScan,
        TimeSlot::MidMorningScan,
        TimeSlot::MidDayScan,
        TimeSlot::AfternoonScan,
        TimeSlot::WeeklySummary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimeSlot::MorningScan => "morning_scan",
            TimeSlot::MidMorningScan => "mid_morning_scan",
            TimeSlot::MidDayScan => "mid_day_scan",
            TimeSlot::AfternoonScan => "afternoon_scan",
            TimeSlot::WeeklySummary => "weekly_summary",
        }
    }

    /// Display label used in report subjects.
    pub fn label(self) -> &'static str {
        match self {
            TimeSlot::MorningScan => "早盤掃描",
            TimeSlot::MidMorningScan => "盤中掃描",
            TimeSlot::MidDayScan => "午間掃描",
            TimeSlot::AfternoonScan => "盤後掃描",
            TimeSlot::WeeklySummary => "週末總結",
        }
    }

    /// Analysis type used when the caller does not pick one.
    pub fn default_analysis_type(self) -> AnalysisType {
        match self {
            TimeSlot::MorningScan | TimeSlot::MidMorningScan => AnalysisType::ShortTerm,
            TimeSlot::MidDayScan | TimeSlot::AfternoonScan => AnalysisType::Mixed,
            TimeSlot::WeeklySummary => AnalysisType::LongTerm,
        }
    }

    /// Local (Asia/Taipei) start time as (hour, minute), and the weekday for weekly slots.
    pub fn schedule(self) -> (u32, u32, Option<Weekday>) {
        match self {
            TimeSlot::MorningScan => (9, 0, None),
            TimeSlot::MidMorningScan => (10, 30, None),
            TimeSlot::MidDayScan => (12, 30, None),
            TimeSlot::AfternoonScan => (15, 0, None),
            TimeSlot::WeeklySummary => (17, 0, Some(Weekday::Fri)),
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeSlot {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeSlot::ALL
            .into_iter()
            .find(|slot| slot.as_str() == s.trim())
            .ok_or_else(|| anyhow::anyhow!("unknown time slot: {s}"))
    }
}
