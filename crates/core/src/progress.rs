//! Completion percentages for curriculum weeks.
//!
//! Everything here is a pure function of a [`ProgressUnit`] list and a
//! [`CompletionRecord`]; nothing is cached or shared.

use std::fmt;

use crate::model::{CompletionRecord, Curriculum, ProgressUnit};

/// Completion percentage of one unit, in `0..=100`.
///
/// A unit that lists no expected work reports 0. Completed items that the
/// unit does not expect are ignored. Rounds half up.
#[must_use]
pub fn percentage(unit: &ProgressUnit, record: &CompletionRecord) -> u8 {
    let total = unit.total_items();
    let completed = completed_items(unit, record);
    ratio_percent(completed, total)
}

/// Number of the unit's expected items present in the record.
#[must_use]
pub fn completed_items(unit: &ProgressUnit, record: &CompletionRecord) -> usize {
    let activities = unit
        .expected_activities()
        .intersection(record.completed_activities())
        .count();
    let lessons = unit
        .expected_lessons()
        .intersection(record.completed_lessons())
        .count();
    activities + lessons
}

/// `round_half_up(100 * completed / total)`, or 0 when `total` is 0.
fn ratio_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total) as u128;
    let total = total as u128;
    let rounded = (200 * completed + total) / (2 * total);
    u8::try_from(rounded).unwrap_or(100)
}

/// How many units are fully complete, out of how many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionRatio {
    pub completed: usize,
    pub total: usize,
}

impl fmt::Display for CompletionRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.completed, self.total)
    }
}

/// Counts units at exactly 100%. Placeholder units stay in the total.
#[must_use]
pub fn overall_completion_ratio<'a>(
    units: impl IntoIterator<Item = &'a ProgressUnit>,
    record: &CompletionRecord,
) -> CompletionRatio {
    units
        .into_iter()
        .fold(CompletionRatio::default(), |mut ratio, unit| {
            ratio.total += 1;
            if percentage(unit, record) == 100 {
                ratio.completed += 1;
            }
            ratio
        })
}

/// Per-week line of a progress report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitProgress {
    pub week: u32,
    pub title: String,
    pub completed_items: usize,
    pub total_items: usize,
    pub percentage: u8,
}

impl UnitProgress {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.percentage == 100
    }
}

/// Learning-path view of a student's progress through a curriculum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub units: Vec<UnitProgress>,
    pub ratio: CompletionRatio,
    /// Percentage over every expected item in the curriculum.
    pub overall_percentage: u8,
}

impl ProgressReport {
    #[must_use]
    pub fn build(curriculum: &Curriculum, record: &CompletionRecord) -> Self {
        let units: Vec<UnitProgress> = curriculum
            .units()
            .iter()
            .map(|unit| UnitProgress {
                week: unit.week(),
                title: unit.title().to_string(),
                completed_items: completed_items(unit, record),
                total_items: unit.total_items(),
                percentage: percentage(unit, record),
            })
            .collect();

        let (done, total) = units.iter().fold((0, 0), |(done, total), unit| {
            (done + unit.completed_items, total + unit.total_items)
        });

        Self {
            ratio: overall_completion_ratio(curriculum.units(), record),
            overall_percentage: ratio_percent(done, total),
            units,
        }
    }

    /// First authored week that is not finished yet.
    #[must_use]
    pub fn next_unit(&self) -> Option<&UnitProgress> {
        self.units
            .iter()
            .find(|unit| unit.total_items > 0 && !unit.is_complete())
    }
}
