use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ActivityId, LessonId, ParseIdError, StudentId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CurriculumError {
    #[error("curriculum must contain at least one week")]
    Empty,

    #[error("week {0} appears more than once")]
    DuplicateWeek(u32),

    #[error("week {week} has an invalid item id: {source}")]
    InvalidItem {
        week: u32,
        #[source]
        source: ParseIdError,
    },
}

//
// ─── PROGRESS UNIT ─────────────────────────────────────────────────────────────
//

/// One curriculum week and the work a student is expected to finish in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUnit {
    week: u32,
    title: String,
    expected_activities: BTreeSet<ActivityId>,
    expected_lessons: BTreeSet<LessonId>,
}

impl ProgressUnit {
    #[must_use]
    pub fn new(
        week: u32,
        title: impl Into<String>,
        expected_activities: impl IntoIterator<Item = ActivityId>,
        expected_lessons: impl IntoIterator<Item = LessonId>,
    ) -> Self {
        Self {
            week,
            title: title.into(),
            expected_activities: expected_activities.into_iter().collect(),
            expected_lessons: expected_lessons.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn week(&self) -> u32 {
        self.week
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn expected_activities(&self) -> &BTreeSet<ActivityId> {
        &self.expected_activities
    }

    #[must_use]
    pub fn expected_lessons(&self) -> &BTreeSet<LessonId> {
        &self.expected_lessons
    }

    /// Number of expected items (activities plus lessons).
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.expected_activities.len() + self.expected_lessons.len()
    }

    /// Placeholder weeks list no expected work yet.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.total_items() == 0
    }
}

//
// ─── COMPLETION RECORD ─────────────────────────────────────────────────────────
//

/// Everything a student has finished so far. Only ever grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    student: StudentId,
    completed_activities: BTreeSet<ActivityId>,
    completed_lessons: BTreeSet<LessonId>,
}

impl CompletionRecord {
    /// An empty record for a student who has not finished anything.
    #[must_use]
    pub fn new(student: StudentId) -> Self {
        Self {
            student,
            completed_activities: BTreeSet::new(),
            completed_lessons: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_items(
        student: StudentId,
        activities: impl IntoIterator<Item = ActivityId>,
        lessons: impl IntoIterator<Item = LessonId>,
    ) -> Self {
        Self {
            student,
            completed_activities: activities.into_iter().collect(),
            completed_lessons: lessons.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn student(&self) -> &StudentId {
        &self.student
    }

    #[must_use]
    pub fn completed_activities(&self) -> &BTreeSet<ActivityId> {
        &self.completed_activities
    }

    #[must_use]
    pub fn completed_lessons(&self) -> &BTreeSet<LessonId> {
        &self.completed_lessons
    }

    /// Returns `true` if the activity was not already recorded.
    pub fn insert_activity(&mut self, id: ActivityId) -> bool {
        self.completed_activities.insert(id)
    }

    /// Returns `true` if the lesson was not already recorded.
    pub fn insert_lesson(&mut self, id: LessonId) -> bool {
        self.completed_lessons.insert(id)
    }
}

//
// ─── CURRICULUM ────────────────────────────────────────────────────────────────
//

/// Ordered list of weeks with unique week numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Curriculum {
    units: Vec<ProgressUnit>,
}

impl Curriculum {
    /// # Errors
    ///
    /// Returns `CurriculumError` if there are no units or a week number repeats.
    pub fn new(units: Vec<ProgressUnit>) -> Result<Self, CurriculumError> {
        if units.is_empty() {
            return Err(CurriculumError::Empty);
        }
        let mut seen = HashSet::with_capacity(units.len());
        for unit in &units {
            if !seen.insert(unit.week()) {
                return Err(CurriculumError::DuplicateWeek(unit.week()));
            }
        }
        Ok(Self { units })
    }

    #[must_use]
    pub fn units(&self) -> &[ProgressUnit] {
        &self.units
    }

    #[must_use]
    pub fn unit(&self, week: u32) -> Option<&ProgressUnit> {
        self.units.iter().find(|unit| unit.week() == week)
    }

    /// Units that list at least one expected item.
    pub fn authored_units(&self) -> impl Iterator<Item = &ProgressUnit> {
        self.units.iter().filter(|unit| !unit.is_placeholder())
    }

    #[must_use]
    pub fn contains_lesson(&self, id: &LessonId) -> bool {
        self.units
            .iter()
            .any(|unit| unit.expected_lessons().contains(id))
    }

    #[must_use]
    pub fn contains_activity(&self, id: &ActivityId) -> bool {
        self.units
            .iter()
            .any(|unit| unit.expected_activities().contains(id))
    }
}

//
// ─── DRAFTS ────────────────────────────────────────────────────────────────────
//

/// Unvalidated curriculum as read from a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurriculumDraft {
    pub weeks: Vec<ProgressUnitDraft>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressUnitDraft {
    pub week: u32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub activities: Vec<String>,
    #[serde(default)]
    pub lessons: Vec<String>,
}

impl CurriculumDraft {
    /// Validate ids and week numbers.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError` for blank ids, duplicate weeks, or no weeks.
    pub fn validate(self) -> Result<Curriculum, CurriculumError> {
        let units = self
            .weeks
            .into_iter()
            .map(ProgressUnitDraft::validate)
            .collect::<Result<Vec<_>, _>>()?;
        Curriculum::new(units)
    }
}

impl ProgressUnitDraft {
    fn validate(self) -> Result<ProgressUnit, CurriculumError> {
        let week = self.week;
        let invalid = |source| CurriculumError::InvalidItem { week, source };
        let activities = self
            .activities
            .into_iter()
            .map(ActivityId::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        let lessons = self
            .lessons
            .into_iter()
            .map(LessonId::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Week {week}"));
        Ok(ProgressUnit::new(week, title, activities, lessons))
    }
}

/// The course shipped with the app: eight weeks, content authored for the
/// first three. Later weeks are placeholders until their material lands.
#[must_use]
pub fn default_curriculum() -> Curriculum {
    let authored: [(u32, &str, &[&str], &[&str]); 3] = [
        (
            1,
            "Getting started",
            &["w1-quiz", "w1-match"],
            &["w1-welcome", "w1-variables", "w1-printing"],
        ),
        (
            2,
            "Control flow",
            &["w2-quiz", "w2-loops-lab"],
            &["w2-conditionals", "w2-loops"],
        ),
        (
            3,
            "Functions",
            &["w3-quiz", "w3-match"],
            &["w3-functions", "w3-scope", "w3-recursion"],
        ),
    ];

    let mut units: Vec<ProgressUnit> = authored
        .iter()
        .map(|(week, title, activities, lessons)| {
            ProgressUnit::new(
                *week,
                *title,
                activities.iter().filter_map(|id| ActivityId::new(*id).ok()),
                lessons.iter().filter_map(|id| LessonId::new(*id).ok()),
            )
        })
        .collect();
    units.extend((4..=8).map(|week| {
        ProgressUnit::new(week, format!("Week {week}"), Vec::new(), Vec::new())
    }));

    Curriculum { units }
}
