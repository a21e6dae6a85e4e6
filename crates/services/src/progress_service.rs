use std::sync::Arc;

use tracing::{info, warn};

use learn_core::model::{ActivityId, CompletionRecord, Curriculum, LessonId, StudentId};
use learn_core::progress::{self, CompletionRatio, ProgressReport};
use learn_core::rank::{self, RankEntry};
use storage::repository::CompletionRepository;

use crate::Clock;
use crate::error::ProgressServiceError;

/// Progress views over a fixed curriculum and the stored completion records.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    curriculum: Arc<Curriculum>,
    completions: Arc<dyn CompletionRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        curriculum: Arc<Curriculum>,
        completions: Arc<dyn CompletionRepository>,
    ) -> Self {
        Self {
            clock,
            curriculum,
            completions,
        }
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the record cannot be loaded.
    pub async fn record(
        &self,
        student: &StudentId,
    ) -> Result<CompletionRecord, ProgressServiceError> {
        Ok(self.completions.get_record(student).await?)
    }

    /// Learning-path report for one student.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the record cannot be loaded.
    pub async fn report(&self, student: &StudentId) -> Result<ProgressReport, ProgressServiceError> {
        let record = self.record(student).await?;
        Ok(ProgressReport::build(&self.curriculum, &record))
    }

    /// Percentage for a single week.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::UnknownWeek` if the week is not in the
    /// curriculum, or a storage error.
    pub async fn week_percentage(
        &self,
        student: &StudentId,
        week: u32,
    ) -> Result<u8, ProgressServiceError> {
        let unit = self
            .curriculum
            .unit(week)
            .ok_or(ProgressServiceError::UnknownWeek(week))?;
        let record = self.record(student).await?;
        Ok(progress::percentage(unit, &record))
    }

    /// Completed weeks out of all weeks, for an "x/y" badge.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the record cannot be loaded.
    pub async fn completion_ratio(
        &self,
        student: &StudentId,
    ) -> Result<CompletionRatio, ProgressServiceError> {
        let record = self.record(student).await?;
        Ok(progress::overall_completion_ratio(
            self.curriculum.units(),
            &record,
        ))
    }

    /// Record a finished lesson. Returns `true` if it was new.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the completion cannot be stored.
    pub async fn complete_lesson(
        &self,
        student: &StudentId,
        lesson: &LessonId,
    ) -> Result<bool, ProgressServiceError> {
        if !self.curriculum.contains_lesson(lesson) {
            warn!(%student, %lesson, "lesson is not part of the curriculum");
        }
        let added = self
            .completions
            .mark_lesson_complete(student, lesson, self.clock.now())
            .await?;
        if added {
            info!(%student, %lesson, "lesson completed");
        }
        Ok(added)
    }

    /// Record a finished activity. Returns `true` if it was new.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the completion cannot be stored.
    pub async fn complete_activity(
        &self,
        student: &StudentId,
        activity: &ActivityId,
    ) -> Result<bool, ProgressServiceError> {
        if !self.curriculum.contains_activity(activity) {
            warn!(%student, %activity, "activity is not part of the curriculum");
        }
        let added = self
            .completions
            .mark_activity_complete(student, activity, self.clock.now())
            .await?;
        if added {
            info!(%student, %activity, "activity completed");
        }
        Ok(added)
    }

    /// Whole-cohort standings.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if records cannot be loaded.
    pub async fn leaderboard(&self) -> Result<Vec<RankEntry>, ProgressServiceError> {
        let records = self.completions.list_records().await?;
        Ok(rank::rank_cohort(&self.curriculum, &records))
    }

    /// A student's standing, or `None` if they have never completed anything.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if records cannot be loaded.
    pub async fn rank_of(
        &self,
        student: &StudentId,
    ) -> Result<Option<RankEntry>, ProgressServiceError> {
        let entries = self.leaderboard().await?;
        Ok(rank::rank_of(&entries, student).cloned())
    }
}
