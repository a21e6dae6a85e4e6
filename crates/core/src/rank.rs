//! Cohort standings by completed curriculum items.

use crate::model::{CompletionRecord, Curriculum, StudentId};
use crate::progress::completed_items;

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankEntry {
    pub student: StudentId,
    /// Completed items the curriculum actually expects.
    pub score: usize,
    /// 1-based; tied scores share a rank and the next rank is skipped.
    pub rank: usize,
}

/// Ranks every record, highest score first. Ties are listed by student id.
#[must_use]
pub fn rank_cohort(curriculum: &Curriculum, records: &[CompletionRecord]) -> Vec<RankEntry> {
    let mut scored: Vec<(StudentId, usize)> = records
        .iter()
        .map(|record| (record.student().clone(), score(curriculum, record)))
        .collect();
    scored.sort_by(|(a_id, a_score), (b_id, b_score)| {
        b_score.cmp(a_score).then_with(|| a_id.cmp(b_id))
    });

    let mut entries = Vec::with_capacity(scored.len());
    let mut previous: Option<(usize, usize)> = None;
    for (position, (student, score)) in scored.into_iter().enumerate() {
        let rank = match previous {
            Some((prev_score, prev_rank)) if prev_score == score => prev_rank,
            _ => position + 1,
        };
        previous = Some((score, rank));
        entries.push(RankEntry {
            student,
            score,
            rank,
        });
    }
    entries
}

#[must_use]
pub fn rank_of<'a>(entries: &'a [RankEntry], student: &StudentId) -> Option<&'a RankEntry> {
    entries.iter().find(|entry| &entry.student == student)
}

fn score(curriculum: &Curriculum, record: &CompletionRecord) -> usize {
    curriculum
        .units()
        .iter()
        .map(|unit| completed_items(unit, record))
        .sum()
}
