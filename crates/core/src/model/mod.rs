mod curriculum;
mod ids;
mod ledger;

pub use ids::{ActivityId, LessonId, ParseIdError, StudentId};

pub use curriculum::{
    CompletionRecord, Curriculum, CurriculumDraft, CurriculumError, ProgressUnit,
    ProgressUnitDraft, default_curriculum,
};
pub use ledger::{CreditLedger, DailyLimit, LedgerError};
