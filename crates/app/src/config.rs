//! Command-line and environment configuration.
//!
//! Flags win over environment variables, which win over defaults.

use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use learn_core::model::{
    ActivityId, Curriculum, CurriculumDraft, DailyLimit, LessonId, StudentId, default_curriculum,
};
use services::DayBoundary;
use thiserror::Error;

pub const DEFAULT_DB_URL: &str = "sqlite://lms.sqlite3";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{flag} requires a value")]
    MissingValue { flag: &'static str },
    #[error("unknown argument: {0}")]
    UnknownArg(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("invalid daily limit: {raw}")]
    InvalidLimit { raw: String },
    #[error("invalid UTC offset (expected e.g. +02:00): {raw}")]
    InvalidOffset { raw: String },
    #[error("invalid --db value: {raw}")]
    InvalidDbUrl { raw: String },
    #[error("{command} needs a student (--student or LMS_STUDENT)")]
    MissingStudent { command: &'static str },
    #[error("{command} needs an item id")]
    MissingItem { command: &'static str },
    #[error("cannot read curriculum {}: {source}", path.display())]
    CurriculumFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("curriculum {} is not valid JSON: {source}", path.display())]
    CurriculumJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Core(#[from] learn_core::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the credit ledger.
    Credits,
    /// Spend one credit.
    Spend,
    Progress,
    CompleteLesson(LessonId),
    CompleteActivity(ActivityId),
    Rank,
}

#[derive(Debug)]
pub struct Config {
    pub command: Command,
    pub db_url: String,
    pub daily_limit: DailyLimit,
    pub boundary: DayBoundary,
    pub student: Option<StudentId>,
    pub curriculum: Curriculum,
}

impl Config {
    /// Resolve configuration from the process arguments and environment.
    ///
    /// Returns `None` when usage help was asked for.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for unknown arguments or invalid values.
    pub fn from_env_and_args() -> Result<Option<Self>, ConfigError> {
        Self::parse(std::env::args().skip(1), |key| std::env::var(key).ok())
    }

    /// # Errors
    ///
    /// Returns `ConfigError` for unknown arguments or invalid values.
    pub fn parse(
        args: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let mut db_url = env("LMS_DB_URL");
        let mut limit = env("LMS_DAILY_LIMIT");
        let mut offset = env("LMS_UTC_OFFSET");
        let mut student = env("LMS_STUDENT");
        let mut curriculum_path = env("LMS_CURRICULUM").map(PathBuf::from);

        let mut args = args.into_iter();
        let mut positional = Vec::new();
        let mut help = false;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => db_url = Some(require_value(&mut args, "--db")?),
                "--daily-limit" => limit = Some(require_value(&mut args, "--daily-limit")?),
                "--utc-offset" => offset = Some(require_value(&mut args, "--utc-offset")?),
                "--student" => student = Some(require_value(&mut args, "--student")?),
                "--curriculum" => {
                    curriculum_path = Some(PathBuf::from(require_value(&mut args, "--curriculum")?));
                }
                "--help" | "-h" => help = true,
                _ if arg.starts_with("--") => return Err(ConfigError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let db_url = match db_url {
            Some(raw) if raw.trim().is_empty() => return Err(ConfigError::InvalidDbUrl { raw }),
            Some(raw) => normalize_sqlite_url(raw),
            None => normalize_sqlite_url(DEFAULT_DB_URL.to_string()),
        };
        let daily_limit = limit.map_or(Ok(DailyLimit::DEFAULT), |raw| parse_limit(&raw))?;
        let boundary = offset.map_or(Ok(DayBoundary::Local), |raw| parse_offset(&raw))?;
        let student = student
            .map(StudentId::new)
            .transpose()
            .map_err(learn_core::Error::from)?;
        let curriculum = match curriculum_path {
            Some(path) => load_curriculum(&path)?,
            None => default_curriculum(),
        };
        if help {
            return Ok(None);
        }
        let Some(command) = parse_command(positional)? else {
            return Ok(None);
        };

        if let Some(name) = command.required_student()
            && student.is_none()
        {
            return Err(ConfigError::MissingStudent { command: name });
        }

        Ok(Some(Self {
            command,
            db_url,
            daily_limit,
            boundary,
            student,
            curriculum,
        }))
    }
}

impl Command {
    fn required_student(&self) -> Option<&'static str> {
        match self {
            Command::Progress => Some("progress"),
            Command::CompleteLesson(_) => Some("complete-lesson"),
            Command::CompleteActivity(_) => Some("complete-activity"),
            _ => None,
        }
    }
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ConfigError> {
    args.next().ok_or(ConfigError::MissingValue { flag })
}

/// `Ok(None)` is the `help` command.
fn parse_command(positional: Vec<String>) -> Result<Option<Command>, ConfigError> {
    let mut words = positional.into_iter();
    let Some(first) = words.next() else {
        return Ok(Some(Command::Credits));
    };
    let command = match first.as_str() {
        "credits" => Command::Credits,
        "spend" => Command::Spend,
        "progress" => Command::Progress,
        "rank" => Command::Rank,
        "help" => return Ok(None),
        "complete-lesson" => {
            let raw = words.next().ok_or(ConfigError::MissingItem {
                command: "complete-lesson",
            })?;
            Command::CompleteLesson(LessonId::new(raw).map_err(learn_core::Error::from)?)
        }
        "complete-activity" => {
            let raw = words.next().ok_or(ConfigError::MissingItem {
                command: "complete-activity",
            })?;
            Command::CompleteActivity(ActivityId::new(raw).map_err(learn_core::Error::from)?)
        }
        _ => return Err(ConfigError::UnknownCommand(first)),
    };
    if let Some(extra) = words.next() {
        return Err(ConfigError::UnknownArg(extra));
    }
    Ok(Some(command))
}

fn parse_limit(raw: &str) -> Result<DailyLimit, ConfigError> {
    let value: u32 = raw.trim().parse().map_err(|_| ConfigError::InvalidLimit {
        raw: raw.to_string(),
    })?;
    Ok(DailyLimit::new(value).map_err(learn_core::Error::from)?)
}

fn parse_offset(raw: &str) -> Result<DayBoundary, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("local") {
        return Ok(DayBoundary::Local);
    }
    if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
        return Ok(DayBoundary::utc());
    }
    trimmed
        .parse::<FixedOffset>()
        .map(DayBoundary::Fixed)
        .map_err(|_| ConfigError::InvalidOffset {
            raw: raw.to_string(),
        })
}

fn load_curriculum(path: &Path) -> Result<Curriculum, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::CurriculumFile {
        path: path.to_path_buf(),
        source,
    })?;
    let draft: CurriculumDraft =
        serde_json::from_str(&raw).map_err(|source| ConfigError::CurriculumJson {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(draft.validate().map_err(learn_core::Error::from)?)
}

pub fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Make sure the database file and its directory exist before connecting.
///
/// # Errors
///
/// Returns an error if the URL has no path or the file cannot be created.
pub fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ConfigError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ConfigError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse_raw(args: &[&str], env: &[(&str, &str)]) -> Result<Option<Config>, ConfigError> {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::parse(args.iter().map(|a| (*a).to_string()), |key| {
            env.get(key).cloned()
        })
    }

    fn parse(args: &[&str], env: &[(&str, &str)]) -> Result<Config, ConfigError> {
        parse_raw(args, env).map(|config| config.expect("a command, not help"))
    }

    #[test]
    fn help_skips_command_validation() {
        assert!(parse_raw(&["--help"], &[]).unwrap().is_none());
        assert!(parse_raw(&["help"], &[]).unwrap().is_none());
        // Help wins even when the command itself would be rejected.
        assert!(parse_raw(&["progress", "-h"], &[]).unwrap().is_none());
    }

    #[test]
    fn defaults_to_credits_with_default_limit() {
        let config = parse(&[], &[]).unwrap();
        assert_eq!(config.command, Command::Credits);
        assert_eq!(config.daily_limit, DailyLimit::DEFAULT);
        assert_eq!(config.boundary, DayBoundary::Local);
        assert!(config.db_url.starts_with("sqlite://"));
        assert_eq!(config.curriculum.units().len(), 8);
    }

    #[test]
    fn flags_override_environment() {
        let config = parse(
            &["spend", "--daily-limit", "7", "--utc-offset", "+02:00"],
            &[("LMS_DAILY_LIMIT", "3"), ("LMS_UTC_OFFSET", "utc")],
        )
        .unwrap();
        assert_eq!(config.command, Command::Spend);
        assert_eq!(config.daily_limit.get(), 7);
        assert_eq!(
            config.boundary,
            DayBoundary::Fixed(FixedOffset::east_opt(2 * 3600).unwrap())
        );
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = parse(&["--daily-limit", "0"], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Core(_)));
        let err = parse(&["--daily-limit", "many"], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLimit { .. }));
    }

    #[test]
    fn progress_requires_a_student() {
        let err = parse(&["progress"], &[]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingStudent {
                command: "progress"
            }
        ));
        let config = parse(&["progress"], &[("LMS_STUDENT", "ana")]).unwrap();
        assert_eq!(config.student.unwrap().as_str(), "ana");
    }

    #[test]
    fn complete_lesson_takes_an_id() {
        let config = parse(&["complete-lesson", "w1-welcome", "--student", "ana"], &[]).unwrap();
        assert_eq!(
            config.command,
            Command::CompleteLesson(LessonId::new("w1-welcome").unwrap())
        );
        let err = parse(&["complete-activity", "--student", "ana"], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingItem { .. }));
    }

    #[test]
    fn unknown_input_is_reported() {
        assert!(matches!(
            parse(&["teleport"], &[]),
            Err(ConfigError::UnknownCommand(_))
        ));
        assert!(matches!(
            parse(&["--verbose"], &[]),
            Err(ConfigError::UnknownArg(_))
        ));
        assert!(matches!(
            parse(&["--db"], &[]),
            Err(ConfigError::MissingValue { flag: "--db" })
        ));
    }

    #[test]
    fn missing_curriculum_file_is_reported() {
        let err = parse(&["--curriculum", "/nonexistent/weeks.json"], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::CurriculumFile { .. }));
    }

    #[test]
    fn memory_url_is_kept() {
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:".into()),
            "sqlite::memory:"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/x.db".into()),
            "sqlite:///tmp/x.db"
        );
    }
}
