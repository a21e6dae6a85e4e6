mod config;
mod telemetry;

use chrono::Local;
use learn_core::model::StudentId;
use learn_core::progress::ProgressReport;
use services::{AppServices, Clock, CreditError};
use tracing::{debug, info};

use crate::config::{Command, Config, prepare_sqlite_file};

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app [credits]                          show today's AI credits");
    eprintln!("  app spend                              use one AI credit");
    eprintln!("  app progress --student <id>            weekly progress");
    eprintln!("  app complete-lesson <id> --student <id>");
    eprintln!("  app complete-activity <id> --student <id>");
    eprintln!("  app rank [--student <id>]              cohort standings");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>        default sqlite://lms.sqlite3");
    eprintln!("  --daily-limit <n>        default 50");
    eprintln!("  --utc-offset <+hh:mm>    day boundary; default local time");
    eprintln!("  --curriculum <file.json> weeks to track; default built-in course");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LMS_DB_URL, LMS_DAILY_LIMIT, LMS_UTC_OFFSET, LMS_STUDENT, LMS_CURRICULUM");
    eprintln!("  LMS_LOG (filter), LMS_LOG_FORMAT=json");
}

/// Exit status when the command ran but the daily quota refused it.
const EXIT_QUOTA: i32 = 1;

async fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let Some(config) = Config::from_env_and_args().inspect_err(|_| print_usage())? else {
        print_usage();
        return Ok(0);
    };

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&config.db_url)?;
    debug!(db = %config.db_url, limit = config.daily_limit.get(), "opening storage");
    let app = AppServices::new_sqlite(
        &config.db_url,
        Clock::default_clock(),
        config.boundary,
        config.daily_limit,
        config.curriculum,
    )
    .await?;

    match config.command {
        Command::Credits => {
            let ledger = app.credits().peek().await;
            println!(
                "{}/{} credits left today (resets {}, {} used in this window)",
                ledger.remaining(),
                app.credits().limit().get(),
                ledger.reset_at().with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                ledger.total_used(),
            );
        }
        Command::Spend => match app.credits().consume().await {
            Ok(ledger) => println!("credit used; {} left today", ledger.remaining()),
            Err(CreditError::QuotaExceeded { reset_at }) => {
                println!(
                    "no credits left today; try again after {}",
                    reset_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                );
                return Ok(EXIT_QUOTA);
            }
            Err(other) => return Err(other.into()),
        },
        Command::Progress => {
            let student = require_student(config.student.as_ref())?;
            let report = app.progress().report(student).await?;
            print_report(student, &report);
        }
        Command::CompleteLesson(lesson) => {
            let student = require_student(config.student.as_ref())?;
            let added = app.progress().complete_lesson(student, &lesson).await?;
            println!("{}", completion_message(added, lesson.as_str()));
        }
        Command::CompleteActivity(activity) => {
            let student = require_student(config.student.as_ref())?;
            let added = app.progress().complete_activity(student, &activity).await?;
            println!("{}", completion_message(added, activity.as_str()));
        }
        Command::Rank => {
            let board = app.progress().leaderboard().await?;
            if board.is_empty() {
                println!("no completions recorded yet");
            }
            for entry in &board {
                let marker = if config.student.as_ref() == Some(&entry.student) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{marker}{:>3}. {:<20} {}",
                    entry.rank, entry.student, entry.score
                );
            }
        }
    }

    info!("done");
    Ok(0)
}

fn require_student(student: Option<&StudentId>) -> Result<&StudentId, Box<dyn std::error::Error>> {
    student.ok_or_else(|| "a student is required (--student or LMS_STUDENT)".into())
}

fn completion_message(added: bool, id: &str) -> String {
    if added {
        format!("marked {id} complete")
    } else {
        format!("{id} was already complete")
    }
}

fn print_report(student: &StudentId, report: &ProgressReport) {
    println!(
        "{student}: {} weeks complete, {}% of all work",
        report.ratio, report.overall_percentage
    );
    for unit in &report.units {
        let detail = if unit.total_items == 0 {
            "no work listed yet".to_string()
        } else {
            format!("{}/{} items", unit.completed_items, unit.total_items)
        };
        println!(
            "  week {:>2} {:<20} {:>3}%  {detail}",
            unit.week, unit.title, unit.percentage
        );
    }
    if let Some(next) = report.next_unit() {
        println!("continue with week {}: {}", next.week, next.title);
    }
}

#[tokio::main]
async fn main() {
    telemetry::init_tracing();
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            // At this layer (binary glue), printing once is fine.
            eprintln!("{err}");
            std::process::exit(2);
        }
    }
}
