use chrono::{
    DateTime, Duration, FixedOffset, Local, LocalResult, NaiveTime, Offset, TimeZone, Utc,
};

/// A simple clock abstraction for deterministic time in services and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock that uses the current system time.
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// Returns true if this clock is fixed.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Clock::Fixed(_))
    }
}

/// The zone whose calendar days bound the daily credit window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DayBoundary {
    /// The system's local time zone, DST included.
    #[default]
    Local,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

impl DayBoundary {
    /// Day boundary at UTC midnight.
    #[must_use]
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Returns the first instant of the calendar day following `now`.
    ///
    /// The result is always strictly later than `now`.
    #[must_use]
    pub fn next_midnight(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Local => next_midnight_in(&Local, now),
            Self::Fixed(offset) => next_midnight_in(offset, now),
        }
    }
}

/// Start of the next calendar day in `tz`.
///
/// When local midnight is skipped by a DST transition the first valid local
/// time of that day is used instead.
pub fn next_midnight_in<Tz: TimeZone>(tz: &Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let fallback = now + Duration::days(1);
    let today = now.with_timezone(tz).date_naive();
    let Some(tomorrow) = today.succ_opt() else {
        return fallback;
    };
    let start = tomorrow.and_time(NaiveTime::MIN);

    // Offsets change in steps of at least 15 minutes, so a scan of the first
    // few hours always reaches a representable local time.
    (0..=16)
        .map(|step| start + Duration::minutes(15 * step))
        .find_map(|candidate| match tz.from_local_datetime(&candidate) {
            LocalResult::Single(at) => Some(at.with_timezone(&Utc)),
            LocalResult::Ambiguous(early, late) => {
                let early = early.with_timezone(&Utc);
                Some(if early > now {
                    early
                } else {
                    late.with_timezone(&Utc)
                })
            }
            LocalResult::None => None,
        })
        .filter(|at| *at > now)
        .unwrap_or(fallback)
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::{Havana, Sao_Paulo};

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn next_midnight_utc_is_start_of_next_day() {
        let boundary = DayBoundary::utc();
        let next = boundary.next_midnight(at("2024-03-10T15:42:00Z"));
        assert_eq!(next, at("2024-03-11T00:00:00Z"));
    }

    #[test]
    fn next_midnight_at_exact_midnight_moves_a_full_day() {
        let boundary = DayBoundary::utc();
        let now = at("2024-03-11T00:00:00Z");
        assert_eq!(boundary.next_midnight(now), at("2024-03-12T00:00:00Z"));
    }

    #[test]
    fn next_midnight_uses_the_configured_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let boundary = DayBoundary::Fixed(offset);
        // 23:30 UTC is already 01:30 on the next local day.
        let next = boundary.next_midnight(at("2024-03-10T23:30:00Z"));
        assert_eq!(next, at("2024-03-11T22:00:00Z"));
    }

    #[test]
    fn next_midnight_handles_year_end() {
        let boundary = DayBoundary::utc();
        let next = boundary.next_midnight(at("2023-12-31T23:59:59Z"));
        assert_eq!(next, at("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn next_midnight_local_is_strictly_later() {
        let now = fixed_now();
        let next = DayBoundary::Local.next_midnight(now);
        assert!(next > now);
        assert!(next - now <= Duration::hours(26));
    }

    #[test]
    fn skipped_midnight_uses_first_valid_local_time() {
        // Sao Paulo jumped from 00:00 -03 to 01:00 -02 on 2018-11-04.
        let now = at("2018-11-03T15:00:00Z");
        let next = next_midnight_in(&Sao_Paulo, now);
        assert_eq!(next, at("2018-11-04T03:00:00Z"));
        let local = next.with_timezone(&Sao_Paulo);
        assert_eq!(local.time(), NaiveTime::from_hms_opt(1, 0, 0).unwrap());
    }

    #[test]
    fn repeated_midnight_uses_first_occurrence() {
        // Havana fell back from 01:00 -04 to 00:00 -05 on 2019-11-03, so
        // local midnight happened twice.
        let now = at("2019-11-02T16:00:00Z");
        assert!(matches!(
            Havana.from_local_datetime(&at("2019-11-03T00:00:00Z").naive_utc()),
            LocalResult::Ambiguous(..)
        ));
        assert_eq!(next_midnight_in(&Havana, now), at("2019-11-03T04:00:00Z"));
    }

    #[test]
    fn day_after_dst_change_starts_at_local_midnight() {
        // 00:30 -04 on the repeated day; the next boundary is a normal midnight.
        let now = at("2019-11-03T04:30:00Z");
        assert_eq!(next_midnight_in(&Havana, now), at("2019-11-04T05:00:00Z"));
    }

    #[test]
    fn fixed_clock_advances() {
        let mut clock = fixed_clock();
        clock.advance(Duration::hours(3));
        assert_eq!(clock.now(), fixed_now() + Duration::hours(3));
        assert!(clock.is_fixed());
    }
}
