//! Next-occurrence computation for recurring renders
//!
//! Short intervals run continuously (`now + interval`). Intervals that divide
//! a day into one to four renders are anchored at quarter past fixed local
//! hours in the owner's timezone, so a daily render lands at 00:15 local
//! regardless of when the previous one finished.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Minute past the hour every daily slot fires at
pub const SLOT_MINUTE: u32 = 15;

const DAILY_SLOTS: &[u32] = &[0];
const TWICE_DAILY_SLOTS: &[u32] = &[0, 12];
const THRICE_DAILY_SLOTS: &[u32] = &[0, 8, 16];
const FOUR_TIMES_DAILY_SLOTS: &[u32] = &[0, 6, 12, 18];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshInterval {
    /// Fixed period, not anchored to the clock
    Continuous(Duration),
    /// Local hours (at `SLOT_MINUTE`) to render at each day
    DailySlots(&'static [u32]),
}

impl RefreshInterval {
    /// Map a stored interval in minutes
    ///
    /// Non-positive values are treated as one minute.
    pub fn from_minutes(minutes: i32) -> Self {
        match minutes {
            1440 => RefreshInterval::DailySlots(DAILY_SLOTS),
            720 => RefreshInterval::DailySlots(TWICE_DAILY_SLOTS),
            480 => RefreshInterval::DailySlots(THRICE_DAILY_SLOTS),
            360 => RefreshInterval::DailySlots(FOUR_TIMES_DAILY_SLOTS),
            other => RefreshInterval::Continuous(Duration::minutes(i64::from(other.max(1)))),
        }
    }
}

/// Computes when a recurring render should next run
pub trait ClockPolicy: Send + Sync {
    fn next_occurrence(
        &self,
        interval: RefreshInterval,
        timezone: Tz,
        now: DateTime<Utc>,
    ) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TimezoneClockPolicy;

impl ClockPolicy for TimezoneClockPolicy {
    fn next_occurrence(
        &self,
        interval: RefreshInterval,
        timezone: Tz,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        match interval {
            RefreshInterval::Continuous(period) => now + period,
            RefreshInterval::DailySlots(hours) => next_daily_slot(hours, timezone, now),
        }
    }
}

/// Earliest `hour:15` local instant strictly after `now`
fn next_daily_slot(hours: &[u32], timezone: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.with_timezone(&timezone).date_naive();

    // two days ahead covers any single-slot schedule plus DST shifts
    for day in today.iter_days().take(3) {
        for &hour in hours {
            if let Some(candidate) = resolve_slot(day, hour, timezone)
                && candidate > now
            {
                return candidate;
            }
        }
    }

    warn!(
        "No daily slot found for {} in {}, falling back to 24h",
        now, timezone
    );
    now + Duration::days(1)
}

/// Local slot time as UTC
///
/// Ambiguous times (clocks going back) take the earlier instant; times inside
/// a DST gap move forward by an hour.
fn resolve_slot(day: NaiveDate, hour: u32, timezone: Tz) -> Option<DateTime<Utc>> {
    let naive = day.and_hms_opt(hour, SLOT_MINUTE, 0)?;
    resolve_local(naive, timezone)
        .or_else(|| resolve_local(naive + Duration::hours(1), timezone))
}

fn resolve_local(naive: NaiveDateTime, timezone: Tz) -> Option<DateTime<Utc>> {
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(t) => Some(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// Parse an IANA timezone name, falling back to UTC
pub fn resolve_timezone(name: Option<&str>) -> Tz {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            warn!("Unknown timezone '{}', using UTC", name);
            Tz::UTC
        }),
        None => Tz::UTC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use proptest::prelude::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_interval_mapping() {
        assert_eq!(
            RefreshInterval::from_minutes(15),
            RefreshInterval::Continuous(Duration::minutes(15))
        );
        assert_eq!(
            RefreshInterval::from_minutes(1440),
            RefreshInterval::DailySlots(&[0])
        );
        assert_eq!(
            RefreshInterval::from_minutes(480),
            RefreshInterval::DailySlots(&[0, 8, 16])
        );
        assert_eq!(
            RefreshInterval::from_minutes(0),
            RefreshInterval::Continuous(Duration::minutes(1))
        );
    }

    #[test]
    fn test_continuous_is_not_anchored() {
        let now = utc("2025-03-10T10:07:33Z");
        let next = TimezoneClockPolicy.next_occurrence(
            RefreshInterval::from_minutes(30),
            Tz::Europe__London,
            now,
        );
        assert_eq!(next, now + Duration::minutes(30));
    }

    #[test]
    fn test_daily_before_and_after_slot() {
        let policy = TimezoneClockPolicy;
        let daily = RefreshInterval::from_minutes(1440);

        let early = utc("2025-06-01T00:05:00Z");
        assert_eq!(
            policy.next_occurrence(daily, Tz::UTC, early),
            utc("2025-06-01T00:15:00Z")
        );

        let late = utc("2025-06-01T00:15:00Z");
        assert_eq!(
            policy.next_occurrence(daily, Tz::UTC, late),
            utc("2025-06-02T00:15:00Z")
        );
    }

    #[test]
    fn test_daily_uses_owner_timezone() {
        // 2025-01-15 12:00 UTC is 07:00 in New York (EST, UTC-5)
        let now = utc("2025-01-15T12:00:00Z");
        let next = TimezoneClockPolicy.next_occurrence(
            RefreshInterval::from_minutes(1440),
            Tz::America__New_York,
            now,
        );
        assert_eq!(next, utc("2025-01-16T05:15:00Z"));
    }

    #[test]
    fn test_multi_slot_picks_next_hour() {
        let policy = TimezoneClockPolicy;
        let four = RefreshInterval::from_minutes(360);

        assert_eq!(
            policy.next_occurrence(four, Tz::UTC, utc("2025-06-01T06:14:59Z")),
            utc("2025-06-01T06:15:00Z")
        );
        assert_eq!(
            policy.next_occurrence(four, Tz::UTC, utc("2025-06-01T06:20:00Z")),
            utc("2025-06-01T12:15:00Z")
        );
        // rolls to the first slot of the next day
        assert_eq!(
            policy.next_occurrence(four, Tz::UTC, utc("2025-06-01T18:30:00Z")),
            utc("2025-06-02T00:15:00Z")
        );
    }

    #[test]
    fn test_resolve_timezone() {
        assert_eq!(resolve_timezone(Some("Asia/Tokyo")), Tz::Asia__Tokyo);
        assert_eq!(resolve_timezone(Some("Mars/Olympus")), Tz::UTC);
        assert_eq!(resolve_timezone(Some("")), Tz::UTC);
        assert_eq!(resolve_timezone(None), Tz::UTC);
    }

    const ZONES: &[Tz] = &[
        Tz::UTC,
        Tz::Europe__London,
        Tz::Europe__Berlin,
        Tz::America__New_York,
        Tz::America__Los_Angeles,
        Tz::Asia__Tokyo,
        Tz::Asia__Kolkata,
        Tz::Australia__Sydney,
        Tz::Pacific__Auckland,
    ];

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_daily_slot_is_quarter_past_midnight_local(
            secs in 1_600_000_000i64..1_900_000_000i64,
            zone in 0..ZONES.len(),
        ) {
            let tz = ZONES[zone];
            let now = DateTime::from_timestamp(secs, 0).unwrap();
            let next = TimezoneClockPolicy.next_occurrence(
                RefreshInterval::from_minutes(1440),
                tz,
                now,
            );
            let local = next.with_timezone(&tz);

            prop_assert!(next > now);
            prop_assert!(next - now <= Duration::hours(25));
            prop_assert_eq!(local.hour(), 0);
            prop_assert_eq!(local.minute(), 15);
        }

        #[test]
        fn prop_slots_land_on_configured_hours(
            secs in 1_600_000_000i64..1_900_000_000i64,
            minutes in prop::sample::select(vec![720, 480, 360]),
            zone in 0..ZONES.len(),
        ) {
            let tz = ZONES[zone];
            let interval = RefreshInterval::from_minutes(minutes);
            let RefreshInterval::DailySlots(hours) = interval else {
                unreachable!();
            };
            let now = DateTime::from_timestamp(secs, 0).unwrap();
            let local = TimezoneClockPolicy
                .next_occurrence(interval, tz, now)
                .with_timezone(&tz);

            prop_assert_eq!(local.minute(), 15);
            prop_assert!(hours.contains(&local.hour()));
        }
    }
}
