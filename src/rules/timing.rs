// src/rules/timing.rs - Time windows during which a guild enforces toki pona

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimingError {
    #[error("invalid cron expression '{0}'")]
    InvalidCron(String),
    #[error("invalid timezone '{0}'")]
    InvalidTimezone(String),
    #[error("invalid event length '{0}'")]
    InvalidLength(String),
}

/// When a guild's checks are active
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Timing {
    #[default]
    Always,
    Never,
    /// The day following each new and full moon
    Moon,
    /// Recurring window: starts on `cron` in `timezone`, lasts `length`
    Cron {
        cron: String,
        timezone: String,
        length: String,
    },
}

impl Timing {
    pub fn is_active(&self, now: DateTime<Utc>, clock: &dyn PhaseClock) -> Result<bool, TimingError> {
        match self {
            Timing::Always => Ok(true),
            Timing::Never => Ok(false),
            Timing::Moon => Ok(in_major_phase(clock.phase_degrees(now))),
            Timing::Cron { cron, timezone, length } => {
                Ok(EventTimer::new(cron, timezone, length)?.in_range_at(now))
            }
        }
    }

    /// Parse the parameters eagerly so bad input is rejected when stored
    pub fn validate(&self) -> Result<(), TimingError> {
        if let Timing::Cron { cron, timezone, length } = self {
            EventTimer::new(cron, timezone, length)?;
        }
        Ok(())
    }
}

pub const SYNODIC_MONTH_DAYS: f64 = 29.530588853;
/// Degrees covered by the "day" after a new or full moon
pub const MAJOR_PHASE_SPAN_DEG: f64 = 360.0 / 30.0;
const NEW_MOON_DEG: f64 = 0.0;
const FULL_MOON_DEG: f64 = 180.0;

/// Source of lunar phase angles: 0 is new, 180 is full
pub trait PhaseClock: Send + Sync {
    fn phase_degrees(&self, at: DateTime<Utc>) -> f64;
}

/// Mean synodic month counted from the new moon of 2000-01-06 18:14 UTC.
/// Drifts from the true moon by up to about half a day.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanLunarPhase;

impl MeanLunarPhase {
    fn reference() -> DateTime<Utc> {
        // 2000-01-06T18:14:00Z
        DateTime::<Utc>::from_timestamp(947_182_440, 0).unwrap_or_default()
    }

    fn month() -> Duration {
        Duration::milliseconds((SYNODIC_MONTH_DAYS * 86_400_000.0) as i64)
    }

    /// Start times of the next `n` new and full moons after `from`, in order,
    /// flagged `true` for full moons
    pub fn next_major_phases(&self, from: DateTime<Utc>, n: usize) -> Vec<(DateTime<Utc>, bool)> {
        let half = Duration::milliseconds(Self::month().num_milliseconds() / 2);
        let elapsed = (from - Self::reference()).num_milliseconds();
        let mut k = elapsed.div_euclid(half.num_milliseconds());
        let mut phases = Vec::with_capacity(n);
        while phases.len() < n {
            let at = Self::reference() + Duration::milliseconds(k * half.num_milliseconds());
            if at > from {
                phases.push((at, k.rem_euclid(2) == 1));
            }
            k += 1;
        }
        phases
    }
}

impl PhaseClock for MeanLunarPhase {
    fn phase_degrees(&self, at: DateTime<Utc>) -> f64 {
        let days = (at - Self::reference()).num_seconds() as f64 / 86_400.0;
        (days / SYNODIC_MONTH_DAYS).rem_euclid(1.0) * 360.0
    }
}

pub fn in_major_phase(degrees: f64) -> bool {
    (NEW_MOON_DEG..NEW_MOON_DEG + MAJOR_PHASE_SPAN_DEG).contains(&degrees)
        || (FULL_MOON_DEG..FULL_MOON_DEG + MAJOR_PHASE_SPAN_DEG).contains(&degrees)
}

/// How far `prev`/`next` search before giving up; covers schedules that only
/// fire on 29 February.
const MAX_SEARCH_DAYS: u32 = 366 * 8;

/// Five-field cron schedule: minute hour day-of-month month day-of-week
#[derive(Debug, Clone, PartialEq, Eq)]
struct CronSchedule {
    minutes: Vec<bool>,
    hours: Vec<bool>,
    days: Vec<bool>,
    months: Vec<bool>,
    weekdays: Vec<bool>,
    days_any: bool,
    weekdays_any: bool,
}

impl CronSchedule {
    fn parse(expr: &str) -> Result<Self, TimingError> {
        let invalid = || TimingError::InvalidCron(expr.to_string());
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, day, month, weekday] = fields.as_slice() else {
            return Err(invalid());
        };

        let mut weekdays = parse_field(weekday, 0, 7).ok_or_else(invalid)?;
        // 7 is another name for Sunday
        if weekdays[7] {
            weekdays[0] = true;
        }
        weekdays.truncate(7);

        Ok(Self {
            minutes: parse_field(minute, 0, 59).ok_or_else(invalid)?,
            hours: parse_field(hour, 0, 23).ok_or_else(invalid)?,
            days: parse_field(day, 1, 31).ok_or_else(invalid)?,
            months: parse_field(month, 1, 12).ok_or_else(invalid)?,
            weekdays,
            days_any: *day == "*",
            weekdays_any: *weekday == "*",
        })
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        if !self.months[date.month() as usize] {
            return false;
        }
        let dom = self.days[date.day() as usize];
        let dow = self.weekdays[date.weekday().num_days_from_sunday() as usize];
        // Both restricted: either may match
        match (self.days_any, self.weekdays_any) {
            (false, false) => dom || dow,
            _ => dom && dow,
        }
    }

    /// Latest firing at or before `t`
    fn prev(&self, t: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut date = t.date();
        for offset in 0..MAX_SEARCH_DAYS {
            if self.day_matches(date) {
                let limit = if offset == 0 { (t.hour(), t.minute()) } else { (23, 59) };
                let found = (0..=limit.0).rev().filter(|h| self.hours[*h as usize]).find_map(|h| {
                    let last_minute = if h == limit.0 { limit.1 } else { 59 };
                    (0..=last_minute)
                        .rev()
                        .find(|m| self.minutes[*m as usize])
                        .and_then(|m| date.and_hms_opt(h, m, 0))
                });
                if found.is_some() {
                    return found;
                }
            }
            date = date.pred_opt()?;
        }
        None
    }

    /// Earliest firing strictly after `t`
    fn next(&self, t: NaiveDateTime) -> Option<NaiveDateTime> {
        let start = t.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let mut date = start.date();
        for offset in 0..MAX_SEARCH_DAYS {
            if self.day_matches(date) {
                let floor = if offset == 0 { (start.hour(), start.minute()) } else { (0, 0) };
                let found = (floor.0..24).filter(|h| self.hours[*h as usize]).find_map(|h| {
                    let first_minute = if h == floor.0 { floor.1 } else { 0 };
                    (first_minute..60)
                        .find(|m| self.minutes[*m as usize])
                        .and_then(|m| date.and_hms_opt(h, m, 0))
                });
                if found.is_some() {
                    return found;
                }
            }
            date = date.succ_opt()?;
        }
        None
    }
}

/// One cron field as a membership table indexed by value. Supports `*`,
/// single values, `a-b` ranges, `/step` on either, and comma lists.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<bool>> {
    let mut allowed = vec![false; max as usize + 1];
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, step.parse::<u32>().ok().filter(|s| *s > 0)?),
            None => (part, 1),
        };
        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (lo.parse().ok()?, hi.parse().ok()?)
        } else {
            let value: u32 = range.parse().ok()?;
            // "5/15" runs from 5 to the end of the field
            if part.contains('/') {
                (value, max)
            } else {
                (value, value)
            }
        };
        if lo < min || hi > max || lo > hi {
            return None;
        }
        for value in (lo..=hi).step_by(step as usize) {
            allowed[value as usize] = true;
        }
    }
    Some(allowed)
}

/// Fixed UTC offsets: "UTC", "Z", "+05:30", "-0800", "UTC+2", "GMT-3:30"
pub fn parse_timezone(tz: &str) -> Result<FixedOffset, TimingError> {
    let invalid = || TimingError::InvalidTimezone(tz.to_string());
    let trimmed = tz.trim();
    let upper = trimmed.to_uppercase();
    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);
    if rest.is_empty() || rest == "Z" {
        if trimmed.is_empty() {
            return Err(invalid());
        }
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, digits) = if let Some(d) = rest.strip_prefix('+') {
        (1, d)
    } else if let Some(d) = rest.strip_prefix('-') {
        (-1, d)
    } else {
        return Err(invalid());
    };
    if !digits.is_ascii() {
        return Err(invalid());
    }
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes >= 60 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Durations like "1h30m", "2d", "45m", "90s". A bare number means minutes.
pub fn parse_length(length: &str) -> Result<Duration, TimingError> {
    let invalid = || TimingError::InvalidLength(length.to_string());
    let trimmed = length.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(invalid());
    }
    if let Ok(minutes) = trimmed.parse::<i64>() {
        return if minutes > 0 { Ok(Duration::minutes(minutes)) } else { Err(invalid()) };
    }

    let mut total = Duration::zero();
    let mut number = String::new();
    for c in trimmed.chars().filter(|c| !c.is_whitespace()) {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let n: i64 = number.parse().map_err(|_| invalid())?;
        number.clear();
        total = total
            + match c {
                'd' => Duration::days(n),
                'h' => Duration::hours(n),
                'm' => Duration::minutes(n),
                's' => Duration::seconds(n),
                _ => return Err(invalid()),
            };
    }
    if !number.is_empty() || total <= Duration::zero() {
        return Err(invalid());
    }
    Ok(total)
}

/// Zone an event schedule is written in. Named zones follow daylight saving.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventZone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl EventZone {
    /// Fixed offsets first ("UTC", "+05:30"), then IANA names ("America/New_York")
    pub fn parse(tz: &str) -> Result<Self, TimingError> {
        if let Ok(offset) = parse_timezone(tz) {
            return Ok(EventZone::Fixed(offset));
        }
        tz.trim()
            .parse::<Tz>()
            .map(EventZone::Named)
            .map_err(|_| TimingError::InvalidTimezone(tz.to_string()))
    }

    fn naive_local(&self, at: DateTime<Utc>) -> NaiveDateTime {
        match self {
            EventZone::Fixed(offset) => at.with_timezone(offset).naive_local(),
            EventZone::Named(tz) => at.with_timezone(tz).naive_local(),
        }
    }

    /// Wall-clock time to an instant. Times skipped by a daylight saving
    /// jump have none; repeated times take the earlier instant.
    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            EventZone::Fixed(offset) => offset.from_local_datetime(&naive).single(),
            EventZone::Named(tz) => tz.from_local_datetime(&naive).earliest().map(|t| t.fixed_offset()),
        }
    }
}

/// A recurring event: starts whenever the cron schedule fires in the given
/// timezone, lasts a fixed length
#[derive(Debug, Clone)]
pub struct EventTimer {
    schedule: CronSchedule,
    zone: EventZone,
    length: Duration,
}

impl EventTimer {
    pub fn new(cron: &str, timezone: &str, length: &str) -> Result<Self, TimingError> {
        Ok(Self {
            schedule: CronSchedule::parse(cron)?,
            zone: EventZone::parse(timezone)?,
            length: parse_length(length)?,
        })
    }

    pub fn length(&self) -> Duration {
        self.length
    }

    pub fn zone(&self) -> EventZone {
        self.zone
    }

    pub fn in_range_at(&self, now: DateTime<Utc>) -> bool {
        let local = self.zone.naive_local(now);
        match self.schedule.prev(local).and_then(|n| self.zone.localize(n)) {
            Some(last) => {
                let last = last.with_timezone(&Utc);
                last <= now && now < last + self.length
            }
            None => false,
        }
    }

    pub fn now_in_range(&self) -> bool {
        self.in_range_at(Utc::now())
    }

    pub fn starts_after(&self, from: DateTime<Utc>, n: usize) -> Vec<DateTime<FixedOffset>> {
        let mut cursor = self.zone.naive_local(from);
        let mut starts = Vec::with_capacity(n);
        while starts.len() < n {
            let Some(next) = self.schedule.next(cursor) else { break };
            // firings inside a skipped hour do not happen
            if let Some(local) = self.zone.localize(next) {
                starts.push(local);
            }
            cursor = next;
        }
        starts
    }

    pub fn starts(&self, n: usize) -> Vec<DateTime<FixedOffset>> {
        self.starts_after(Utc::now(), n)
    }

    pub fn ranges(&self, n: usize) -> Vec<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        self.starts(n).into_iter().map(|s| (s, s + self.length)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_weekly_window() {
        // Saturdays 18:00-20:00 UTC; 2024-06-01 is a Saturday
        let timer = EventTimer::new("0 18 * * 6", "UTC", "2h").unwrap();
        assert!(timer.in_range_at(utc(2024, 6, 1, 18, 0)));
        assert!(timer.in_range_at(utc(2024, 6, 1, 19, 59)));
        assert!(!timer.in_range_at(utc(2024, 6, 1, 20, 0)));
        assert!(!timer.in_range_at(utc(2024, 6, 1, 17, 59)));
        assert!(!timer.in_range_at(utc(2024, 6, 2, 18, 30)));
    }

    #[test]
    fn test_timezone_shifts_window() {
        let timer = EventTimer::new("0 9 * * *", "+05:30", "30m").unwrap();
        // 09:00 at +05:30 is 03:30 UTC
        assert!(timer.in_range_at(utc(2024, 1, 10, 3, 45)));
        assert!(!timer.in_range_at(utc(2024, 1, 10, 9, 15)));
    }

    #[test]
    fn test_named_zone_follows_daylight_saving() {
        let timer = EventTimer::new("0 9 * * *", "America/New_York", "1h").unwrap();
        assert!(matches!(timer.zone(), EventZone::Named(_)));
        // 09:00 EST is 14:00 UTC in winter, 09:00 EDT is 13:00 UTC in summer
        assert!(timer.in_range_at(utc(2024, 1, 10, 14, 30)));
        assert!(!timer.in_range_at(utc(2024, 1, 10, 13, 30)));
        assert!(timer.in_range_at(utc(2024, 7, 10, 13, 30)));
        assert!(!timer.in_range_at(utc(2024, 7, 10, 14, 30)));

        // clocks go forward on 2024-03-10
        let starts = timer.starts_after(utc(2024, 3, 9, 0, 0), 2);
        let offsets: Vec<i32> = starts.iter().map(|s| s.offset().local_minus_utc()).collect();
        assert_eq!(offsets, vec![-5 * 3600, -4 * 3600]);
        assert!(starts.iter().all(|s| s.hour() == 9));
    }

    #[test]
    fn test_skipped_hour_has_no_start() {
        // 02:30 does not exist in New York on 2024-03-10
        let timer = EventTimer::new("30 2 * * *", "America/New_York", "30m").unwrap();
        let starts = timer.starts_after(utc(2024, 3, 9, 12, 0), 2);
        let days: Vec<u32> = starts.iter().map(|s| s.day()).collect();
        assert_eq!(days, vec![11, 12]);
    }

    #[test]
    fn test_window_spanning_midnight() {
        let timer = EventTimer::new("0 23 * * *", "UTC", "2h").unwrap();
        assert!(timer.in_range_at(utc(2024, 3, 2, 0, 30)));
        assert!(!timer.in_range_at(utc(2024, 3, 2, 1, 0)));
    }

    #[test]
    fn test_next_starts_and_ranges() {
        let timer = EventTimer::new("*/15 * * * *", "UTC", "5m").unwrap();
        let starts = timer.starts_after(utc(2024, 5, 5, 10, 7), 3);
        let minutes: Vec<u32> = starts.iter().map(|s| s.minute()).collect();
        assert_eq!(minutes, vec![15, 30, 45]);

        let ranges = timer.ranges(2);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].1 - ranges[0].0, Duration::minutes(5));
    }

    #[test]
    fn test_day_of_month_or_weekday() {
        // 1st of the month or any Monday
        let schedule = CronSchedule::parse("0 0 1 * 1").unwrap();
        assert!(schedule.day_matches(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()));
        assert!(schedule.day_matches(NaiveDate::from_ymd_opt(2024, 7, 8).unwrap()));
        assert!(!schedule.day_matches(NaiveDate::from_ymd_opt(2024, 7, 9).unwrap()));
    }

    #[test]
    fn test_leap_day_schedule() {
        let schedule = CronSchedule::parse("0 12 29 2 *").unwrap();
        let after = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let next = schedule.next(after).unwrap();
        assert_eq!(next.date(), NaiveDate::from_ymd_opt(2028, 2, 29).unwrap());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(EventTimer::new("0 18 * *", "UTC", "1h"), Err(TimingError::InvalidCron(_))));
        assert!(matches!(EventTimer::new("61 * * * *", "UTC", "1h"), Err(TimingError::InvalidCron(_))));
        assert!(matches!(EventTimer::new("*/0 * * * *", "UTC", "1h"), Err(TimingError::InvalidCron(_))));
        assert!(matches!(EventTimer::new("0 0 * * *", "Mars/Olympus", "1h"), Err(TimingError::InvalidTimezone(_))));
        assert!(matches!(EventTimer::new("0 0 * * *", "", "1h"), Err(TimingError::InvalidTimezone(_))));
        assert!(matches!(EventTimer::new("0 0 * * *", "UTC", "soon"), Err(TimingError::InvalidLength(_))));
        assert!(matches!(EventTimer::new("0 0 * * *", "UTC", "0"), Err(TimingError::InvalidLength(_))));
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length("1h30m").unwrap(), Duration::minutes(90));
        assert_eq!(parse_length("2d").unwrap(), Duration::days(2));
        assert_eq!(parse_length("45").unwrap(), Duration::minutes(45));
        assert!(parse_length("1h30").is_err());
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_timezone("utc+2").unwrap().local_minus_utc(), 7200);
        assert_eq!(parse_timezone("-0800").unwrap().local_minus_utc(), -8 * 3600);
        assert_eq!(parse_timezone("GMT-3:30").unwrap().local_minus_utc(), -(3 * 3600 + 1800));
        assert!(parse_timezone("+25").is_err());
    }

    #[test]
    fn test_major_phase_bounds() {
        assert!(in_major_phase(0.0));
        assert!(in_major_phase(11.9));
        assert!(!in_major_phase(12.0));
        assert!(in_major_phase(180.0));
        assert!(!in_major_phase(192.0));
        assert!(!in_major_phase(90.0));
    }

    #[test]
    fn test_mean_phase_clock() {
        let clock = MeanLunarPhase;
        // reference new moon and half a month later
        assert!(clock.phase_degrees(MeanLunarPhase::reference()) < 1e-6);
        let full = MeanLunarPhase::reference() + Duration::hours((SYNODIC_MONTH_DAYS * 12.0) as i64);
        assert!((clock.phase_degrees(full) - 180.0).abs() < 1.0);

        let phases = clock.next_major_phases(utc(2024, 1, 1, 0, 0), 4);
        assert_eq!(phases.len(), 4);
        assert!(phases.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 != w[1].1));
        for (at, _) in phases {
            assert!(Timing::Moon.is_active(at + Duration::hours(1), &clock).unwrap());
        }
    }

    #[test]
    fn test_timing_methods() {
        let clock = MeanLunarPhase;
        let now = utc(2024, 6, 1, 18, 30);
        assert!(Timing::Always.is_active(now, &clock).unwrap());
        assert!(!Timing::Never.is_active(now, &clock).unwrap());
        let cron = Timing::Cron {
            cron: "0 18 * * 6".to_string(),
            timezone: "UTC".to_string(),
            length: "1h".to_string(),
        };
        assert!(cron.is_active(now, &clock).unwrap());
        assert!(cron.validate().is_ok());
    }

    #[test]
    fn test_timing_serde_shape() {
        let timing: Timing = serde_yaml::from_str("method: cron\ncron: '0 18 * * 6'\ntimezone: UTC\nlength: 2h\n").unwrap();
        assert!(matches!(timing, Timing::Cron { .. }));
        let moon: Timing = serde_json::from_str(r#"{"method":"moon"}"#).unwrap();
        assert_eq!(moon, Timing::Moon);
    }
}
