// Interval parsing and next-run calculation
//
// Task intervals use the compact duration syntax: one or more
// `<number><unit>` components, e.g. `5m`, `1h30m`, `1.5h`, `90s`.

use crate::errors::ScheduleError;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

/// Shortest interval a task may be registered with
pub const MIN_INTERVAL: Duration = Duration::from_secs(60);

lazy_static! {
    static ref INTERVAL_RE: Regex =
        Regex::new(r"^(?:(?:\d+(?:\.\d*)?|\.\d+)(?:ns|us|µs|μs|ms|s|m|h))+$")
            .expect("interval pattern is valid");
    static ref COMPONENT_RE: Regex =
        Regex::new(r"(\d*)(?:\.(\d*))?(ns|us|µs|μs|ms|s|m|h)").expect("component pattern is valid");
}

fn unit_nanos(unit: &str) -> u128 {
    match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        _ => 3_600 * 1_000_000_000,
    }
}

fn invalid(interval: &str, reason: &str) -> ScheduleError {
    ScheduleError::InvalidInterval {
        interval: interval.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse an interval string into a duration
///
/// Accepts the bare `0` like the duration syntax it mirrors; signs are
/// rejected since a negative interval can never be scheduled.
pub fn parse_interval(interval: &str) -> Result<Duration, ScheduleError> {
    let s = interval.trim();
    if s.is_empty() {
        return Err(invalid(interval, "empty interval"));
    }
    if s.starts_with('-') || s.starts_with('+') {
        return Err(invalid(interval, "signed intervals are not supported"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if !INTERVAL_RE.is_match(s) {
        return Err(invalid(
            interval,
            "expected <number><unit> components with units ns, us, ms, s, m, h",
        ));
    }

    let mut total: u128 = 0;
    for caps in COMPONENT_RE.captures_iter(s) {
        let unit = unit_nanos(&caps[3]);
        let whole = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let frac = caps.get(2).map(|m| m.as_str()).unwrap_or("");

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| invalid(interval, "number out of range"))?
        };
        let frac_nanos = if frac.is_empty() {
            0
        } else {
            let fraction: f64 = format!("0.{}", frac)
                .parse()
                .map_err(|_| invalid(interval, "malformed fraction"))?;
            (fraction * unit as f64).round() as u128
        };

        total = whole
            .checked_mul(unit)
            .and_then(|n| n.checked_add(frac_nanos))
            .and_then(|n| total.checked_add(n))
            .ok_or_else(|| invalid(interval, "interval out of range"))?;
    }

    let secs = u64::try_from(total / 1_000_000_000)
        .map_err(|_| invalid(interval, "interval out of range"))?;
    Ok(Duration::new(secs, (total % 1_000_000_000) as u32))
}

/// Parse a task interval and enforce the one-minute minimum
pub fn parse_task_interval(interval: &str) -> Result<Duration, ScheduleError> {
    let duration = parse_interval(interval)?;
    if duration < MIN_INTERVAL {
        return Err(ScheduleError::IntervalTooShort {
            interval: interval.to_string(),
            minimum: "1m".to_string(),
        });
    }
    Ok(duration)
}

/// Next run time for a task that last became due (or was first seen) at `from`
pub fn next_run_at(from: DateTime<Utc>, interval: Duration) -> Result<DateTime<Utc>, ScheduleError> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|d| from.checked_add_signed(d))
        .ok_or_else(|| ScheduleError::InvalidInterval {
            interval: format!("{:?}", interval),
            reason: "next run time out of range".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_interval("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_interval("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_interval("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_interval("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_compound_and_fractional() {
        assert_eq!(parse_interval("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_interval("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_interval(".5m").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_interval("1m30s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "5", "m", "5x", "five minutes", "-5m", "1h-30m", "5 m"] {
            assert!(parse_interval(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_parse_trims_surrounding_whitespace() {
        assert_eq!(parse_interval(" 5m ").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn test_zero_parses_but_is_too_short() {
        assert_eq!(parse_interval("0").unwrap(), Duration::ZERO);
        assert!(matches!(
            parse_task_interval("0"),
            Err(ScheduleError::IntervalTooShort { .. })
        ));
    }

    #[test]
    fn test_task_interval_minimum() {
        assert!(parse_task_interval("59s").is_err());
        assert_eq!(parse_task_interval("1m").unwrap(), MIN_INTERVAL);
        assert_eq!(parse_task_interval("60s").unwrap(), MIN_INTERVAL);
    }

    #[test]
    fn test_next_run_at_adds_interval() {
        let from = Utc::now();
        let next = next_run_at(from, Duration::from_secs(300)).unwrap();
        assert_eq!((next - from).num_seconds(), 300);
    }

    proptest! {
        #[test]
        fn prop_minutes_round_trip(minutes in 1u64..100_000u64) {
            let parsed = parse_task_interval(&format!("{}m", minutes)).unwrap();
            prop_assert_eq!(parsed, Duration::from_secs(minutes * 60));
        }

        #[test]
        fn prop_hours_and_minutes_sum(hours in 0u64..1000u64, minutes in 0u64..60u64) {
            let parsed = parse_interval(&format!("{}h{}m", hours, minutes)).unwrap();
            prop_assert_eq!(parsed, Duration::from_secs(hours * 3600 + minutes * 60));
        }

        #[test]
        fn prop_unitless_numbers_rejected(n in 1u64..1_000_000u64) {
            prop_assert!(parse_interval(&n.to_string()).is_err());
        }
    }
}
