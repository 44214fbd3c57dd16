//! A 5-field cron expression parser: `minute hour day-of-month month day-of-week`.
//!
//! Supports `*`, `*/N` (step), `N` (literal), `N-M` (range), and `N,M` (list).
//! Each field compiles to a bitmask of admissible values, so a match is five
//! bit tests. Matching is evaluated against any timezone-projected datetime:
//! one expression means the same wall-clock time year round in the configured
//! zone, daylight saving included.

use chrono::{Datelike, Timelike};
use hearth_core::error::EngineError;

/// The admissible values of one cron field, packed into a bitmask.
/// Field domains top out at 59, so a u64 always fits.
#[derive(Debug, Clone, Copy)]
struct FieldSet {
    bits: u64,
}

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        value < 64 && self.bits >> value & 1 == 1
    }

    #[cfg(test)]
    fn len(self) -> u32 {
        self.bits.count_ones()
    }

    /// Compile one comma-separated field within `[lo, hi]`.
    fn compile(raw: &str, lo: u32, hi: u32) -> Result<Self, String> {
        let mut bits = 0u64;

        for part in raw.split(',').map(str::trim) {
            let (span, step) = match part.split_once('/') {
                Some((span, step)) => {
                    let step: u32 = step.parse().map_err(|_| format!("bad step `{step}`"))?;
                    if step == 0 {
                        return Err("step of zero".into());
                    }
                    (span, step)
                }
                None => (part, 1),
            };

            let (first, last) = match span {
                "*" => (lo, hi),
                span => match span.split_once('-') {
                    Some((a, b)) => (bounded(a, lo, hi)?, bounded(b, lo, hi)?),
                    // a bare value with a step opens toward the top of the field
                    None if part.contains('/') => (bounded(span, lo, hi)?, hi),
                    None => {
                        let only = bounded(span, lo, hi)?;
                        (only, only)
                    }
                },
            };
            if first > last {
                return Err(format!("inverted range {first}-{last}"));
            }

            for value in (first..=last).step_by(step as usize) {
                bits |= 1 << value;
            }
        }

        if bits == 0 {
            return Err("empty field".into());
        }
        Ok(Self { bits })
    }
}

fn bounded(s: &str, lo: u32, hi: u32) -> Result<u32, String> {
    let value: u32 = s.parse().map_err(|_| format!("bad number `{s}`"))?;
    if value < lo || value > hi {
        return Err(format!("{value} outside {lo}-{hi}"));
    }
    Ok(value)
}

/// A parsed cron expression.
#[derive(Debug, Clone)]
pub struct CronExpr {
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet, // 0=Sun, 6=Sat
}

impl CronExpr {
    /// Parse a standard 5-field cron expression.
    pub fn parse(expr: &str) -> Result<Self, EngineError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields[..] else {
            return Err(EngineError::InvalidCron(format!(
                "want 5 fields (minute hour dom month dow), found {}",
                fields.len()
            )));
        };

        let field = |name, raw, lo, hi| {
            FieldSet::compile(raw, lo, hi)
                .map_err(|e| EngineError::InvalidCron(format!("{name} field: {e}")))
        };

        Ok(CronExpr {
            minutes: field("minute", minute, 0, 59)?,
            hours: field("hour", hour, 0, 23)?,
            days_of_month: field("day-of-month", dom, 1, 31)?,
            months: field("month", month, 1, 12)?,
            days_of_week: field("day-of-week", dow, 0, 6)?,
        })
    }

    /// Check whether a (timezone-projected) datetime matches.
    pub fn matches<T: Datelike + Timelike>(&self, dt: &T) -> bool {
        self.minutes.contains(dt.minute())
            && self.hours.contains(dt.hour())
            && self.days_of_month.contains(dt.day())
            && self.months.contains(dt.month())
            && self.days_of_week.contains(dt.weekday().num_days_from_sunday())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::America::Los_Angeles;

    #[test]
    fn every_minute() {
        let expr = CronExpr::parse("* * * * *").unwrap();
        assert_eq!(expr.minutes.len(), 60);
        assert_eq!(expr.hours.len(), 24);
        assert!(expr.minutes.contains(0));
        assert!(expr.minutes.contains(59));
    }

    #[test]
    fn specific_time_weekdays() {
        let expr = CronExpr::parse("30 9 * * 1-5").unwrap();
        assert_eq!(expr.minutes.len(), 1);
        assert!(expr.minutes.contains(30));
        assert!(expr.hours.contains(9));
        for weekday in 1..=5 {
            assert!(expr.days_of_week.contains(weekday));
        }
        assert!(!expr.days_of_week.contains(0));
        assert!(!expr.days_of_week.contains(6));
    }

    #[test]
    fn step_field() {
        let expr = CronExpr::parse("*/15 * * * *").unwrap();
        assert_eq!(expr.minutes.len(), 4);
        for minute in [0, 15, 30, 45] {
            assert!(expr.minutes.contains(minute));
        }

        let hours = CronExpr::parse("0 */2 * * *").unwrap();
        assert_eq!(hours.hours.len(), 12);
        assert!(hours.hours.contains(22));
        assert!(!hours.hours.contains(21));
    }

    #[test]
    fn step_with_base_opens_to_field_max() {
        let expr = CronExpr::parse("10/20 * * * *").unwrap();
        for minute in [10, 30, 50] {
            assert!(expr.minutes.contains(minute));
        }
        assert_eq!(expr.minutes.len(), 3);
    }

    #[test]
    fn list_field() {
        let expr = CronExpr::parse("0,30 * * * *").unwrap();
        assert_eq!(expr.minutes.len(), 2);
        assert!(expr.minutes.contains(0));
        assert!(expr.minutes.contains(30));
    }

    #[test]
    fn matches_datetime() {
        // "At 09:30 on weekdays"
        let expr = CronExpr::parse("30 9 * * 1-5").unwrap();

        // 2026-02-23 is a Monday (dow=1)
        let monday_930 = NaiveDate::from_ymd_opt(2026, 2, 23)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert!(expr.matches(&monday_930));

        // 2026-02-22 is a Sunday — should NOT match
        let sunday_930 = NaiveDate::from_ymd_opt(2026, 2, 22)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert!(!expr.matches(&sunday_930));

        // Monday but wrong time
        let monday_1000 = NaiveDate::from_ymd_opt(2026, 2, 23)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert!(!expr.matches(&monday_1000));
    }

    #[test]
    fn matches_in_projected_timezone() {
        // 7am in Los Angeles is 15:00 UTC (PST)
        let expr = CronExpr::parse("0 7 * * *").unwrap();
        let utc = chrono::Utc.with_ymd_and_hms(2026, 1, 15, 15, 0, 0).unwrap();
        let local = utc.with_timezone(&Los_Angeles);
        assert!(expr.matches(&local));
        assert!(!expr.matches(&utc));
    }

    #[test]
    fn invalid_field_count() {
        assert!(CronExpr::parse("* * *").is_err());
        assert!(CronExpr::parse("* * * * * *").is_err());
    }

    #[test]
    fn out_of_range_minute() {
        assert!(CronExpr::parse("70 * * * *").is_err());
    }

    #[test]
    fn zero_step_rejected() {
        assert!(CronExpr::parse("*/0 * * * *").is_err());
    }

    #[test]
    fn inverted_range_rejected() {
        assert!(CronExpr::parse("30-10 * * * *").is_err());
    }

    #[test]
    fn garbage_rejected() {
        assert!(CronExpr::parse("not a cron").is_err());
        assert!(CronExpr::parse("a b c d e").is_err());
    }
}
