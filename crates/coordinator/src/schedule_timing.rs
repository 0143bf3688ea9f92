//! 调度计划的触发时间计算
//!
//! 所有时间均为 UTC。`day_of_week` 采用 ISO 编号，1 为星期一，7 为星期日。

use chrono::{DateTime, Datelike, Days, NaiveTime, Utc};

use edge_core::models::{Schedule, ScheduleType};

/// 调度计划载入或修改后的首次触发时间
///
/// STARTUP 与 MANUAL 不由定时器驱动，返回 None。
/// INTERVAL 立即触发，之后的触发从这一刻起按 `repeat` 累加。
pub fn initial_start_time(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !schedule.enabled {
        return None;
    }
    match schedule.schedule_type {
        ScheduleType::Interval => Some(now),
        ScheduleType::Timed => schedule
            .time_of_day
            .and_then(|time| next_timed_occurrence(now, time, schedule.day_of_week)),
        ScheduleType::Startup | ScheduleType::Manual => None,
    }
}

/// 一次触发（包括因互斥被跳过的触发）之后的下一次触发时间
///
/// INTERVAL 从上一次计划触发时刻起累加 `repeat`，跳过已经错过的周期；
/// `repeat` 为 0 表示只执行一次。
pub fn following_start_time(
    schedule: &Schedule,
    fired_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !schedule.enabled {
        return None;
    }
    match schedule.schedule_type {
        ScheduleType::Interval => {
            if schedule.repeat.is_zero() {
                return None;
            }
            let repeat = chrono::Duration::from_std(schedule.repeat).ok()?;
            let mut next = fired_at.checked_add_signed(repeat)?;
            if next <= now {
                let missed = (now - next).num_milliseconds() / repeat.num_milliseconds().max(1) + 1;
                next = next.checked_add_signed(repeat * i32::try_from(missed).ok()?)?;
            }
            Some(next)
        }
        ScheduleType::Timed => schedule
            .time_of_day
            .and_then(|time| next_timed_occurrence(fired_at.max(now), time, schedule.day_of_week)),
        ScheduleType::Startup | ScheduleType::Manual => None,
    }
}

/// 严格晚于 `after` 的下一个 `(day_of_week, time_of_day)`，未指定星期时为每天
pub fn next_timed_occurrence(
    after: DateTime<Utc>,
    time_of_day: NaiveTime,
    day_of_week: Option<u8>,
) -> Option<DateTime<Utc>> {
    let mut candidate = after.date_naive().and_time(time_of_day).and_utc();
    if candidate <= after {
        candidate = candidate.checked_add_days(Days::new(1))?;
    }

    if let Some(day) = day_of_week {
        let current = i64::from(candidate.weekday().number_from_monday());
        let delta = (i64::from(day) - current).rem_euclid(7);
        candidate = candidate.checked_add_days(Days::new(delta as u64))?;
    }
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};
    use std::time::Duration;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_timed_without_day_fires_daily() {
        // 2024-01-01 是星期一
        let now = at(2024, 1, 1, 10, 0);
        let schedule = Schedule::timed("backup", "backup", time(9, 0), None);

        let first = initial_start_time(&schedule, now).unwrap();
        assert_eq!(first, at(2024, 1, 2, 9, 0));

        let second = following_start_time(&schedule, first, first).unwrap();
        assert_eq!(second, at(2024, 1, 3, 9, 0));
    }

    #[test]
    fn test_timed_later_today() {
        let now = at(2024, 1, 1, 8, 0);
        assert_eq!(
            next_timed_occurrence(now, time(9, 30), None),
            Some(at(2024, 1, 1, 9, 30))
        );
    }

    #[test]
    fn test_timed_with_day_of_week() {
        let monday_morning = at(2024, 1, 1, 8, 0);
        // 星期日
        let next = next_timed_occurrence(monday_morning, time(3, 0), Some(7)).unwrap();
        assert_eq!(next, at(2024, 1, 7, 3, 0));
        assert_eq!(next.weekday(), Weekday::Sun);

        // 当天时刻已过，下周同一天
        let monday_noon = at(2024, 1, 1, 12, 0);
        let next = next_timed_occurrence(monday_noon, time(9, 0), Some(1)).unwrap();
        assert_eq!(next, at(2024, 1, 8, 9, 0));

        // 当天时刻未到
        let next = next_timed_occurrence(monday_morning, time(9, 0), Some(1)).unwrap();
        assert_eq!(next, at(2024, 1, 1, 9, 0));
    }

    #[test]
    fn test_interval_fires_immediately_then_every_repeat() {
        let now = at(2024, 1, 1, 0, 0);
        let schedule = Schedule::interval("stats", "stats", Duration::from_secs(15));

        let first = initial_start_time(&schedule, now).unwrap();
        assert_eq!(first, now);
        assert_eq!(
            following_start_time(&schedule, first, now),
            Some(now + chrono::Duration::seconds(15))
        );
    }

    #[test]
    fn test_interval_skips_missed_periods() {
        let schedule = Schedule::interval("stats", "stats", Duration::from_secs(10));
        let fired_at = at(2024, 1, 1, 0, 0);

        let next = following_start_time(&schedule, fired_at, fired_at).unwrap();
        assert_eq!(next, fired_at + chrono::Duration::seconds(10));

        // 错过了若干周期，下一次仍对齐到 repeat 的整数倍
        let late = fired_at + chrono::Duration::seconds(35);
        let next = following_start_time(&schedule, fired_at, late).unwrap();
        assert_eq!(next, fired_at + chrono::Duration::seconds(40));
    }

    #[test]
    fn test_zero_repeat_runs_once() {
        let now = at(2024, 1, 1, 0, 0);
        let schedule = Schedule::interval("once", "once", Duration::ZERO);
        assert_eq!(initial_start_time(&schedule, now), Some(now));
        assert_eq!(following_start_time(&schedule, now, now), None);
    }

    #[test]
    fn test_untimed_and_disabled_schedules() {
        let now = at(2024, 1, 1, 0, 0);
        assert_eq!(initial_start_time(&Schedule::startup("s", "p"), now), None);
        assert_eq!(initial_start_time(&Schedule::manual("m", "p"), now), None);

        let disabled =
            Schedule::interval("stats", "stats", Duration::from_secs(5)).with_enabled(false);
        assert_eq!(initial_start_time(&disabled, now), None);
    }
}
