// conditions.rs — Conditional rule guards.
//
// A rule may carry conditions that further restrict when it fires. All
// predicates are AND-ed: the rule matches only when every configured
// predicate holds. Absent conditions always hold.
//
// Evaluation is pure — the current UTC instant comes in through
// RuntimeContext, never from a clock read inside this module.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// The runtime facts a rule's conditions are evaluated against.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    /// The agent's deployment environment ("dev", "staging", "prod").
    pub env: String,
    /// The current instant, UTC. Injected by the caller.
    pub now: DateTime<Utc>,
}

/// A UTC wall-clock window with "HH:MM" bounds, inclusive on both ends.
/// When `end < start` the window wraps midnight (e.g. 22:00–06:00).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

/// Optional guards on a policy rule. Each present predicate must hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleConditions {
    /// Environments the rule applies in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,

    /// UTC time-of-day window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,

    /// Weekday names ("Mon".."Sun", full names accepted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<Vec<String>>,
}

impl RuleConditions {
    /// Evaluate all predicates against the runtime context.
    ///
    /// Unparseable bounds fail closed: a rule with a malformed time window
    /// does not fire. Policy writes validate up front, so this only guards
    /// data that predates validation.
    pub fn evaluate(&self, ctx: &RuntimeContext) -> bool {
        if let Some(envs) = &self.env {
            let here = ctx.env.to_lowercase();
            if !envs.iter().any(|e| e.to_lowercase() == here) {
                return false;
            }
        }

        if let Some(range) = &self.time_range {
            let (start, end) = match (parse_hhmm(&range.start), parse_hhmm(&range.end)) {
                (Some(s), Some(e)) => (s, e),
                _ => return false,
            };
            let now = ctx.now.hour() * 60 + ctx.now.minute();
            let inside = if end < start {
                // Wraps midnight.
                now >= start || now <= end
            } else {
                now >= start && now <= end
            };
            if !inside {
                return false;
            }
        }

        if let Some(days) = &self.day_of_week {
            // chrono renders weekdays as "Mon".."Sun"; accept full names too.
            let today = ctx.now.weekday().to_string().to_lowercase();
            let hit = days.iter().any(|d| {
                let d = d.to_lowercase();
                d.len() >= 3 && d.as_bytes()[..3] == today.as_bytes()[..3]
            });
            if !hit {
                return false;
            }
        }

        true
    }

    /// Validate bounds and names without evaluating. Used at policy-write time.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if let Some(range) = &self.time_range {
            for bound in [&range.start, &range.end] {
                if parse_hhmm(bound).is_none() {
                    return Err(PolicyError::InvalidTime(bound.clone()));
                }
            }
        }
        if let Some(days) = &self.day_of_week {
            for day in days {
                if !KNOWN_DAYS.iter().any(|k| {
                    let d = day.to_lowercase();
                    d.len() >= 3 && &d.as_bytes()[..3] == k.as_bytes()
                }) {
                    return Err(PolicyError::UnknownWeekday(day.clone()));
                }
            }
        }
        Ok(())
    }
}

const KNOWN_DAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Parse "HH:MM" into minutes since midnight. Returns None on any deviation.
fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx(env: &str, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> RuntimeContext {
        RuntimeContext {
            env: env.to_string(),
            now: Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap(),
        }
    }

    #[test]
    fn empty_conditions_always_hold() {
        let conds = RuleConditions::default();
        assert!(conds.evaluate(&ctx("prod", 2026, 6, 2, 14, 0)));
    }

    #[test]
    fn env_membership() {
        let conds = RuleConditions {
            env: Some(vec!["prod".into(), "staging".into()]),
            ..Default::default()
        };
        assert!(conds.evaluate(&ctx("prod", 2026, 6, 2, 14, 0)));
        assert!(conds.evaluate(&ctx("Staging", 2026, 6, 2, 14, 0)));
        assert!(!conds.evaluate(&ctx("dev", 2026, 6, 2, 14, 0)));
    }

    #[test]
    fn time_window_inclusive() {
        let conds = RuleConditions {
            time_range: Some(TimeRange {
                start: "09:00".into(),
                end: "18:00".into(),
            }),
            ..Default::default()
        };
        assert!(conds.evaluate(&ctx("prod", 2026, 6, 2, 9, 0)));
        assert!(conds.evaluate(&ctx("prod", 2026, 6, 2, 14, 0)));
        assert!(conds.evaluate(&ctx("prod", 2026, 6, 2, 18, 0)));
        assert!(!conds.evaluate(&ctx("prod", 2026, 6, 2, 18, 1)));
        assert!(!conds.evaluate(&ctx("prod", 2026, 6, 2, 8, 59)));
    }

    #[test]
    fn time_window_wraps_midnight() {
        let conds = RuleConditions {
            time_range: Some(TimeRange {
                start: "22:00".into(),
                end: "06:00".into(),
            }),
            ..Default::default()
        };
        assert!(conds.evaluate(&ctx("prod", 2026, 6, 2, 23, 30)));
        assert!(conds.evaluate(&ctx("prod", 2026, 6, 2, 2, 0)));
        assert!(conds.evaluate(&ctx("prod", 2026, 6, 2, 6, 0)));
        assert!(!conds.evaluate(&ctx("prod", 2026, 6, 2, 12, 0)));
    }

    #[test]
    fn weekday_names_short_and_full() {
        let conds = RuleConditions {
            day_of_week: Some(vec!["Mon".into(), "Tuesday".into()]),
            ..Default::default()
        };
        // 2026-06-01 is a Monday, 06-02 a Tuesday, 06-06 a Saturday.
        assert!(conds.evaluate(&ctx("prod", 2026, 6, 1, 12, 0)));
        assert!(conds.evaluate(&ctx("prod", 2026, 6, 2, 12, 0)));
        assert!(!conds.evaluate(&ctx("prod", 2026, 6, 6, 12, 0)));
    }

    #[test]
    fn all_predicates_are_anded() {
        let conds = RuleConditions {
            env: Some(vec!["prod".into()]),
            time_range: Some(TimeRange {
                start: "09:00".into(),
                end: "18:00".into(),
            }),
            day_of_week: Some(vec!["Mon".into(), "Tue".into(), "Wed".into(), "Thu".into(), "Fri".into()]),
        };
        // Tuesday 14:00 UTC in prod — all hold.
        assert!(conds.evaluate(&ctx("prod", 2026, 6, 2, 14, 0)));
        // Saturday 14:00 UTC — weekday predicate fails.
        assert!(!conds.evaluate(&ctx("prod", 2026, 6, 6, 14, 0)));
        // Tuesday but dev — env predicate fails.
        assert!(!conds.evaluate(&ctx("dev", 2026, 6, 2, 14, 0)));
    }

    #[test]
    fn malformed_time_fails_closed() {
        let conds = RuleConditions {
            time_range: Some(TimeRange {
                start: "9am".into(),
                end: "18:00".into(),
            }),
            ..Default::default()
        };
        assert!(!conds.evaluate(&ctx("prod", 2026, 6, 2, 14, 0)));
        assert!(conds.validate().is_err());
    }

    #[test]
    fn validate_accepts_good_bounds() {
        let conds = RuleConditions {
            time_range: Some(TimeRange {
                start: "00:00".into(),
                end: "23:59".into(),
            }),
            day_of_week: Some(vec!["mon".into(), "Sunday".into()]),
            ..Default::default()
        };
        assert!(conds.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_weekday() {
        let conds = RuleConditions {
            day_of_week: Some(vec!["Funday".into()]),
            ..Default::default()
        };
        assert!(matches!(
            conds.validate(),
            Err(PolicyError::UnknownWeekday(_))
        ));
    }

    #[test]
    fn hhmm_parser_bounds() {
        assert_eq!(parse_hhmm("00:00"), Some(0));
        assert_eq!(parse_hhmm("23:59"), Some(23 * 60 + 59));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("12:60"), None);
        assert_eq!(parse_hhmm("1:30"), None);
        assert_eq!(parse_hhmm("noon"), None);
    }
}
