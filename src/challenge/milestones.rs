//! Milestone rules for the paper-trading challenge.
//!
//! A milestone is a named day/performance threshold that pays a one-time
//! credit reward. Evaluation is monotonic: a name already present in the
//! enrollment's achieved list is never returned again.

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::types::Enrollment;

/// Threshold a milestone checks against the enrollment snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MilestoneCondition {
    /// `current_day >= day`
    MinDay { day: i64 },
    /// `total_return_percent >= percent`
    MinReturn { percent: f64 },
    /// `trades_count >= count`
    MinTrades { count: i64 },
    /// `portfolio_value >= starting_balance * multiple`
    BalanceMultiple { multiple: f64 },
}

impl MilestoneCondition {
    pub fn is_met(&self, enrollment: &Enrollment) -> bool {
        match self {
            MilestoneCondition::MinDay { day } => enrollment.current_day >= *day,
            MilestoneCondition::MinReturn { percent } => enrollment.total_return_percent >= *percent,
            MilestoneCondition::MinTrades { count } => enrollment.trades_count >= *count,
            MilestoneCondition::BalanceMultiple { multiple } => {
                let start = enrollment.starting_balance.to_f64().unwrap_or(0.0);
                let value = enrollment.portfolio_value.to_f64().unwrap_or(0.0);
                start > 0.0 && value >= start * multiple
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneRule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub condition: MilestoneCondition,
    /// Credits paid once when the rule is first met.
    pub reward: i64,
}

impl MilestoneRule {
    fn new(name: &str, description: &str, condition: MilestoneCondition, reward: i64) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            condition,
            reward,
        }
    }
}

/// The stock rule list.
pub fn default_milestones() -> Vec<MilestoneRule> {
    use MilestoneCondition::*;
    vec![
        MilestoneRule::new("first_trade", "Placed a first paper trade", MinTrades { count: 1 }, 50),
        MilestoneRule::new("day_30", "Stayed in the challenge for 30 days", MinDay { day: 30 }, 250),
        MilestoneRule::new("day_60", "Stayed in the challenge for 60 days", MinDay { day: 60 }, 500),
        MilestoneRule::new("complete_challenge", "Reached day 90", MinDay { day: 90 }, 1000),
        MilestoneRule::new("10_percent_gain", "Portfolio up 10%", MinReturn { percent: 10.0 }, 200),
        MilestoneRule::new("25_percent_gain", "Portfolio up 25%", MinReturn { percent: 25.0 }, 500),
        MilestoneRule::new("50_percent_gain", "Portfolio up 50%", MinReturn { percent: 50.0 }, 1000),
        MilestoneRule::new("double_balance", "Doubled the starting balance", BalanceMultiple { multiple: 2.0 }, 2500),
    ]
}

/// Rules that are satisfied now but not yet in the achieved list, in rule order.
pub fn newly_achieved<'a>(rules: &'a [MilestoneRule], enrollment: &Enrollment) -> Vec<&'a MilestoneRule> {
    rules
        .iter()
        .filter(|rule| !enrollment.has_achieved(&rule.name))
        .filter(|rule| rule.condition.is_met(enrollment))
        .collect()
}

/// Total credits of a set of rules.
pub fn total_reward(rules: &[&MilestoneRule]) -> i64 {
    rules.iter().map(|r| r.reward).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn enrollment(day: i64, ret: f64) -> Enrollment {
        let mut e = Enrollment::new("u1", "c1", dec!(100000), Utc::now());
        e.current_day = day;
        e.total_return_percent = ret;
        e
    }

    fn names(rules: &[&MilestoneRule]) -> Vec<String> {
        rules.iter().map(|r| r.name.clone()).collect()
    }

    #[test]
    fn test_day_90_with_12_percent() {
        let rules = default_milestones();
        let mut e = enrollment(90, 12.0);
        e.trades_count = 14;
        e.milestones_achieved = vec!["first_trade".into(), "day_30".into(), "day_60".into()];

        let hits = newly_achieved(&rules, &e);
        assert_eq!(names(&hits), vec!["complete_challenge", "10_percent_gain"]);
        assert_eq!(total_reward(&hits), 1200);
    }

    #[test]
    fn test_fresh_enrollment_collects_everything_due() {
        let rules = default_milestones();
        let e = enrollment(90, 12.0);
        let hits = names(&newly_achieved(&rules, &e));
        assert_eq!(hits, vec!["day_30", "day_60", "complete_challenge", "10_percent_gain"]);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let rules = default_milestones();
        let mut e = enrollment(45, 30.0);
        let first: Vec<String> = names(&newly_achieved(&rules, &e));
        assert!(!first.is_empty());
        e.milestones_achieved.extend(first);

        assert!(newly_achieved(&rules, &e).is_empty());
    }

    #[test]
    fn test_nothing_on_day_one() {
        let rules = default_milestones();
        assert!(newly_achieved(&rules, &enrollment(1, 0.0)).is_empty());
    }

    #[test]
    fn test_negative_return_never_meets_gain() {
        let cond = MilestoneCondition::MinReturn { percent: 10.0 };
        assert!(!cond.is_met(&enrollment(10, -15.0)));
        assert!(cond.is_met(&enrollment(10, 10.0)));
    }

    #[test]
    fn test_balance_multiple() {
        let cond = MilestoneCondition::BalanceMultiple { multiple: 2.0 };
        let mut e = enrollment(5, 100.0);
        e.portfolio_value = dec!(199999.99);
        assert!(!cond.is_met(&e));
        e.portfolio_value = dec!(200000);
        assert!(cond.is_met(&e));
    }

    #[test]
    fn test_condition_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            rule: MilestoneRule,
        }
        let w: Wrapper = toml::from_str(
            r#"
            [rule]
            name = "day_7"
            reward = 20
            condition = { kind = "min_day", day = 7 }
            "#,
        )
        .unwrap();
        assert_eq!(w.rule.condition, MilestoneCondition::MinDay { day: 7 });
        assert!(w.rule.description.is_empty());
    }
}
