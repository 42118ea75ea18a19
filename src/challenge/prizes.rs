//! Static prize table keyed by final leaderboard position.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prize {
    pub label: String,
    pub credits: i64,
    #[serde(default)]
    pub description: String,
}

impl Prize {
    fn new(label: &str, credits: i64, description: &str) -> Self {
        Self {
            label: label.to_string(),
            credits,
            description: description.to_string(),
        }
    }
}

/// 1st, 2nd and 3rd each have their own entry; 4th-10th share `top10`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrizeTable {
    #[serde(default = "default_first")]
    pub first: Prize,
    #[serde(default = "default_second")]
    pub second: Prize,
    #[serde(default = "default_third")]
    pub third: Prize,
    #[serde(default = "default_top10")]
    pub top10: Prize,
}

fn default_first() -> Prize {
    Prize::new("1st Place", 5000, "Challenge champion")
}

fn default_second() -> Prize {
    Prize::new("2nd Place", 2500, "Runner-up")
}

fn default_third() -> Prize {
    Prize::new("3rd Place", 1000, "Third place")
}

fn default_top10() -> Prize {
    Prize::new("Top 10", 250, "Finished in the top ten")
}

impl Default for PrizeTable {
    fn default() -> Self {
        Self {
            first: default_first(),
            second: default_second(),
            third: default_third(),
            top10: default_top10(),
        }
    }
}

impl PrizeTable {
    /// Prize for a 1-based rank, if any.
    pub fn for_rank(&self, rank: i64) -> Option<&Prize> {
        match rank {
            1 => Some(&self.first),
            2 => Some(&self.second),
            3 => Some(&self.third),
            4..=10 => Some(&self.top10),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_podium() {
        let table = PrizeTable::default();
        assert_eq!(table.for_rank(1), Some(&table.first));
        assert_eq!(table.for_rank(2), Some(&table.second));
        assert_eq!(table.for_rank(3), Some(&table.third));
    }

    #[test]
    fn test_top10_shared() {
        let table = PrizeTable::default();
        for rank in 4..=10 {
            assert_eq!(table.for_rank(rank), Some(&table.top10), "rank {rank}");
        }
    }

    #[test]
    fn test_no_prize_outside_top10() {
        let table = PrizeTable::default();
        assert!(table.for_rank(11).is_none());
        assert!(table.for_rank(500).is_none());
        assert!(table.for_rank(0).is_none());
        assert!(table.for_rank(-1).is_none());
    }
}
