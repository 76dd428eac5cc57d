use serde::{Deserialize, Serialize};

/// Probed vs persisted headcount for one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadcountComparison {
    pub organization: String,
    #[serde(rename = "currentCount")]
    pub current_count: u32,
    #[serde(rename = "previousCount")]
    pub previous_count: u32,
    pub changed: bool,
    pub difference: i64,
    #[serde(rename = "probeError", skip_serializing_if = "Option::is_none")]
    pub probe_error: Option<String>,
}

impl HeadcountComparison {
    pub fn new(organization: impl Into<String>, current_count: u32, previous_count: u32) -> Self {
        let difference = i64::from(current_count) - i64::from(previous_count);
        Self {
            organization: organization.into(),
            current_count,
            previous_count,
            changed: difference != 0,
            difference,
            probe_error: None,
        }
    }

    /// A probe that could not complete. Marked changed so the organization is
    /// still crawled.
    pub fn probe_failed(organization: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            current_count: 0,
            previous_count: 0,
            changed: true,
            difference: 0,
            probe_error: Some(error.into()),
        }
    }

    pub fn describe(&self) -> String {
        if let Some(ref err) = self.probe_error {
            format!("{}: probe failed ({}), crawling anyway", self.organization, err)
        } else if !self.changed {
            format!("{}: no change ({})", self.organization, self.current_count)
        } else if self.difference > 0 {
            format!(
                "{}: increased {} -> {} (+{})",
                self.organization, self.previous_count, self.current_count, self.difference
            )
        } else {
            format!(
                "{}: decreased {} -> {} ({})",
                self.organization, self.previous_count, self.current_count, self.difference
            )
        }
    }
}

/// Aggregate over a probe phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadcountSummary {
    pub checked: usize,
    pub unchanged: usize,
    pub changed: usize,
    #[serde(rename = "totalIncrease")]
    pub total_increase: i64,
    #[serde(rename = "totalDecrease")]
    pub total_decrease: i64,
}

impl HeadcountSummary {
    pub fn from_comparisons(comparisons: &[HeadcountComparison]) -> Self {
        let changed: Vec<_> = comparisons.iter().filter(|c| c.changed).collect();
        Self {
            checked: comparisons.len(),
            unchanged: comparisons.len() - changed.len(),
            changed: changed.len(),
            total_increase: changed.iter().filter(|c| c.difference > 0).map(|c| c.difference).sum(),
            total_decrease: changed.iter().filter(|c| c.difference < 0).map(|c| -c.difference).sum(),
        }
    }

    pub fn net_change(&self) -> i64 {
        self.total_increase - self.total_decrease
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_difference_and_changed() {
        let up = HeadcountComparison::new("로고스", 72, 70);
        assert_eq!(up.difference, 2);
        assert!(up.changed);

        let same = HeadcountComparison::new("로고스", 70, 70);
        assert!(!same.changed);
        assert_eq!(same.difference, 0);

        let down = HeadcountComparison::new("로고스", 0, 3);
        assert_eq!(down.difference, -3);
    }

    #[test]
    fn test_probe_failed_is_changed() {
        let c = HeadcountComparison::probe_failed("광장", "timeout");
        assert!(c.changed);
        assert!(c.describe().contains("probe failed"));
    }

    #[test]
    fn test_summary_totals() {
        let comparisons = vec![
            HeadcountComparison::new("A", 10, 8),
            HeadcountComparison::new("B", 5, 9),
            HeadcountComparison::new("C", 4, 4),
        ];
        let summary = HeadcountSummary::from_comparisons(&comparisons);
        assert_eq!(summary.checked, 3);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.changed, 2);
        assert_eq!(summary.total_increase, 2);
        assert_eq!(summary.total_decrease, 4);
        assert_eq!(summary.net_change(), -2);
    }
}
