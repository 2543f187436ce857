//! Historical baselines for one (project, SKU) series

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ChangeType;

/// Rolling average and rolling maximum over a series' history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub average: Decimal,
    pub maximum: Decimal,
}

impl Baseline {
    /// Compute the baseline over historical daily costs.
    ///
    /// Returns `None` when there is no history.
    pub fn from_history(costs: &[Decimal]) -> Option<Self> {
        let maximum = costs.iter().copied().max()?;
        let sum: Decimal = costs.iter().copied().sum();
        let average = sum / Decimal::from(costs.len());

        Some(Self { average, maximum })
    }

    /// Baseline value the given rule compares against
    pub fn value(&self, change_type: ChangeType) -> Decimal {
        match change_type {
            ChangeType::Average => self.average,
            ChangeType::Max => self.maximum,
        }
    }
}
