use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Charges applied to the cash allocation of every reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub brokerage_rate: Decimal,
    pub stt_rate: Decimal,
    /// Applied to brokerage, not to gross value.
    pub gst_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        FeeSchedule {
            brokerage_rate: Decimal::new(5, 3),
            stt_rate: Decimal::new(1, 3),
            gst_rate: Decimal::new(18, 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeeBreakdown {
    pub brokerage: Decimal,
    pub stt: Decimal,
    pub gst: Decimal,
    pub total: Decimal,
}

impl FeeSchedule {
    /// Fees on `gross_value`, or `None` when a product or the total overflows.
    pub fn compute(&self, gross_value: Decimal) -> Option<FeeBreakdown> {
        let brokerage = gross_value.checked_mul(self.brokerage_rate)?;
        let stt = gross_value.checked_mul(self.stt_rate)?;
        let gst = brokerage.checked_mul(self.gst_rate)?;
        let total = brokerage.checked_add(stt)?.checked_add(gst)?;
        Some(FeeBreakdown {
            brokerage,
            stt,
            gst,
            total,
        })
    }

    /// Name of the first negative rate, if any.
    pub fn negative_rate(&self) -> Option<&'static str> {
        [
            ("brokerage_rate", self.brokerage_rate),
            ("stt_rate", self.stt_rate),
            ("gst_rate", self.gst_rate),
        ]
        .into_iter()
        .find(|(_, rate)| *rate < Decimal::ZERO)
        .map(|(name, _)| name)
    }
}
