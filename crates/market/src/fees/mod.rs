//! Grid fee models.
//!
//! Every market owns one fee policy. The percentage model charges a
//! ratio of the clearing price, the constant model an absolute amount
//! per kWh. Both apply fees while orders are forwarded through the
//! hierarchy and invert them again at settlement time.

mod constant;
mod percentage;

pub use constant::ConstantGridFee;
pub use percentage::PercentageGridFee;

use gridex_core::Rate;
use gridex_ports::{GridFeePolicy, MarketError, MarketResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fee configuration of one area, as given in the simulation setup
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GridFeeParams {
    /// Percent of the clearing price, e.g. `10` for 10%
    pub grid_fee_percentage: Option<Rate>,
    /// Absolute fee in cents/kWh
    pub grid_fee_constant: Option<Rate>,
}

impl GridFeeParams {
    pub fn percentage(percent: Rate) -> Self {
        Self {
            grid_fee_percentage: Some(percent),
            grid_fee_constant: None,
        }
    }

    pub fn constant(rate: Rate) -> Self {
        Self {
            grid_fee_percentage: None,
            grid_fee_constant: Some(rate),
        }
    }
}

/// Build the fee policy for a market from its area's configuration.
/// At most one of the two fee types may be set.
pub fn create_fee_policy(params: &GridFeeParams) -> MarketResult<Box<dyn GridFeePolicy>> {
    match (params.grid_fee_percentage, params.grid_fee_constant) {
        (Some(_), Some(_)) => Err(MarketError::Config(
            "both percentage and constant grid fees configured".to_string(),
        )),
        (Some(percent), None) if percent < Decimal::ZERO => Err(MarketError::Config(
            "percentage grid fee cannot be negative".to_string(),
        )),
        (None, Some(rate)) if rate < Decimal::ZERO => Err(MarketError::Config(
            "constant grid fee cannot be negative".to_string(),
        )),
        (Some(percent), None) => Ok(Box::new(PercentageGridFee::new(percent))),
        (None, Some(rate)) => Ok(Box::new(ConstantGridFee::new(rate))),
        (None, None) => Ok(Box::new(ConstantGridFee::new(Decimal::ZERO))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_double_fee_configuration() {
        let params = GridFeeParams {
            grid_fee_percentage: Some(dec!(10)),
            grid_fee_constant: Some(dec!(0.5)),
        };
        assert!(create_fee_policy(&params).is_err());
    }

    #[test]
    fn defaults_to_zero_constant_fee() {
        let policy = create_fee_policy(&GridFeeParams::default()).unwrap();
        assert_eq!(policy.grid_fee_rate(), dec!(0));
    }
}
