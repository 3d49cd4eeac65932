//! Money and request/response types for the processor gateway.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;

use crate::error::{AppError, AppResult};

/// Convert a decimal amount to the processor's minor unit (integer cents).
///
/// Conversion is exact: amounts that do not land on a whole cent are
/// rejected rather than rounded.
pub fn to_minor_units(amount: Decimal) -> AppResult<i64> {
    if amount <= Decimal::ZERO {
        return Err(AppError::invalid_amount("Amount must be positive."));
    }

    let cents = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| AppError::invalid_amount("Amount out of range"))?;

    if cents.fract() != Decimal::ZERO {
        return Err(AppError::invalid_amount(
            "Amount has sub-cent precision",
        ));
    }

    cents
        .trunc()
        .to_i64()
        .ok_or_else(|| AppError::invalid_amount("Amount out of range"))
}

/// A charge to submit to the processor
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub idempotency_key: String,
    /// Flat string map forwarded as processor metadata
    pub metadata: serde_json::Value,
}

/// Result of a successful charge call
#[derive(Debug, Clone)]
pub struct ChargeResult {
    pub external_id: String,
    pub status: String,
    pub client_secret: Option<String>,
}

impl ChargeResult {
    /// Shape persisted into the payment's metadata on completion
    pub fn to_metadata(&self) -> serde_json::Value {
        json!({
            "id": self.external_id,
            "status": self.status,
            "client_secret": self.client_secret,
        })
    }
}

/// Result of a successful refund call
#[derive(Debug, Clone)]
pub struct RefundResult {
    pub external_id: String,
    pub status: String,
}

impl RefundResult {
    pub fn to_metadata(&self) -> serde_json::Value {
        json!({
            "id": self.external_id,
            "status": self.status,
        })
    }
}

/// Charge state as reported by the processor on retrieval
#[derive(Debug, Clone)]
pub struct RetrievedCharge {
    pub external_id: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_whole_amounts_convert_exactly() {
        assert_eq!(to_minor_units(dec!(300.00)).unwrap(), 30000);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(to_minor_units(dec!(1234.56)).unwrap(), 123456);
    }

    #[test]
    fn test_sub_cent_precision_rejected() {
        assert!(to_minor_units(dec!(10.005)).is_err());
        assert!(to_minor_units(dec!(0.001)).is_err());
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        assert!(to_minor_units(dec!(0)).is_err());
        assert!(to_minor_units(dec!(-5.00)).is_err());
    }

    #[test]
    fn test_charge_result_metadata_shape() {
        let result = ChargeResult {
            external_id: "pi_123".to_string(),
            status: "succeeded".to_string(),
            client_secret: Some("pi_123_secret".to_string()),
        };
        let metadata = result.to_metadata();
        assert_eq!(metadata["id"], "pi_123");
        assert_eq!(metadata["status"], "succeeded");
        assert_eq!(metadata["client_secret"], "pi_123_secret");
    }
}
