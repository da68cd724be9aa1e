use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Stored directed edge: `1 from_uom = factor to_uom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    pub from_uom: String,
    pub to_uom: String,
    pub factor: Decimal,
    /// Row version for optimistic concurrency; 0 until first persisted.
    pub version: i32,
}

impl Conversion {
    pub fn new(from_uom: impl Into<String>, to_uom: impl Into<String>, factor: Decimal) -> Self {
        Self {
            from_uom: from_uom.into(),
            to_uom: to_uom.into(),
            factor,
            version: 0,
        }
    }
}

/// An edge as seen from one unit: either stored, or derived from the
/// stored inverse by taking its reciprocal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionView {
    pub from_uom: String,
    pub to_uom: String,
    pub factor: Decimal,
    pub derived: bool,
}

/// Outcome of a `convert` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub amount: Decimal,
    pub from_uom: String,
    pub to_uom: String,
    /// Unit codes walked, endpoints included.
    pub path: Vec<String>,
    /// Effective `1 from_uom = factor to_uom` along `path`.
    pub factor: Decimal,
}

/// Parses a factor from its decimal string without losing precision.
pub fn parse_factor(raw: &str) -> Result<Decimal, ServiceError> {
    let trimmed = raw.trim();
    let parsed = if trimmed.contains(['e', 'E']) {
        Decimal::from_scientific(trimmed)
    } else {
        Decimal::from_str_exact(trimmed)
    };
    let factor = parsed.map_err(|e| ServiceError::invalid_factor(raw, e.to_string()))?;
    validate_factor(factor)?;
    Ok(factor.normalize())
}

/// Factors must be strictly positive.
pub fn validate_factor(factor: Decimal) -> Result<(), ServiceError> {
    if factor.is_zero() {
        return Err(ServiceError::invalid_factor(factor, "factor must not be zero"));
    }
    if factor.is_sign_negative() {
        return Err(ServiceError::invalid_factor(factor, "factor must be positive"));
    }
    Ok(())
}
