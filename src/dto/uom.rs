//! Request contracts checked at the boundary before domain records are built.
//!
//! Shape problems (lengths, malformed numbers, unknown system tags) become
//! `ValidationError`; domain problems (unknown category, bad factor) keep
//! their own variants.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::{Validate, ValidationError};

use crate::errors::ServiceError;
use crate::models::{parse_factor, Unit, UnitChanges, UomCategory, UomSystem};

fn validate_code(code: &str) -> Result<(), ValidationError> {
    if code.chars().any(|c| c.is_whitespace() || c.is_control()) {
        let mut err = ValidationError::new("code");
        err.message = Some("Unit codes cannot contain whitespace".into());
        return Err(err);
    }
    Ok(())
}

fn parse_system(raw: &str) -> Result<UomSystem, ServiceError> {
    UomSystem::from_str(raw.trim()).map_err(|_| {
        ServiceError::ValidationError(format!("system: unknown unit system '{}'", raw))
    })
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct InitialConversionRequest {
    #[validate(length(min = 1, max = 20))]
    pub to_uom: String,
    /// Exact decimal string, e.g. "0.001"
    pub factor: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateUnitRequest {
    #[validate(
        length(min = 1, max = 20, message = "Unit code must be between 1 and 20 characters"),
        custom = "validate_code"
    )]
    pub code: String,
    #[validate(length(min = 1, max = 100, message = "Unit name must be between 1 and 100 characters"))]
    pub name: String,
    pub system: String,
    pub category: String,
    #[serde(default)]
    pub is_packaging: bool,
    /// Edges from the new unit, inserted atomically with it
    #[serde(default)]
    #[validate]
    pub conversions: Vec<InitialConversionRequest>,
}

/// Parsed form of [`CreateUnitRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUnit {
    pub unit: Unit,
    pub conversions: Vec<(String, Decimal)>,
}

impl CreateUnitRequest {
    pub fn parse(&self) -> Result<NewUnit, ServiceError> {
        self.validate()?;
        let system = parse_system(&self.system)?;
        let category = UomCategory::parse(&self.category)?;
        let conversions = self
            .conversions
            .iter()
            .map(|c| Ok((c.to_uom.clone(), parse_factor(&c.factor)?)))
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(NewUnit {
            unit: Unit::new(
                self.code.clone(),
                self.name.trim(),
                system,
                category,
                self.is_packaging,
            ),
            conversions,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateUnitRequest {
    #[validate(length(min = 1, max = 100, message = "Unit name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    pub system: Option<String>,
    pub category: Option<String>,
    pub is_packaging: Option<bool>,
    pub is_active: Option<bool>,
}

impl UpdateUnitRequest {
    pub fn parse(&self) -> Result<UnitChanges, ServiceError> {
        self.validate()?;
        Ok(UnitChanges {
            name: self.name.as_deref().map(|n| n.trim().to_string()),
            system: self.system.as_deref().map(parse_system).transpose()?,
            category: self
                .category
                .as_deref()
                .map(UomCategory::parse)
                .transpose()?,
            is_packaging: self.is_packaging,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ConversionRequest {
    #[validate(length(min = 1, max = 20))]
    pub from_uom: String,
    #[validate(length(min = 1, max = 20))]
    pub to_uom: String,
    pub factor: String,
}

impl ConversionRequest {
    pub fn parse(&self) -> Result<(String, String, Decimal), ServiceError> {
        self.validate()?;
        Ok((
            self.from_uom.clone(),
            self.to_uom.clone(),
            parse_factor(&self.factor)?,
        ))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ConvertRequest {
    pub amount: String,
    #[validate(length(min = 1, max = 20))]
    pub from_uom: String,
    #[validate(length(min = 1, max = 20))]
    pub to_uom: String,
}

impl ConvertRequest {
    pub fn parse(&self) -> Result<(Decimal, String, String), ServiceError> {
        self.validate()?;
        let amount = Decimal::from_str_exact(self.amount.trim()).map_err(|e| {
            ServiceError::ValidationError(format!("amount: '{}' is not a decimal ({})", self.amount, e))
        })?;
        Ok((amount, self.from_uom.clone(), self.to_uom.clone()))
    }
}
