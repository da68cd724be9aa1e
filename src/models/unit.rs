use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::errors::ServiceError;

/// Measurement dimension. Units only convert within one category.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum UomCategory {
    Count,
    Mass,
    Volume,
    Length,
    Area,
    Time,
}

impl UomCategory {
    /// Parses a category name, failing with `InvalidCategory` when unrecognized.
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        raw.trim()
            .parse()
            .map_err(|_| ServiceError::InvalidCategory {
                category: raw.to_string(),
            })
    }
}

/// Standard a unit code originates from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum UomSystem {
    Si,
    Imperial,
    UsCustomary,
    /// UN/ECE Recommendation 20 codes
    Unece,
    AnsiX12,
    Custom,
}

/// A registered unit of measure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub code: String,
    pub name: String,
    pub system: UomSystem,
    pub category: UomCategory,
    pub is_packaging: bool,
    pub is_active: bool,
    /// Row version for optimistic concurrency; 0 until first persisted.
    pub version: i32,
}

impl Unit {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        system: UomSystem,
        category: UomCategory,
        is_packaging: bool,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            system,
            category,
            is_packaging,
            is_active: true,
            version: 0,
        }
    }

    /// Fails with `CategoryMismatch` unless `other` measures the same dimension.
    pub fn ensure_same_category(&self, other: &Unit) -> Result<(), ServiceError> {
        if self.category != other.category {
            return Err(ServiceError::CategoryMismatch {
                from_uom: self.code.clone(),
                from_category: self.category.to_string(),
                to_uom: other.code.clone(),
                to_category: other.category.to_string(),
            });
        }
        Ok(())
    }
}

/// Partial update of a unit. `code` is identity and cannot change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitChanges {
    pub name: Option<String>,
    pub system: Option<UomSystem>,
    pub category: Option<UomCategory>,
    pub is_packaging: Option<bool>,
    pub is_active: Option<bool>,
}

impl UnitChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.system.is_none()
            && self.category.is_none()
            && self.is_packaging.is_none()
            && self.is_active.is_none()
    }

    /// Applies the changes, returning whether anything differs from `unit`.
    pub fn apply(&self, unit: &mut Unit) -> bool {
        let before = unit.clone();
        if let Some(name) = &self.name {
            unit.name = name.clone();
        }
        if let Some(system) = self.system {
            unit.system = system;
        }
        if let Some(category) = self.category {
            unit.category = category;
        }
        if let Some(is_packaging) = self.is_packaging {
            unit.is_packaging = is_packaging;
        }
        if let Some(is_active) = self.is_active {
            unit.is_active = is_active;
        }
        *unit != before
    }
}

/// Compact `{code, name}` pair for option listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOption {
    pub code: String,
    pub name: String,
}

impl From<&Unit> for UnitOption {
    fn from(unit: &Unit) -> Self {
        Self {
            code: unit.code.clone(),
            name: unit.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parsing_is_case_insensitive() {
        assert_eq!(UomCategory::parse("Mass").unwrap(), UomCategory::Mass);
        assert_eq!(UomCategory::parse(" volume ").unwrap(), UomCategory::Volume);
        assert!(matches!(
            UomCategory::parse("temperature"),
            Err(ServiceError::InvalidCategory { category }) if category == "temperature"
        ));
    }

    #[test]
    fn system_round_trips_through_strings() {
        assert_eq!(UomSystem::UsCustomary.to_string(), "us_customary");
        assert_eq!("ansi_x12".parse::<UomSystem>().unwrap(), UomSystem::AnsiX12);
    }

    #[test]
    fn apply_reports_real_changes_only() {
        let mut unit = Unit::new("kg", "Kilogram", UomSystem::Si, UomCategory::Mass, false);
        let same = UnitChanges {
            name: Some("Kilogram".into()),
            ..Default::default()
        };
        assert!(!same.apply(&mut unit));

        let rename = UnitChanges {
            name: Some("Kilo".into()),
            is_packaging: Some(true),
            ..Default::default()
        };
        assert!(rename.apply(&mut unit));
        assert_eq!(unit.name, "Kilo");
        assert!(unit.is_packaging);
        assert_eq!(unit.code, "kg");
    }

    #[test]
    fn empty_changes_are_detected() {
        assert!(UnitChanges::default().is_empty());
        assert!(!UnitChanges {
            is_active: Some(false),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn category_check_names_both_units() {
        let kg = Unit::new("kg", "Kilogram", UomSystem::Si, UomCategory::Mass, false);
        let l = Unit::new("L", "Litre", UomSystem::Si, UomCategory::Volume, false);
        assert!(kg.ensure_same_category(&kg).is_ok());
        assert!(matches!(
            kg.ensure_same_category(&l),
            Err(ServiceError::CategoryMismatch { from_uom, to_category, .. })
                if from_uom == "kg" && to_category == "volume"
        ));
    }
}
