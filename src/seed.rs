//! Standard unit catalog for bootstrapping a fresh registry.
//!
//! Seeding is idempotent: existing units are left alone and edges whose
//! stored factor already matches are skipped.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::dto::uom::CreateUnitRequest;
use crate::errors::ServiceError;
use crate::models::parse_factor;
use crate::services::UomService;

/// `(code, name, system, category, is_packaging)`
const UNITS: &[(&str, &str, &str, &str, bool)] = &[
    // count
    ("EA", "Each", "ansi_x12", "count", false),
    ("PR", "Pair", "ansi_x12", "count", false),
    ("DZ", "Dozen", "ansi_x12", "count", false),
    ("GR", "Gross", "ansi_x12", "count", false),
    ("CS", "Case", "unece", "count", true),
    ("BX", "Box", "unece", "count", true),
    ("PX", "Pallet", "unece", "count", true),
    // mass
    ("kg", "Kilogram", "si", "mass", false),
    ("g", "Gram", "si", "mass", false),
    ("mg", "Milligram", "si", "mass", false),
    ("t", "Tonne", "si", "mass", false),
    ("lb", "Pound", "us_customary", "mass", false),
    ("oz", "Ounce", "us_customary", "mass", false),
    ("st", "Stone", "imperial", "mass", false),
    // volume
    ("L", "Litre", "si", "volume", false),
    ("mL", "Millilitre", "si", "volume", false),
    ("m3", "Cubic metre", "si", "volume", false),
    ("gal", "US gallon", "us_customary", "volume", false),
    ("qt", "US quart", "us_customary", "volume", false),
    ("floz", "US fluid ounce", "us_customary", "volume", false),
    ("gal_imp", "Imperial gallon", "imperial", "volume", false),
    // length
    ("m", "Metre", "si", "length", false),
    ("cm", "Centimetre", "si", "length", false),
    ("mm", "Millimetre", "si", "length", false),
    ("km", "Kilometre", "si", "length", false),
    ("in", "Inch", "us_customary", "length", false),
    ("ft", "Foot", "us_customary", "length", false),
    ("yd", "Yard", "us_customary", "length", false),
    ("mi", "Mile", "us_customary", "length", false),
    // area
    ("m2", "Square metre", "si", "area", false),
    ("cm2", "Square centimetre", "si", "area", false),
    ("ft2", "Square foot", "us_customary", "area", false),
    // time
    ("s", "Second", "si", "time", false),
    ("min", "Minute", "si", "time", false),
    ("h", "Hour", "si", "time", false),
    ("d", "Day", "si", "time", false),
];

/// `1 from = factor to`. Packaging units have no global edges; their sizes
/// are product specific.
const CONVERSIONS: &[(&str, &str, &str)] = &[
    ("PR", "EA", "2"),
    ("DZ", "EA", "12"),
    ("GR", "DZ", "12"),
    ("g", "kg", "0.001"),
    ("mg", "g", "0.001"),
    ("t", "kg", "1000"),
    ("lb", "kg", "0.45359237"),
    ("oz", "lb", "0.0625"),
    ("st", "lb", "14"),
    ("mL", "L", "0.001"),
    ("m3", "L", "1000"),
    ("gal", "L", "3.785411784"),
    ("qt", "gal", "0.25"),
    ("floz", "qt", "0.03125"),
    ("gal_imp", "L", "4.54609"),
    ("cm", "m", "0.01"),
    ("mm", "m", "0.001"),
    ("km", "m", "1000"),
    ("in", "cm", "2.54"),
    ("ft", "in", "12"),
    ("yd", "ft", "3"),
    ("mi", "ft", "5280"),
    ("cm2", "m2", "0.0001"),
    ("ft2", "m2", "0.09290304"),
    ("min", "s", "60"),
    ("h", "min", "60"),
    ("d", "h", "24"),
];

/// Unit definitions of the standard catalog, without edges.
pub fn standard_catalog() -> Vec<CreateUnitRequest> {
    UNITS
        .iter()
        .map(|&(code, name, system, category, is_packaging)| CreateUnitRequest {
            code: code.to_string(),
            name: name.to_string(),
            system: system.to_string(),
            category: category.to_string(),
            is_packaging,
            conversions: Vec::new(),
        })
        .collect()
}

/// Edges of the standard catalog.
pub fn standard_conversions() -> Result<Vec<(&'static str, &'static str, Decimal)>, ServiceError> {
    CONVERSIONS
        .iter()
        .map(|&(from, to, factor)| Ok((from, to, parse_factor(factor)?)))
        .collect()
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub units_created: usize,
    pub units_existing: usize,
    pub conversions_written: usize,
    pub conversions_unchanged: usize,
}

/// Loads the standard catalog through the service.
pub async fn seed_standard_catalog(service: &UomService) -> Result<SeedReport, ServiceError> {
    let mut report = SeedReport::default();

    for request in standard_catalog() {
        match service.create_unit(&request).await {
            Ok(_) => report.units_created += 1,
            Err(ServiceError::DuplicateCode { code }) => {
                debug!(%code, "Unit already present");
                report.units_existing += 1;
            }
            Err(e) => return Err(e),
        }
    }

    for (from, to, factor) in standard_conversions()? {
        let unchanged = service
            .list_conversions_for_unit(from)
            .await?
            .iter()
            .any(|c| !c.derived && c.to_uom == to && c.factor == factor);
        if unchanged {
            report.conversions_unchanged += 1;
            continue;
        }
        service.add_conversion(from, to, factor).await?;
        report.conversions_written += 1;
    }

    info!(
        units_created = report.units_created,
        conversions_written = report.conversions_written,
        "Standard catalog seeded"
    );
    Ok(report)
}
