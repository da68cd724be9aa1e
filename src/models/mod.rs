//! Domain records handed across the service boundary.

pub mod conversion;
pub mod unit;

pub use conversion::{parse_factor, validate_factor, Conversion, ConversionResult, ConversionView};
pub use unit::{Unit, UnitChanges, UnitOption, UomCategory, UomSystem};
