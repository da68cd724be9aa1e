//! StateSet UOM library
//!
//! Unit-of-measure registry and exact conversion graph for the inventory
//! backend. Quantities are `rust_decimal::Decimal` end to end.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod dto;
pub mod entities;
pub mod errors;
pub mod models;
pub mod repositories;
pub mod seed;
pub mod services;

pub use errors::{ErrorDetails, RecordKey, ServiceError};
pub use models::{
    Conversion, ConversionResult, ConversionView, Unit, UnitChanges, UnitOption, UomCategory,
    UomSystem,
};
pub use services::{GraphSnapshot, UnitList, UomService};

pub mod prelude {
    pub use crate::dto::uom::*;
    pub use crate::errors::*;
    pub use crate::models::*;
    pub use crate::repositories::{InMemoryUomRepository, SeaOrmUomRepository, UomRepository};
    pub use crate::services::*;
}
