use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the record a `NotFound` error refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKey {
    Unit { code: String },
    Conversion { from_uom: String, to_uom: String },
}

impl RecordKey {
    pub fn unit(code: impl Into<String>) -> Self {
        Self::Unit { code: code.into() }
    }

    pub fn conversion(from_uom: impl Into<String>, to_uom: impl Into<String>) -> Self {
        Self::Conversion {
            from_uom: from_uom.into(),
            to_uom: to_uom.into(),
        }
    }

    fn codes(&self) -> Vec<String> {
        match self {
            Self::Unit { code } => vec![code.clone()],
            Self::Conversion { from_uom, to_uom } => vec![from_uom.clone(), to_uom.clone()],
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit { code } => write!(f, "unit '{}'", code),
            Self::Conversion { from_uom, to_uom } => {
                write!(f, "conversion '{}' -> '{}'", from_uom, to_uom)
            }
        }
    }
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[serde(skip)] DbErr),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(RecordKey),

    #[error("Unit code '{code}' is already registered")]
    DuplicateCode { code: String },

    #[error("Unknown unit category '{category}'")]
    InvalidCategory { category: String },

    #[error("Unit '{from_uom}' ({from_category}) cannot convert to '{to_uom}' ({to_category})")]
    CategoryMismatch {
        from_uom: String,
        from_category: String,
        to_uom: String,
        to_category: String,
    },

    #[error("Invalid conversion factor '{factor}': {reason}")]
    InvalidFactor { factor: String, reason: String },

    #[error("Unit '{code}' cannot convert to itself")]
    SelfConversion { code: String },

    #[error("Unknown unit '{code}'")]
    UnknownUnit { code: String },

    #[error("Unit '{code}' is inactive")]
    InactiveUnit { code: String },

    #[error("No conversion path from '{from_uom}' to '{to_uom}' in category {category}")]
    NoConversionPath {
        from_uom: String,
        to_uom: String,
        category: String,
    },

    #[error("Conversion from '{from_uom}' to '{to_uom}' exceeds decimal range")]
    ConversionOverflow { from_uom: String, to_uom: String },

    #[error("Concurrent modification of {0}")]
    ConcurrentModification(RecordKey),
}

/// Structured error payload for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Stable machine-readable error code
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// Request field that caused the error, when one applies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Unit codes involved in the failure
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub units: Vec<String>,
}

impl From<DbErr> for ServiceError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::ConnectionAcquire(e) => ServiceError::StorageUnavailable(e.to_string()),
            DbErr::Conn(e) => ServiceError::StorageUnavailable(e.to_string()),
            other => ServiceError::DatabaseError(other),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Normalizes a storage error, keeping connection failures distinct.
    pub fn db_error(error: DbErr) -> Self {
        error.into()
    }

    pub fn not_found_unit(code: impl Into<String>) -> Self {
        Self::NotFound(RecordKey::unit(code))
    }

    pub fn not_found_conversion(from_uom: impl Into<String>, to_uom: impl Into<String>) -> Self {
        Self::NotFound(RecordKey::conversion(from_uom, to_uom))
    }

    pub fn invalid_factor(factor: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidFactor {
            factor: factor.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable code used by callers to branch on the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::ValidationError(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::DuplicateCode { .. } => "duplicate_code",
            Self::InvalidCategory { .. } => "invalid_category",
            Self::CategoryMismatch { .. } => "category_mismatch",
            Self::InvalidFactor { .. } => "invalid_factor",
            Self::SelfConversion { .. } => "self_conversion",
            Self::UnknownUnit { .. } => "unknown_unit",
            Self::InactiveUnit { .. } => "inactive_unit",
            Self::NoConversionPath { .. } => "no_conversion_path",
            Self::ConversionOverflow { .. } => "conversion_overflow",
            Self::ConcurrentModification(_) => "concurrent_modification",
        }
    }

    /// True when repeating the same call may succeed without changing input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::ConcurrentModification(_)
        )
    }

    pub fn details(&self) -> ErrorDetails {
        let (field, units): (Option<&str>, Vec<String>) = match self {
            Self::DatabaseError(_) | Self::StorageUnavailable(_) | Self::ValidationError(_) => {
                (None, Vec::new())
            }
            Self::NotFound(key) | Self::ConcurrentModification(key) => (None, key.codes()),
            Self::DuplicateCode { code } => (Some("code"), vec![code.clone()]),
            Self::InvalidCategory { .. } => (Some("category"), Vec::new()),
            Self::CategoryMismatch {
                from_uom, to_uom, ..
            }
            | Self::NoConversionPath {
                from_uom, to_uom, ..
            }
            | Self::ConversionOverflow { from_uom, to_uom } => {
                (Some("to_uom"), vec![from_uom.clone(), to_uom.clone()])
            }
            Self::InvalidFactor { .. } => (Some("factor"), Vec::new()),
            Self::SelfConversion { code } => (Some("to_uom"), vec![code.clone()]),
            Self::UnknownUnit { code } | Self::InactiveUnit { code } => {
                (None, vec![code.clone()])
            }
        };

        let message = match self {
            // Raw driver messages stay in the logs.
            Self::DatabaseError(_) => "Database error".to_string(),
            other => other.to_string(),
        };

        ErrorDetails {
            code: self.code().to_string(),
            message,
            field: field.map(str::to_string),
            units,
        }
    }
}

// Result extensions for easier error handling
pub trait ResultExt<T> {
    fn map_err_to_service(self) -> Result<T, ServiceError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<ServiceError>,
{
    fn map_err_to_service(self) -> Result<T, ServiceError> {
        self.map_err(|e| e.into())
    }
}
