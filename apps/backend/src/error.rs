use actix_web::error::ResponseError;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use db_infra::DbInfraError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::errors::{DetailValue, Details, ErrorKind};

/// JSON body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Details>,
    pub status_code: u16,
}

/// The error taxonomy of the backend core.
///
/// Storage drivers never leak past this type: raw driver errors are mapped
/// at the session boundary (see `crate::infra::db_errors`) and their text is
/// only ever logged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("{message}")]
    NotFound {
        resource_type: String,
        resource_id: DetailValue,
        message: String,
    },
    #[error("{message}")]
    Conflict {
        resource_type: String,
        conflicting_field: String,
        message: String,
    },
    #[error("{message}")]
    InvalidInput {
        field: String,
        reason: String,
        message: String,
    },
    #[error("{message}")]
    StorageUnavailable { message: String, details: Details },
    #[error("{message}")]
    StorageTimeout { message: String, details: Details },
    #[error("{message}")]
    Internal { message: String },
}

impl AppError {
    pub fn not_found(resource_type: impl Into<String>, resource_id: impl Into<DetailValue>) -> Self {
        let resource_type = resource_type.into();
        let resource_id = resource_id.into();
        let message = format!("{resource_type} with id {resource_id} not found");
        Self::NotFound {
            resource_type,
            resource_id,
            message,
        }
    }

    pub fn conflict(resource_type: impl Into<String>, conflicting_field: impl Into<String>) -> Self {
        let resource_type = resource_type.into();
        let conflicting_field = conflicting_field.into();
        let message = format!("{resource_type} with this {conflicting_field} already exists");
        Self::Conflict {
            resource_type,
            conflicting_field,
            message,
        }
    }

    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let field = field.into();
        let reason = reason.into();
        let message = format!("Invalid {field}: {reason}");
        Self::InvalidInput {
            field,
            reason,
            message,
        }
    }

    /// A date window whose start falls after its end.
    pub fn invalid_date_range(from: impl Into<String>, to: impl Into<String>) -> Self {
        let (from, to) = (from.into(), to.into());
        Self::invalid_input("date_range", format!("start {from} is after end {to}"))
    }

    pub fn storage_unavailable() -> Self {
        let mut details = Details::new();
        details.insert("service".into(), "database".into());
        Self::StorageUnavailable {
            message: "Unable to connect to database".into(),
            details,
        }
    }

    pub fn storage_timeout() -> Self {
        let mut details = Details::new();
        details.insert("service".into(), "database".into());
        Self::StorageTimeout {
            message: "Timed out waiting for the database".into(),
            details,
        }
    }

    pub fn internal() -> Self {
        Self::Internal {
            message: "An unexpected error occurred".into(),
        }
    }

    /// Adds a detail entry to storage errors. Other kinds derive their
    /// details from their own fields and are returned unchanged.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<DetailValue>) -> Self {
        match &mut self {
            Self::StorageUnavailable { details, .. } | Self::StorageTimeout { details, .. } => {
                details.insert(key.into(), value.into());
            }
            _ => {}
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::StorageUnavailable { .. } => ErrorKind::StorageUnavailable,
            Self::StorageTimeout { .. } => ErrorKind::StorageTimeout,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::InvalidInput { message, .. }
            | Self::StorageUnavailable { message, .. }
            | Self::StorageTimeout { message, .. }
            | Self::Internal { message } => message,
        }
    }

    /// Caller-visible structured context. Always empty for `Internal`.
    pub fn details(&self) -> Details {
        let mut out = Details::new();
        match self {
            Self::NotFound {
                resource_type,
                resource_id,
                ..
            } => {
                out.insert("resourceType".into(), resource_type.as_str().into());
                out.insert("resourceId".into(), resource_id.clone());
            }
            Self::Conflict {
                resource_type,
                conflicting_field,
                ..
            } => {
                out.insert("resourceType".into(), resource_type.as_str().into());
                out.insert("conflictingField".into(), conflicting_field.as_str().into());
            }
            Self::InvalidInput { field, reason, .. } => {
                out.insert("field".into(), field.as_str().into());
                out.insert("reason".into(), reason.as_str().into());
            }
            Self::StorageUnavailable { details, .. } | Self::StorageTimeout { details, .. } => {
                out.extend(details.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Self::Internal { .. } => {}
        }
        out
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn to_body(&self) -> ErrorBody {
        let details = self.details();
        ErrorBody {
            error: self.kind().as_str(),
            message: self.message().to_owned(),
            details: (!details.is_empty()).then_some(details),
            status_code: self.kind().http_status(),
        }
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(e: sea_orm::DbErr) -> Self {
        crate::infra::db_errors::map_db_err(e)
    }
}

impl From<DbInfraError> for AppError {
    fn from(e: DbInfraError) -> Self {
        match e {
            DbInfraError::PoolClosed => Self::storage_unavailable().with_detail("reason", "pool_closed"),
            DbInfraError::Connect { message } => {
                error!(raw_error = %crate::logging::pii::Redacted(&message), "database connect failed");
                Self::storage_unavailable()
            }
            DbInfraError::Config { message } | DbInfraError::Migration { message } => {
                error!(raw_error = %crate::logging::pii::Redacted(&message), "database infrastructure error");
                Self::internal()
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status()
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status())
            .content_type("application/json")
            .json(self.to_body())
    }
}
