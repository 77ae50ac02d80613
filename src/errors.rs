// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for the resource engine
//!
//! Every failure a command can produce maps onto one of six kinds, each with a
//! fixed HTTP status. Validation failures carry per-field detail so a caller
//! can correct the request; internal failures carry only a correlation id.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::privilege::Verb;

/// Why a single property write was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    /// Property does not exist on the resource
    UnknownProperty,
    /// Property exists but accepts no writes
    ReadOnly,
    /// Proposed value has the wrong JSON type
    TypeMismatch,
    /// Proposed value is outside the accepted range
    OutOfRange,
    /// Proposed value failed a format or enumeration check
    InvalidValue,
    /// Caller lacks the property-level privilege override
    InsufficientPrivilege,
    /// Request body is malformed
    MalformedBody,
}

impl FieldErrorKind {
    /// Base registry message for this kind
    pub fn message_id(&self) -> &'static str {
        match self {
            FieldErrorKind::UnknownProperty => "Base.1.0.PropertyUnknown",
            FieldErrorKind::ReadOnly => "Base.1.0.PropertyNotWritable",
            FieldErrorKind::TypeMismatch => "Base.1.0.PropertyValueTypeError",
            FieldErrorKind::OutOfRange => "Base.1.0.PropertyValueFormatError",
            FieldErrorKind::InvalidValue => "Base.1.0.PropertyValueNotInList",
            FieldErrorKind::InsufficientPrivilege => "Base.1.0.InsufficientPrivilege",
            FieldErrorKind::MalformedBody => "Base.1.0.MalformedJSON",
        }
    }

    fn resolution(&self) -> &'static str {
        match self {
            FieldErrorKind::UnknownProperty | FieldErrorKind::ReadOnly => {
                "Remove the property from the request body and resubmit the request."
            }
            FieldErrorKind::InsufficientPrivilege => {
                "Either abandon the operation or change the associated access rights and resubmit the request."
            }
            FieldErrorKind::MalformedBody => {
                "Ensure that the request body is valid JSON and resubmit the request."
            }
            _ => "Correct the value for the property and resubmit the request.",
        }
    }
}

/// Per-field validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Property the failure applies to
    pub property: String,

    /// Failure classification
    pub kind: FieldErrorKind,

    /// Human-readable reason
    pub reason: String,
}

impl FieldError {
    /// Create a new field error
    pub fn new(property: impl Into<String>, kind: FieldErrorKind, reason: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            kind,
            reason: reason.into(),
        }
    }

    pub fn unknown(property: impl Into<String>) -> Self {
        let property = property.into();
        let reason = format!("property {} is not defined on this resource", property);
        Self::new(property, FieldErrorKind::UnknownProperty, reason)
    }

    pub fn read_only(property: impl Into<String>) -> Self {
        let property = property.into();
        let reason = format!("property {} is read-only", property);
        Self::new(property, FieldErrorKind::ReadOnly, reason)
    }

    pub fn type_mismatch(property: impl Into<String>, expected: &str) -> Self {
        let property = property.into();
        let reason = format!("property {} expects a value of type {}", property, expected);
        Self::new(property, FieldErrorKind::TypeMismatch, reason)
    }

    /// Render as a Redfish `@Message.ExtendedInfo` entry
    pub fn to_message(&self) -> Value {
        json!({
            "MessageId": self.kind.message_id(),
            "Message": self.reason,
            "RelatedProperties": [format!("#/{}", self.property)],
            "Severity": "Warning",
            "Resolution": self.kind.resolution(),
            "Kind": self.kind,
        })
    }
}

/// Errors that can abort a command
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown aggregate or property
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Caller is identified but lacks the required privilege
    #[error("Insufficient privilege for {verb} on {uri}: requires {required:?}")]
    Unauthorized {
        verb: Verb,
        uri: String,
        required: Vec<String>,
    },

    /// Caller is anonymous and the resource demands authentication
    #[error("Authentication required for {verb} on {uri}")]
    Unauthenticated { verb: Verb, uri: String },

    /// Body or property failed validation
    #[error("Validation failed for {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    /// Concurrent modification or already-gone resource
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unexpected failure; `detail` is logged, never returned to the caller
    #[error("Internal error (correlation id {correlation_id})")]
    Internal { correlation_id: Uuid, detail: String },
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Build an internal error, logging the detail under a fresh correlation id
    pub fn internal(detail: impl Into<String>) -> Self {
        let correlation_id = Uuid::now_v7();
        let detail = detail.into();
        tracing::error!(%correlation_id, %detail, "internal engine error");
        EngineError::Internal {
            correlation_id,
            detail,
        }
    }

    /// Single-field validation error
    pub fn field(error: FieldError) -> Self {
        EngineError::Validation(vec![error])
    }

    /// Fixed HTTP status for each error kind
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::NotFound(_) => 404,
            EngineError::Unauthorized { .. } => 403,
            EngineError::Unauthenticated { .. } => 401,
            EngineError::Validation(_) => 400,
            EngineError::Conflict(_) => 409,
            EngineError::Internal { .. } => 500,
        }
    }

    /// Redfish error body
    pub fn to_body(&self) -> Value {
        let (code, extended): (&str, Vec<Value>) = match self {
            EngineError::NotFound(_) => ("Base.1.0.ResourceMissingAtURI", Vec::new()),
            EngineError::Unauthorized { required, .. } => (
                "Base.1.0.InsufficientPrivilege",
                vec![json!({
                    "MessageId": "Base.1.0.InsufficientPrivilege",
                    "Message": self.to_string(),
                    "RequiredPrivileges": required,
                })],
            ),
            EngineError::Unauthenticated { .. } => ("Base.1.0.NoValidSession", Vec::new()),
            EngineError::Validation(fields) => (
                match fields.as_slice() {
                    [only] => only.kind.message_id(),
                    _ => "Base.1.0.GeneralError",
                },
                fields.iter().map(FieldError::to_message).collect(),
            ),
            EngineError::Conflict(_) => ("Base.1.0.ResourceInUse", Vec::new()),
            EngineError::Internal { .. } => ("Base.1.0.InternalError", Vec::new()),
        };

        json!({
            "error": {
                "code": code,
                "message": self.to_string(),
                "@Message.ExtendedInfo": extended,
            }
        })
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::internal(format!("serialization error: {}", err))
    }
}
