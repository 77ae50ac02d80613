// Copyright (c) 2025 - Cowboy AI, Inc.
//! Redfish actions
//!
//! An action is a POST to `<resource>/Actions/<Type.Action>`. The action URI
//! is not a resource of its own: the privilege gate runs against the target
//! resource's `POST` requirement, then the registered handler runs.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::resource::RedfishService;
use crate::errors::{EngineError, EngineResult, FieldError, FieldErrorKind};
use crate::privilege::CallerIdentity;

/// Inputs available to an action handler
#[derive(Debug)]
pub struct ActionRequest<'a> {
    /// Resource the action belongs to
    pub target: &'a str,
    pub body: &'a Map<String, Value>,
    pub caller: &'a CallerIdentity,
    pub correlation_id: Uuid,
}

/// Runs one action; the returned value becomes the response body
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn invoke(
        &self,
        service: &RedfishService,
        request: &ActionRequest<'_>,
    ) -> EngineResult<Value>;
}

/// Handler plus the resource whose privileges guard it
#[derive(Clone)]
pub struct RegisteredAction {
    pub target: String,
    pub handler: Arc<dyn ActionHandler>,
}

/// Required string parameter restricted to `allowed`
pub fn allowable_parameter<'a>(
    body: &'a Map<String, Value>,
    name: &str,
    allowed: &[&str],
) -> EngineResult<&'a str> {
    let value = body.get(name).ok_or_else(|| {
        EngineError::field(FieldError::new(
            name,
            FieldErrorKind::MalformedBody,
            format!("{} is required", name),
        ))
    })?;
    let text = value.as_str().ok_or_else(|| {
        EngineError::field(FieldError::new(
            name,
            FieldErrorKind::TypeMismatch,
            format!("expected a string, got {}", crate::meta::json_type_name(value)),
        ))
    })?;
    if !allowed.contains(&text) {
        return Err(EngineError::field(FieldError::new(
            name,
            FieldErrorKind::InvalidValue,
            format!("{} is not one of {:?}", text, allowed),
        )));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_allowable_parameter() {
        let allowed = ["On", "ForceOff"];

        let ok = body(json!({"ResetType": "On"}));
        assert_eq!(allowable_parameter(&ok, "ResetType", &allowed).unwrap(), "On");

        for (raw, kind) in [
            (json!({}), FieldErrorKind::MalformedBody),
            (json!({"ResetType": 1}), FieldErrorKind::TypeMismatch),
            (json!({"ResetType": "Off"}), FieldErrorKind::InvalidValue),
        ] {
            match allowable_parameter(&body(raw), "ResetType", &allowed) {
                Err(EngineError::Validation(errors)) => assert_eq!(errors[0].kind, kind),
                other => panic!("expected validation error, got {:?}", other),
            }
        }
    }
}
