// Copyright (c) 2025 - Cowboy AI, Inc.
//! Reusable setters for common property shapes

use serde_json::{json, Value};

use super::PropertyHandle;
use crate::errors::{FieldError, FieldErrorKind};

/// Integer within `[min, max]`; integral floats are accepted and narrowed
pub fn integer_range(
    min: i64,
    max: i64,
) -> impl Fn(&mut PropertyHandle<'_>, &Value) -> Result<(), FieldError> + Send + Sync + 'static {
    move |handle, proposed| {
        let name = handle.name().to_string();
        let n = as_integer(proposed).ok_or_else(|| FieldError::type_mismatch(&name, "integer"))?;
        if n < min || n > max {
            return Err(FieldError::new(
                &name,
                FieldErrorKind::OutOfRange,
                format!("{} must be between {} and {}, got {}", name, min, max, n),
            ));
        }
        handle.set(json!(n));
        Ok(())
    }
}

/// String drawn from a fixed set of values
pub fn one_of(
    allowed: &[&str],
) -> impl Fn(&mut PropertyHandle<'_>, &Value) -> Result<(), FieldError> + Send + Sync + 'static {
    let allowed: Vec<String> = allowed.iter().map(|s| s.to_string()).collect();
    move |handle, proposed| {
        let name = handle.name().to_string();
        let s = proposed
            .as_str()
            .ok_or_else(|| FieldError::type_mismatch(&name, "string"))?;
        if !allowed.iter().any(|a| a == s) {
            return Err(FieldError::new(
                &name,
                FieldErrorKind::InvalidValue,
                format!("{} must be one of {:?}, got {}", name, allowed, s),
            ));
        }
        handle.set(Value::String(s.to_string()));
        Ok(())
    }
}

/// Non-empty string of at most `max_len` characters
pub fn bounded_string(
    max_len: usize,
) -> impl Fn(&mut PropertyHandle<'_>, &Value) -> Result<(), FieldError> + Send + Sync + 'static {
    move |handle, proposed| {
        let name = handle.name().to_string();
        let s = proposed
            .as_str()
            .ok_or_else(|| FieldError::type_mismatch(&name, "string"))?;
        let len = s.chars().count();
        if len == 0 || len > max_len {
            return Err(FieldError::new(
                &name,
                FieldErrorKind::OutOfRange,
                format!("{} must be 1 to {} characters", name, max_len),
            ));
        }
        handle.set(Value::String(s.to_string()));
        Ok(())
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_range() {
        let setter = integer_range(1, 10);
        let current = json!(5);

        let mut handle = PropertyHandle::new("Count", Some(&current));
        setter(&mut handle, &json!(7.0)).unwrap();
        assert_eq!(handle.value(), Some(&json!(7)));

        let mut handle = PropertyHandle::new("Count", Some(&current));
        let err = setter(&mut handle, &json!("7")).unwrap_err();
        assert_eq!(err.kind, FieldErrorKind::TypeMismatch);

        let mut handle = PropertyHandle::new("Count", Some(&current));
        let err = setter(&mut handle, &json!(7.5)).unwrap_err();
        assert_eq!(err.kind, FieldErrorKind::TypeMismatch);
    }

    #[test]
    fn test_one_of() {
        let setter = one_of(&["On", "Off"]);
        let mut handle = PropertyHandle::new("PowerState", None);

        assert_eq!(
            setter(&mut handle, &json!("Sideways")).unwrap_err().kind,
            FieldErrorKind::InvalidValue
        );
        setter(&mut handle, &json!("Off")).unwrap();
        assert_eq!(handle.value(), Some(&json!("Off")));
    }

    #[test]
    fn test_bounded_string() {
        let setter = bounded_string(4);
        let mut handle = PropertyHandle::new("AssetTag", None);

        assert!(setter(&mut handle, &json!("")).is_err());
        assert!(setter(&mut handle, &json!("abcde")).is_err());
        assert!(setter(&mut handle, &json!("abcd")).is_ok());
    }
}
