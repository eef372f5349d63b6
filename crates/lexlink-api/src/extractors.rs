//! JSON body extraction for the order, IP asset and dispute routes.
//!
//! Malformed bodies are a 400; bodies that parse but break a rule serde
//! cannot express (an unknown payment mode, an out-of-range liveness
//! window) are a 422.

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::AppError;

/// Request DTOs that check more than serde can.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Unwrap a JSON body, mapping rejections to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Units(i64);

    impl Validate for Units {
        fn validate(&self) -> Result<(), String> {
            if self.0 > 0 {
                Ok(())
            } else {
                Err("units must be positive".into())
            }
        }
    }

    #[test]
    fn rule_violation_is_validation_error() {
        let err = extract_validated_json(Ok(Json(Units(0)))).err();
        assert!(matches!(err, Some(AppError::Validation(ref m)) if m.contains("positive")));
    }

    #[test]
    fn valid_body_passes_through() {
        let units = extract_validated_json(Ok(Json(Units(3)))).ok();
        assert_eq!(units.map(|u| u.0), Some(3));
    }
}
