//! Status-code driven response classification.
//!
//! Every endpoint funnels its `HttpResponse` through the same table:
//!
//! | status        | outcome                              |
//! |---------------|--------------------------------------|
//! | 200, 201      | decode the success payload           |
//! | 422           | `DispatchError::Validation`          |
//! | 400           | `DispatchError::BadRequest`          |
//! | 401           | `DispatchError::Unauthorized`        |
//! | 404           | `DispatchError::NotFound`            |
//! | 409           | `DispatchError::Conflict`            |
//! | 500           | `DispatchError::ServerError`         |
//! | anything else | `DispatchError::Opaque` with raw body |
//!
//! A structured error body that does not decode becomes
//! `DispatchError::Decode`.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{
    ConflictError, DispatchError, NotFoundError, RequestError, Unauthorized, ValidationError,
};
use crate::http::HttpResponse;

/// Classify `response` and decode its success payload into `T`.
pub fn dispatch<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, DispatchError> {
    classify(response)?;
    serde_json::from_str(&response.body).map_err(DispatchError::from)
}

/// Classify `response` without decoding a success payload.
pub fn dispatch_empty(response: &HttpResponse) -> Result<(), DispatchError> {
    classify(response)
}

fn classify(response: &HttpResponse) -> Result<(), DispatchError> {
    let body = response.body.as_str();
    let err = match response.status {
        200 | 201 => {
            debug!(status = response.status, "response ok");
            return Ok(());
        }
        422 => DispatchError::Validation(serde_json::from_str::<ValidationError>(body)?),
        400 => DispatchError::BadRequest(error_payload::<RequestError>(body)?),
        401 => DispatchError::Unauthorized(error_payload::<Unauthorized>(body)?),
        404 => DispatchError::NotFound(error_payload::<NotFoundError>(body)?),
        409 => DispatchError::Conflict(error_payload::<ConflictError>(body)?),
        500 => DispatchError::ServerError,
        status => DispatchError::Opaque {
            status,
            body: response.body.clone(),
        },
    };
    warn!(status = response.status, kind = ?err.kind(), "response failed");
    Err(err)
}

/// Decode an error body; an empty body yields the empty payload.
fn error_payload<E: DeserializeOwned + Default>(body: &str) -> Result<E, serde_json::Error> {
    if body.trim().is_empty() {
        return Ok(E::default());
    }
    serde_json::from_str(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchKind;
    use crate::types::LoginResponse;

    #[test]
    fn ok_and_created_decode_payload() {
        for status in [200, 201] {
            let response = HttpResponse::new(status, r#"{"message":"ok","token":"abc123"}"#);
            let login: LoginResponse = dispatch(&response).unwrap();
            assert_eq!(login.message, "ok");
            assert_eq!(login.token, "abc123");
        }
    }

    #[test]
    fn success_with_wrong_shape_is_decode_error() {
        let response = HttpResponse::new(200, "not json");
        let err = dispatch::<LoginResponse>(&response).unwrap_err();
        assert_eq!(err.kind(), DispatchKind::Decode);
    }

    #[test]
    fn empty_destination_skips_decoding() {
        let response = HttpResponse::new(200, "this is not json either");
        assert!(dispatch_empty(&response).is_ok());
    }

    #[test]
    fn unprocessable_entity_is_validation() {
        let response = HttpResponse::new(
            422,
            r#"{"detail":[{"loc":["body","username"],"msg":"field required","type":"value_error.missing"}]}"#,
        );
        let err = dispatch::<LoginResponse>(&response).unwrap_err();
        assert_eq!(err.kind(), DispatchKind::Validation);
        assert_eq!(
            err.to_string(),
            "validation error: location: [body,username], message: field required, error type: value_error.missing"
        );
    }

    #[test]
    fn malformed_validation_body_is_decode_error() {
        let response = HttpResponse::new(422, "<html>oops</html>");
        let err = dispatch_empty(&response).unwrap_err();
        assert_eq!(err.kind(), DispatchKind::Decode);
    }

    #[test]
    fn bad_request() {
        let response = HttpResponse::new(400, r#"{"detail":"Invalid credentials"}"#);
        let err = dispatch::<LoginResponse>(&response).unwrap_err();
        assert!(matches!(&err, DispatchError::BadRequest(e) if e.detail.as_deref() == Some("Invalid credentials")));
        assert_eq!(err.to_string(), "Bad Request: Invalid credentials");
    }

    #[test]
    fn unauthorized() {
        let response = HttpResponse::new(401, r#"{"message":"Invalid token"}"#);
        let err = dispatch_empty(&response).unwrap_err();
        assert_eq!(err.kind(), DispatchKind::Unauthorized);
        assert_eq!(err.to_string(), "Unauthorized: Invalid token");
    }

    #[test]
    fn not_found() {
        let response = HttpResponse::new(404, r#"{"message":"bot not found"}"#);
        let err = dispatch_empty(&response).unwrap_err();
        assert_eq!(err.kind(), DispatchKind::NotFound);
        assert_eq!(err.to_string(), "Not Found: bot not found");
    }

    #[test]
    fn not_found_with_empty_body() {
        let response = HttpResponse::new(404, "");
        let err = dispatch_empty(&response).unwrap_err();
        assert_eq!(err.kind(), DispatchKind::NotFound);
        assert_eq!(err.to_string(), "Not Found");
    }

    #[test]
    fn conflict() {
        let response = HttpResponse::new(
            409,
            r#"{"detail":{"loc":["body","username"],"msg":"username already exists","type":"value_error"}}"#,
        );
        let err = dispatch_empty(&response).unwrap_err();
        assert_eq!(err.kind(), DispatchKind::Conflict);
        assert_eq!(err.to_string(), "Conflict Response: username already exists");
    }

    #[test]
    fn server_error_ignores_body() {
        let response = HttpResponse::new(500, "{ not even json");
        let err = dispatch::<LoginResponse>(&response).unwrap_err();
        assert_eq!(err.kind(), DispatchKind::ServerError);
        assert_eq!(err.to_string(), "Error status code 500: Internal Server Error");
    }

    #[test]
    fn other_status_is_opaque_with_raw_body() {
        let response = HttpResponse::new(503, "service unavailable");
        let err = dispatch::<LoginResponse>(&response).unwrap_err();
        match err {
            DispatchError::Opaque { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "service unavailable");
            }
            other => panic!("expected Opaque, got {other:?}"),
        }
    }

    #[test]
    fn no_content_is_not_success() {
        let response = HttpResponse::new(204, "");
        let err = dispatch_empty(&response).unwrap_err();
        assert_eq!(err.kind(), DispatchKind::Opaque);
    }

    #[test]
    fn dispatch_is_repeatable() {
        let response = HttpResponse::new(404, r#"{"detail":"missing"}"#);
        let first = dispatch_empty(&response).unwrap_err().to_string();
        let second = dispatch_empty(&response.clone()).unwrap_err().to_string();
        assert_eq!(first, second);

        let response = HttpResponse::new(200, r#"{"message":"ok","token":"t"}"#);
        let a: LoginResponse = dispatch(&response).unwrap();
        let b: LoginResponse = dispatch(&response).unwrap();
        assert_eq!(a, b);
    }
}
