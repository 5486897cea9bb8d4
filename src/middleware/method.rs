//! Per-route HTTP method allow-list.

use axum::http::Method;

use crate::error::{AppError, AppResult};

/// Reject `method` unless it is in `allowed`.
///
/// Membership is exact: allowing GET does not implicitly allow HEAD or
/// OPTIONS.
pub fn enforce(method: &Method, allowed: &[Method]) -> AppResult<()> {
    if allowed.contains(method) {
        Ok(())
    } else {
        Err(AppError::MethodNotAllowed {
            method: method.clone(),
            allowed: allowed.to_vec(),
        })
    }
}

/// Whether `method` can change server state.
pub fn is_mutating(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_method_passes() {
        assert!(enforce(&Method::POST, &[Method::GET, Method::POST]).is_ok());
    }

    #[test]
    fn test_disallowed_method_lists_allow_set() {
        match enforce(&Method::PATCH, &[Method::GET, Method::POST]) {
            Err(AppError::MethodNotAllowed { method, allowed }) => {
                assert_eq!(method, Method::PATCH);
                assert_eq!(allowed, vec![Method::GET, Method::POST]);
            }
            other => panic!("expected MethodNotAllowed, got {other:?}"),
        }
    }

    #[test]
    fn test_head_not_implied_by_get() {
        assert!(enforce(&Method::HEAD, &[Method::GET]).is_err());
    }

    #[test]
    fn test_is_mutating() {
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::HEAD));
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::PUT));
        assert!(is_mutating(&Method::DELETE));
    }
}
