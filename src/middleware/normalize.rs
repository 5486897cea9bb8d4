//! Fault boundary between the pipeline and the route handler.
//!
//! Typed [`AppError`]s already render themselves (see `error.rs`). This stage
//! covers the rest: a handler that panics is reported as a generic 500 and
//! the panic payload is logged server-side only.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use tracing::error;

use crate::error::{AppError, AppResult};

/// Run `future`, converting a panic into `AppError::Internal`.
pub async fn catch_panic<F, T>(future: F) -> AppResult<T>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => Ok(value),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(panic = %message, "Handler panicked");
            Err(AppError::Internal(format!("handler panicked: {message}")))
        }
    }
}

/// Turn a pipeline outcome into the response sent to the client.
pub fn into_response(outcome: AppResult<Response>) -> Response {
    outcome.unwrap_or_else(IntoResponse::into_response)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
