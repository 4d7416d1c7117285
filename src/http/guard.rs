//! Panic guard.
//!
//! Wraps the per-request pipeline. A panic anywhere below is caught before it
//! reaches the server, logged with the request that caused it, and answered
//! with a 500 carrying the panic message. Other requests are unaffected.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;

/// Middleware converting a panicking request into a 500 response.
pub async fn panic_guard(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = request.headers().clone();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                method = %method,
                uri = %uri,
                headers = ?headers,
                panic = %message,
                "Recovered from panic in request handling"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
