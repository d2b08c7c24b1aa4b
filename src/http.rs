//! src/http.rs
use actix_web::body::BoxBody;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, Responder};
use serde::Serialize;

/// Walk an error's source chain so logs show the cause, not just the
/// outermost message.
pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}

/// JSON response restricted to a single payload type.
///
/// A handler returning `JsonResponse<Summary>` can only ever serialize a
/// `Summary`.
pub struct JsonResponse<T: Serialize> {
    payload: T,
    status: StatusCode,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            status: StatusCode::OK,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl<T: Serialize> Responder for JsonResponse<T> {
    type Body = BoxBody;

    fn respond_to(self, _req: &HttpRequest) -> HttpResponse {
        HttpResponse::build(self.status).json(&self.payload)
    }
}
