mod admin;
pub mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use public::{HttpState, build_router};

use axum::Json;
use axum::extract::FromRef;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;

/// Standard success envelope shared by every JSON endpoint.
fn success(data: Value) -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": data,
    }))
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

#[derive(Clone)]
pub struct RouterState {
    pub http: HttpState,
    pub admin: AdminState,
}

impl FromRef<RouterState> for HttpState {
    fn from_ref(state: &RouterState) -> Self {
        state.http.clone()
    }
}

impl FromRef<RouterState> for AdminState {
    fn from_ref(state: &RouterState) -> Self {
        state.admin.clone()
    }
}
