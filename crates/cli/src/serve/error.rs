//! Engine error to HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;

use carpark_engine::ParkingError;

/// JSON error body with the given status.
pub(crate) fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// [`ParkingError`] as an HTTP response: not-found variants are 404,
/// rejected transitions and bad input are 400, store trouble is 500.
pub(crate) struct ApiError(pub(crate) ParkingError);

impl From<ParkingError> for ApiError {
    fn from(err: ParkingError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ParkingError::SpaceNotFound { .. }
            | ParkingError::SessionNotFound { .. }
            | ParkingError::AlertNotFound { .. } => StatusCode::NOT_FOUND,
            ParkingError::InvalidTransition { .. } | ParkingError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ParkingError::StoreUnavailable(_) => {
                tracing::error!(error = %self.0, "store failure surfaced to client");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        json_error(status, &self.0.to_string())
    }
}

/// `Json<T>` whose rejection is our 400 body instead of axum's plain-text
/// default.
pub(crate) struct ApiJson<T>(pub(crate) T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError(ParkingError::Validation(body_text(rejection)))),
        }
    }
}

fn body_text(rejection: JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "expected request with Content-Type: application/json".to_string()
        }
        other => other.body_text(),
    }
}
