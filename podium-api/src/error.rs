use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use podium_core::error::PodiumError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Transport-level wrapper: each engine error variant has exactly one
/// status code.
#[derive(Debug)]
pub struct ApiError(pub PodiumError);

impl From<PodiumError> for ApiError {
    fn from(err: PodiumError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PodiumError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            PodiumError::Forbidden(_) => StatusCode::FORBIDDEN,
            PodiumError::NotFound(_) => StatusCode::NOT_FOUND,
            PodiumError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            PodiumError::Conflict(_) => StatusCode::CONFLICT,
            PodiumError::RuntimeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PodiumError::DeploymentFailed { .. }
            | PodiumError::Serialization(_)
            | PodiumError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match self.0 {
            // Deployment failures carry the helper's captured output so the
            // user can see what git said.
            PodiumError::DeploymentFailed { message, output } => {
                json!({ "error": format!("Deployment failed: {}", message), "output": output })
            }
            err => json!({ "error": err.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: PodiumError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn every_variant_has_its_status() {
        assert_eq!(status_of(PodiumError::NotAuthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(PodiumError::Forbidden("no".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(PodiumError::NotFound("gone".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(PodiumError::InvalidArgument("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(PodiumError::Conflict("taken".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(PodiumError::RuntimeUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(PodiumError::DeploymentFailed {
                message: "clone".into(),
                output: "fatal: not found".into()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(PodiumError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
