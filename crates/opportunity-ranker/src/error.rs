use crate::buildings::repository::StoreError;
use crate::buildings::rescore::RescoreError;
use crate::buildings::service::OpportunityError;
use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;
use tracing::error;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Store(StoreError),
    Opportunity(OpportunityError),
    Rescore(RescoreError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Store(err) => write!(f, "store error: {}", err),
            AppError::Opportunity(err) => write!(f, "{}", err),
            AppError::Rescore(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Opportunity(err) => Some(err),
            AppError::Rescore(err) => Some(err),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Opportunity(OpportunityError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Opportunity(OpportunityError::InvalidArgument(_)) => StatusCode::BAD_REQUEST,
            AppError::Opportunity(OpportunityError::Scoring(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Rescore(RescoreError::AlreadyRunning) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            AppError::Rescore(RescoreError::Aborted {
                building_id,
                processed,
                source,
            }) => {
                error!(%building_id, processed, error = %source, "rescore request failed");
                json!({
                    "error": "batch rescore aborted",
                    "building_id": building_id,
                    "processed": processed,
                })
            }
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!(error = %self, "request failed");
                json!({ "error": "internal server error" })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<OpportunityError> for AppError {
    fn from(value: OpportunityError) -> Self {
        Self::Opportunity(value)
    }
}

impl From<RescoreError> for AppError {
    fn from(value: RescoreError) -> Self {
        Self::Rescore(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildings::domain::BuildingId;
    use crate::buildings::scoring::ScoringError;

    #[test]
    fn maps_domain_errors_to_statuses() {
        let not_found = AppError::from(OpportunityError::NotFound("building 9 not found".into()));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let invalid = AppError::from(OpportunityError::InvalidArgument("limit".into()));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let scoring = AppError::from(OpportunityError::from(ScoringError::MissingYearBuilt(
            BuildingId(4),
        )));
        assert_eq!(scoring.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let busy = AppError::from(RescoreError::AlreadyRunning);
        assert_eq!(busy.status(), StatusCode::CONFLICT);

        let store = AppError::from(StoreError::Unavailable("pool closed".into()));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn store_details_stay_out_of_the_response() {
        let response =
            AppError::from(OpportunityError::Store(StoreError::Unavailable("10.0.0.3".into())))
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        let text = String::from_utf8(body.to_vec()).expect("utf8 body");
        assert!(text.contains("internal server error"));
        assert!(!text.contains("10.0.0.3"));
    }
}
