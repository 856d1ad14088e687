use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dog_media::MediaError;
use serde_json::{json, Value};

/// A [`MediaError`] rendered as a Feathers-style JSON body
#[derive(Debug)]
pub struct MediaHttpError {
    pub error: MediaError,
    pub errors: Option<Value>,
}

impl MediaHttpError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        MediaError::invalid(message).into()
    }

    pub fn with_errors(mut self, errors: Value) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn to_json(&self) -> Value {
        let status = self.status();
        let (name, class_name) = feathers_kind(status);

        let mut base = json!({
            "name": name,
            "message": self.error.to_string(),
            "code": status.as_u16(),
            "className": class_name,
            "retryable": self.error.is_retryable(),
            "data": self.data(),
        });
        if let Some(errors) = &self.errors {
            base["errors"] = errors.clone();
        }
        base
    }

    fn data(&self) -> Value {
        let mut data = json!({ "kind": self.error.kind_name() });
        match &self.error {
            MediaError::IncompleteUpload { missing_index, .. } => {
                data["missingIndex"] = json!(missing_index);
            }
            MediaError::RangeNotSatisfiable { total_length } => {
                data["totalLength"] = json!(total_length);
            }
            MediaError::AlreadyComplete { object, .. } => {
                data["object"] = json!(object);
            }
            _ => {}
        }
        data
    }
}

impl From<MediaError> for MediaHttpError {
    fn from(error: MediaError) -> Self {
        Self {
            error,
            errors: None,
        }
    }
}

impl IntoResponse for MediaHttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.error, kind = self.error.kind_name(), "Request failed");
        } else {
            tracing::debug!(error = %self.error, kind = self.error.kind_name(), "Request rejected");
        }

        let body = Json(self.to_json());
        match &self.error {
            MediaError::RangeNotSatisfiable { total_length } => (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{}", total_length))],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

fn feathers_kind(status: StatusCode) -> (&'static str, &'static str) {
    match status.as_u16() {
        400 => ("BadRequest", "bad-request"),
        404 => ("NotFound", "not-found"),
        409 => ("Conflict", "conflict"),
        416 => ("RangeNotSatisfiable", "range-not-satisfiable"),
        502 => ("BadGateway", "bad-gateway"),
        _ => ("GeneralError", "general-error"),
    }
}
