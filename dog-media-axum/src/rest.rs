use axum::{
    body::Body,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use dog_media::{
    parse_chunk_index, ByteStream, MediaError, MediaMetadata, ObjectId, StreamResponse, UploadId,
};
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::{MediaHttpError, MediaState};

type HttpResult<T> = Result<T, MediaHttpError>;

fn map_json_rejection(rejection: JsonRejection) -> MediaHttpError {
    MediaHttpError::bad_request("Failed to parse the request body as JSON")
        .with_errors(json!({"_schema": [rejection.to_string()]}))
}

fn range_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::RANGE).and_then(|v| v.to_str().ok())
}

/// Body of `POST /uploads/{uploadId}/complete`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[serde(alias = "total_chunks")]
    pub total_chunks: u32,
    pub title: Option<String>,
    pub owner: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(alias = "content_type")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl CompleteRequest {
    fn into_parts(self) -> (u32, MediaMetadata) {
        let metadata = MediaMetadata {
            title: self.title,
            owner: self.owner,
            tags: self.tags,
            content_type: self.content_type,
            attributes: self.attributes,
        };
        (self.total_chunks, metadata)
    }
}

pub fn media_router(state: MediaState) -> Router<()> {
    Router::new()
        .route(
            "/uploads/{upload_id}/chunks/{index}",
            routing::put(receive_chunk)
                .post(receive_chunk)
                // Chunk bodies are streamed; the size limit is enforced while writing.
                .layer(DefaultBodyLimit::disable()),
        )
        .route("/uploads/{upload_id}/complete", routing::post(complete_upload))
        .route(
            "/uploads/{upload_id}",
            routing::get(upload_status).delete(abort_upload),
        )
        .route(
            "/media/{object_id}",
            routing::get(stream_media).head(describe_media),
        )
        .route("/health", routing::get(|| async { "ok" }))
        .with_state(state)
}

async fn receive_chunk(
    State(state): State<MediaState>,
    Path((upload_id, index)): Path<(String, String)>,
    body: Body,
) -> HttpResult<Response> {
    let upload_id = UploadId::parse(upload_id)?;
    let chunk_index = parse_chunk_index(&index)?;

    let stream: ByteStream = Box::pin(
        body.into_data_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
    );

    let ack = state.media.receive_chunk(&upload_id, chunk_index, stream).await?;
    Ok(Json(ack).into_response())
}

async fn complete_upload(
    State(state): State<MediaState>,
    Path(upload_id): Path<String>,
    payload: Result<Json<CompleteRequest>, JsonRejection>,
) -> HttpResult<Response> {
    let upload_id = UploadId::parse(upload_id)?;
    let Json(payload) = payload.map_err(map_json_rejection)?;
    let (total_chunks, metadata) = payload.into_parts();

    match state.media.assemble(&upload_id, total_chunks, metadata).await {
        Ok(object) => Ok((StatusCode::CREATED, Json(object)).into_response()),
        Err(MediaError::AlreadyComplete { object, .. }) => Ok(Json(*object).into_response()),
        Err(e) => Err(e.into()),
    }
}

async fn upload_status(
    State(state): State<MediaState>,
    Path(upload_id): Path<String>,
) -> HttpResult<Response> {
    let upload_id = UploadId::parse(upload_id)?;
    let session = state.media.status(&upload_id)?;
    Ok(Json(session).into_response())
}

async fn abort_upload(
    State(state): State<MediaState>,
    Path(upload_id): Path<String>,
) -> HttpResult<StatusCode> {
    let upload_id = UploadId::parse(upload_id)?;
    state.media.abort(&upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stream_media(
    State(state): State<MediaState>,
    Path(object_id): Path<String>,
    headers: HeaderMap,
) -> HttpResult<Response> {
    let object_id = ObjectId::parse(object_id)?;
    let opened = state.media.serve(&object_id, range_header(&headers)).await?;
    into_http_response(opened, false)
}

async fn describe_media(
    State(state): State<MediaState>,
    Path(object_id): Path<String>,
    headers: HeaderMap,
) -> HttpResult<Response> {
    let object_id = ObjectId::parse(object_id)?;
    let described = state.media.describe(&object_id, range_header(&headers)).await?;
    into_http_response(described, true)
}

fn into_http_response(opened: StreamResponse, head_only: bool) -> HttpResult<Response> {
    let status = StatusCode::from_u16(opened.status).map_err(MediaError::backend)?;

    let mut response_headers = HeaderMap::new();
    for (name, value) in opened.headers() {
        let value = HeaderValue::from_str(&value).map_err(MediaError::backend)?;
        response_headers.insert(HeaderName::from_static(name), value);
    }

    let body = if head_only {
        Body::empty()
    } else {
        Body::from_stream(opened.body)
    };

    Ok((status, response_headers, body).into_response())
}
