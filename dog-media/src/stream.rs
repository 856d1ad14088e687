use std::sync::Arc;

use tracing::debug;

use crate::range::{resolve_range, RangeResolution, RangeWindow};
use crate::{ByteStream, MediaError, MediaResult, ObjectHead, ObjectId, ObjectStore, ViewHook};

/// Status, headers and body for one streaming request.
///
/// Transport agnostic: an HTTP layer maps `status` and [`headers`](Self::headers)
/// onto its own response type.
pub struct StreamResponse {
    pub status: u16,
    pub content_type: String,
    /// Bytes in `body`
    pub content_length: u64,
    /// `Content-Range` value for 206 and 416 responses
    pub content_range: Option<String>,
    pub window: Option<RangeWindow>,
    pub body: ByteStream,
}

impl StreamResponse {
    pub fn is_partial(&self) -> bool {
        self.status == 206
    }

    /// Header set to send, as lowercase names
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("accept-ranges", "bytes".to_string()),
            ("content-length", self.content_length.to_string()),
        ];
        if self.status != 416 {
            headers.push(("content-type", self.content_type.clone()));
        }
        if let Some(range) = &self.content_range {
            headers.push(("content-range", range.clone()));
        }
        headers
    }

    fn empty_body() -> ByteStream {
        Box::pin(futures_util::stream::empty())
    }
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

/// Serves published objects with byte-range support
pub struct StreamServer {
    objects: Arc<dyn ObjectStore>,
    hook: Option<Arc<dyn ViewHook>>,
    default_content_type: String,
}

impl StreamServer {
    pub fn new(objects: Arc<dyn ObjectStore>, default_content_type: impl Into<String>) -> Self {
        Self {
            objects,
            hook: None,
            default_content_type: default_content_type.into(),
        }
    }

    pub fn with_view_hook(mut self, hook: Arc<dyn ViewHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Open an object for reading.
    ///
    /// A missing object is [`MediaError::ObjectNotFound`] whatever the range.
    /// An unsatisfiable range is not an error here: it produces a 416
    /// response with `Content-Range: bytes */<total>` and an empty body.
    pub async fn serve(&self, id: &ObjectId, range: Option<&str>) -> MediaResult<StreamResponse> {
        let head = self.objects.head(id).await?;
        let mut response = self.plan(&head, range)?;

        if response.status == 416 {
            return Ok(response);
        }

        let (start, len) = match response.window {
            Some(window) => (window.start, window.len()),
            None => (0, head.size_bytes),
        };
        response.body = self.objects.open_range(id, start, len).await?;

        if let Some(hook) = &self.hook {
            hook.on_served(id, response.window.as_ref());
        }
        debug!(object_id = %id, status = response.status, bytes = len, "Serving object");
        Ok(response)
    }

    /// Same status and headers as [`serve`](Self::serve) without opening the
    /// content or counting a view. Backs `HEAD` requests.
    pub async fn describe(&self, id: &ObjectId, range: Option<&str>) -> MediaResult<StreamResponse> {
        let head = self.objects.head(id).await?;
        self.plan(&head, range)
    }

    fn plan(&self, head: &ObjectHead, range: Option<&str>) -> MediaResult<StreamResponse> {
        let total = head.size_bytes;
        let content_type = head
            .content_type
            .clone()
            .unwrap_or_else(|| self.default_content_type.clone());

        let response = match resolve_range(range, total) {
            Ok(RangeResolution::FullContent) => StreamResponse {
                status: 200,
                content_type,
                content_length: total,
                content_range: None,
                window: None,
                body: StreamResponse::empty_body(),
            },
            Ok(RangeResolution::Partial(window)) => StreamResponse {
                status: 206,
                content_type,
                content_length: window.len(),
                content_range: Some(window.content_range()),
                window: Some(window),
                body: StreamResponse::empty_body(),
            },
            Err(MediaError::RangeNotSatisfiable { total_length }) => StreamResponse {
                status: 416,
                content_type,
                content_length: 0,
                content_range: Some(format!("bytes */{}", total_length)),
                window: None,
                body: StreamResponse::empty_body(),
            },
            Err(e) => return Err(e),
        };
        Ok(response)
    }
}
