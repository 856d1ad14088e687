use std::sync::Arc;

use axum::http::header;
use axum::Router;
use dog_media::MediaAdapter;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::rest;
use crate::MediaState;

#[derive(Clone)]
pub struct MediaApp {
    pub media: Arc<MediaAdapter>,
    pub router: Router<()>,
}

impl MediaApp {
    pub fn new(media: MediaAdapter) -> Self {
        let state = MediaState::new(media);
        let media = Arc::clone(&state.media);

        let router = rest::media_router(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
                    .expose_headers([
                        header::CONTENT_RANGE,
                        header::ACCEPT_RANGES,
                        header::CONTENT_LENGTH,
                    ]),
            );

        Self { media, router }
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}
