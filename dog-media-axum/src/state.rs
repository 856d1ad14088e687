use std::sync::Arc;

use dog_media::MediaAdapter;

#[derive(Clone)]
pub struct MediaState {
    pub media: Arc<MediaAdapter>,
}

impl MediaState {
    pub fn new(media: MediaAdapter) -> Self {
        Self {
            media: Arc::new(media),
        }
    }
}
