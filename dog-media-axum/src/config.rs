use dog_media::MediaConfig;

/// Process configuration for `dog-media-server`
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub media: MediaConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3030,
            media: MediaConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read `DOG_MEDIA_*` variables; unset or unparsable values keep their defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let media = defaults.media;

        let media = MediaConfig {
            staging_dir: env_var_or("DOG_MEDIA_STAGING_DIR", media.staging_dir.display().to_string()).into(),
            objects_dir: env_var_or("DOG_MEDIA_OBJECTS_DIR", media.objects_dir.display().to_string()).into(),
            max_chunk_bytes: env_var_or("DOG_MEDIA_MAX_CHUNK_BYTES", media.max_chunk_bytes),
            max_chunks: env_var_or("DOG_MEDIA_MAX_CHUNKS", media.max_chunks),
            max_object_bytes: env_var_or("DOG_MEDIA_MAX_OBJECT_BYTES", media.max_object_bytes),
            compute_checksum: env_var_or("DOG_MEDIA_CHECKSUM", media.compute_checksum),
            completed_sessions_retained: env_var_or(
                "DOG_MEDIA_COMPLETED_RETAINED",
                media.completed_sessions_retained,
            ),
            ..media
        };

        Self {
            host: env_var_or("DOG_MEDIA_HOST", defaults.host),
            port: env_var_or("DOG_MEDIA_PORT", defaults.port),
            media,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
    T::Err: std::fmt::Debug,
{
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        assert_eq!(env_var_or("DOG_MEDIA_TEST_UNSET_PORT", 3030u16), 3030);

        std::env::set_var("DOG_MEDIA_TEST_BAD_PORT", "not-a-port");
        assert_eq!(env_var_or("DOG_MEDIA_TEST_BAD_PORT", 3030u16), 3030);

        std::env::set_var("DOG_MEDIA_TEST_GOOD_PORT", "8080");
        assert_eq!(env_var_or("DOG_MEDIA_TEST_GOOD_PORT", 3030u16), 8080);
    }
}
