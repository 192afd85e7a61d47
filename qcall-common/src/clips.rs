//! Announcement clip path handling

/// Default static prefix the server puts in front of clip paths
pub const DEFAULT_STATIC_PREFIX: &str = "/static/";

/// Normalise a clip path received from the server into a cache key.
///
/// A leading `static_prefix` is stripped, then any leading slashes, so
/// `/static/audio/a.wav`, `static/audio/a.wav` and `audio/a.wav` all map to
/// `audio/a.wav`. Surrounding whitespace is ignored.
pub fn normalize_clip_path(raw: &str, static_prefix: &str) -> String {
    let trimmed = raw.trim();
    let prefix = static_prefix.trim();

    let without_prefix = if !prefix.is_empty() {
        trimmed
            .strip_prefix(prefix)
            .or_else(|| trimmed.strip_prefix(prefix.trim_start_matches('/')))
            .unwrap_or(trimmed)
    } else {
        trimmed
    };

    without_prefix.trim_start_matches('/').to_string()
}

/// File extension of a clip key, used as a format hint for decoding
pub fn clip_extension(key: &str) -> Option<&str> {
    let file_name = key.rsplit('/').next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}
