//! Meta keys stamped on ingested content and media.

pub const INGEST_ID: &str = "_bridge_ingest_id";
/// Default for [`ReceiverConfig::source_url_meta_key`](crate::ReceiverConfig::source_url_meta_key).
pub const DEFAULT_SOURCE_URL: &str = "_bridge_source_url";
pub const SOURCE_HASH: &str = "_bridge_source_hash";
pub const MEDIA_MANIFEST: &str = "_bridge_media_manifest";
/// RFC 3339 time of the last successful create or update.
pub const LAST_INGESTED_AT: &str = "_bridge_last_ingested_at";
/// Any non-empty value other than `0` locks the item against content updates.
pub const LOCKED: &str = "_bridge_locked";

pub const FEATURED_URL: &str = "_bridge_featured_image_url";
pub const FEATURED_ALT: &str = "_bridge_featured_image_alt";
pub const FEATURED_WIDTH: &str = "_bridge_featured_image_w";
pub const FEATURED_HEIGHT: &str = "_bridge_featured_image_h";
pub const FEATURED_MODE: &str = "_bridge_featured_image_mode";
pub const FEATURED_STATUS: &str = "_bridge_featured_image_ingest_status";
pub const FEATURED_ERROR: &str = "_bridge_featured_image_ingest_error";

/// Set on media items created from a featured image URL.
pub const MEDIA_SOURCE_URL: &str = "_bridge_featured_source_url";
pub const MEDIA_ALT: &str = "_bridge_media_alt";
