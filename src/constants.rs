// Scrub Preview Constants
// Defaults shared by the build pipeline and lookup. A build embeds the values it
// used in the published record, so changing these never invalidates old records.

// Sampling
pub const DEFAULT_INTERVAL_SECS: f64 = 2.0;

// Thumbnail settings
pub const DEFAULT_THUMB_WIDTH: u32 = 160;
pub const DEFAULT_THUMB_HEIGHT: u32 = 90;
pub const THUMB_FORMAT: &str = "jpg";
pub const THUMB_QUALITY: u32 = 85;

// Sprite grid
pub const DEFAULT_SPRITE_COLUMNS: u32 = 5;
pub const DEFAULT_SPRITE_ROWS: u32 = 5;

// Concurrency defaults
pub const MAX_CONCURRENT_FFMPEG: usize = 2;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 300; // 5 minutes per ffmpeg call
pub const TOOL_POLL_INTERVAL_MS: u64 = 50;

// Paths
pub const DEFAULT_OUTPUT_FOLDER: &str = "output";
pub const SPRITES_FOLDER: &str = "sprites";
pub const METADATA_FOLDER: &str = "metadata";
pub const WORK_DIR_PREFIX: &str = ".build-";
pub const FRAME_PREFIX: &str = "thumb-";
pub const FRAME_PATTERN: &str = "thumb-%06d.jpg";
pub const SPRITE_PREFIX: &str = "sprite-";
pub const METADATA_FILENAME: &str = "preview.json";
pub const VTT_FILENAME: &str = "preview.vtt";

// URL prefixes for published artifacts
pub const SPRITES_URL_PREFIX: &str = "/sprites";
pub const METADATA_URL_PREFIX: &str = "/metadata";

// HTTP
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4000;

// Hover tooltip gap above the pointer, in pixels
pub const TOOLTIP_GAP_PX: f64 = 12.0;
