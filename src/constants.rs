// mpa Constants
// On-disk layout values are part of the storage format. Do not change them
// without a migration for existing libraries.

// Paths
pub const FILES_DIR_SUFFIX: &str = ".mpa";
pub const IMAGES_FOLDER: &str = "images";
pub const PREVIEW_FOLDER: &str = "preview";
pub const UPLOAD_FOLDER: &str = "upload";
pub const CONFIG_FILENAME: &str = "config.json";
pub const DEFAULT_DB_FILENAME: &str = "mpa.db";
pub const TEMP_FILE_PREFIX: &str = "tmp";

// Content addressing
pub const HASH_HEX_LEN: usize = 64;
pub const HASH_SHARD_LEN: usize = 3;
pub const HASH_BUFFER_SIZE: usize = 64 * 1024;

// Preview artifacts
pub const PREVIEW_LARGE_SUFFIX: &str = ".1";
pub const PREVIEW_THUMB_SUFFIX: &str = ".2";
pub const PREVIEW_LARGE_SIZE: u32 = 1280;
pub const PREVIEW_THUMB_SIZE: u32 = 320;
pub const PREVIEW_JPEG_QUALITY: u8 = 75;

// Preview coordinator
pub const PREVIEW_QUEUE_LIMIT: usize = 4096;
pub const PREVIEW_INBOUND_CAPACITY: usize = 1;

// Timestamps are stored as UTC text in this format
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// Image extensions picked up when a directory is given to the CLI
pub const IMAGE_EXTENSIONS: [&str; 7] = [
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"
];
