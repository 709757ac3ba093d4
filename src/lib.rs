// mpa - Library Entry Point
//
// Photo album storage: a catalog in SQLite, originals in a sha256
// content-addressed store, and previews generated on demand by a
// coordinator task.

pub mod constants;
pub mod error;
pub mod config;
pub mod db;
pub mod hash;
pub mod store;
pub mod upload;
pub mod album;
pub mod preview;
pub mod gallery;

pub use album::{AddAlbumOutcome, AlbumEdit, AlbumStore, EditAlbumOutcome, PreviewJob};
pub use config::GalleryConfig;
pub use error::{GalleryError, ItemError, PreviewError, Result};
pub use gallery::{Gallery, WarmReport};
pub use preview::PreviewSize;
pub use store::ContentStore;
pub use upload::{UploadBatch, UploadedFile};
