//! Application orchestration layer for Mushaf.

mod migration;
mod previews;

pub use migration::{
    ChangeNotifier, MigrationEngine, MigrationOutcome, remap_bookmarks, remap_recent_pages,
};
pub use previews::{
    AssetItem, AssetState, Downloader, PreviewConfig, PreviewCoordinator, PreviewView,
};
