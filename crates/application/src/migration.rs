//! Bookmark and recent-page migration between page layouts.

use std::sync::Arc;

use anyhow::Context as _;
use mushaf_core::{
    Bookmark, BookmarkStore, LayoutRegistry, PageLayout, PositionIndex, RecentPage, SuraAyah,
};
use tracing::debug;

pub trait ChangeNotifier: Send + Sync {
    fn bookmarks_updated(&self);
    fn recent_pages_updated(&self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub bookmarks_updated: bool,
    pub recent_pages_updated: bool,
}

pub fn remap_bookmarks(
    source: &PageLayout,
    destination: &PositionIndex,
    bookmarks: &[Bookmark],
) -> anyhow::Result<Vec<Bookmark>> {
    bookmarks
        .iter()
        .map(|bookmark| {
            let start = source.start_of_page(bookmark.page)?;
            // An explicit anchor wins; either half falls back to the start
            // of the bookmarked page when absent.
            let anchor = SuraAyah::new(
                bookmark.sura.unwrap_or(start.sura),
                bookmark.ayah.unwrap_or(start.ayah),
            );
            Ok(Bookmark {
                page: destination.page_for(anchor),
                ..bookmark.clone()
            })
        })
        .collect()
}

pub fn remap_recent_pages(
    source: &PageLayout,
    destination: &PositionIndex,
    pages: &[RecentPage],
) -> anyhow::Result<Vec<RecentPage>> {
    let mut ordered = pages.to_vec();
    ordered.sort_by_key(|recent| recent.visited_at);
    ordered
        .into_iter()
        .map(|recent| {
            let anchor = source.start_of_page(recent.page)?;
            Ok(RecentPage {
                page: destination.page_for(anchor),
                ..recent
            })
        })
        .collect()
}

pub struct MigrationEngine {
    registry: Arc<LayoutRegistry>,
    store: Arc<dyn BookmarkStore>,
    notifier: Arc<dyn ChangeNotifier>,
}

impl MigrationEngine {
    pub fn new(
        registry: Arc<LayoutRegistry>,
        store: Arc<dyn BookmarkStore>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            registry,
            store,
            notifier,
        }
    }

    // Layouts with equal page counts are assumed to share indexing, so the
    // migration is a no-op for them. Both layouts must use the default
    // (Hafs/Kufi) verse counting; a destination in another counting
    // convention is not detected here and would be remapped incorrectly.
    pub async fn migrate(
        &self,
        source_key: &str,
        destination_key: &str,
    ) -> anyhow::Result<MigrationOutcome> {
        let source = self
            .registry
            .get(source_key)
            .with_context(|| format!("unknown page layout {source_key}"))?;
        let destination = self
            .registry
            .get(destination_key)
            .with_context(|| format!("unknown page layout {destination_key}"))?;

        if source.page_count() == destination.page_count() {
            debug!(source_key, destination_key, "equal page counts, nothing to migrate");
            return Ok(MigrationOutcome::default());
        }

        let index = PositionIndex::new(&destination);
        let (bookmarks, recent_pages) = tokio::join!(
            self.migrate_bookmarks(&source, &index),
            self.migrate_recent_pages(&source, &index),
        );

        // The two sub-operations commit independently; one may have been
        // written even when the other failed.
        Ok(MigrationOutcome {
            bookmarks_updated: bookmarks.context("migrate bookmarks")?,
            recent_pages_updated: recent_pages.context("migrate recent pages")?,
        })
    }

    async fn migrate_bookmarks(
        &self,
        source: &PageLayout,
        destination: &PositionIndex,
    ) -> anyhow::Result<bool> {
        let current = self.store.bookmarks().await?;
        let updated = remap_bookmarks(source, destination, &current)?;
        if updated == current {
            debug!("bookmarks unchanged, skipping store write");
            return Ok(false);
        }
        self.store.replace_bookmarks(updated).await?;
        self.notifier.bookmarks_updated();
        Ok(true)
    }

    async fn migrate_recent_pages(
        &self,
        source: &PageLayout,
        destination: &PositionIndex,
    ) -> anyhow::Result<bool> {
        let current = self.store.recent_pages().await?;
        let updated = remap_recent_pages(source, destination, &current)?;

        let mut chronological = current;
        chronological.sort_by_key(|recent| recent.visited_at);
        if updated == chronological {
            debug!("recent pages unchanged, skipping store write");
            return Ok(false);
        }
        self.store.replace_recent_pages(updated).await?;
        self.notifier.recent_pages_updated();
        Ok(true)
    }
}
