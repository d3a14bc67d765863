//! Test helpers and fixtures.

use std::sync::atomic::{AtomicUsize, Ordering};

use mushaf_application::ChangeNotifier;
use mushaf_core::{Bookmark, BookmarkStore, LayoutRegistry, PageLayout, RecentPage, SuraAyah};
use parking_lot::Mutex;

const AYAHS_PER_SURA: u32 = 50;

pub fn make_layout(key: &str, page_starts: &[(u16, u16)]) -> PageLayout {
    PageLayout::new(
        key,
        key.to_uppercase(),
        format!("{key} test layout"),
        page_starts
            .iter()
            .map(|&(sura, ayah)| SuraAyah::new(sura, ayah))
            .collect(),
    )
    .expect("valid fixture layout")
}

// A synthetic layout spreading `total_verses` of a fixed-shape text evenly
// over `pages`, so two layouts with different page counts cover the same
// span and can be migrated between.
pub fn spread_layout(key: &str, pages: u32, total_verses: u32) -> PageLayout {
    let starts = (0..pages)
        .map(|page| {
            let verse = (page as u64 * total_verses as u64 / pages as u64) as u32;
            SuraAyah::new(
                (verse / AYAHS_PER_SURA + 1) as u16,
                (verse % AYAHS_PER_SURA + 1) as u16,
            )
        })
        .collect();
    PageLayout::new(key, key.to_uppercase(), format!("{key} test layout"), starts)
        .expect("valid fixture layout")
}

pub fn make_registry(layouts: impl IntoIterator<Item = PageLayout>) -> LayoutRegistry {
    let mut registry = LayoutRegistry::new();
    for layout in layouts {
        registry.register(layout);
    }
    registry
}

#[derive(Default)]
pub struct MemoryStore {
    pub bookmarks: Mutex<Vec<Bookmark>>,
    pub recent_pages: Mutex<Vec<RecentPage>>,
}

#[async_trait::async_trait]
impl BookmarkStore for MemoryStore {
    async fn bookmarks(&self) -> anyhow::Result<Vec<Bookmark>> {
        Ok(self.bookmarks.lock().clone())
    }

    async fn replace_bookmarks(&self, bookmarks: Vec<Bookmark>) -> anyhow::Result<()> {
        *self.bookmarks.lock() = bookmarks;
        Ok(())
    }

    async fn recent_pages(&self) -> anyhow::Result<Vec<RecentPage>> {
        Ok(self.recent_pages.lock().clone())
    }

    async fn replace_recent_pages(&self, pages: Vec<RecentPage>) -> anyhow::Result<()> {
        *self.recent_pages.lock() = pages;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    bookmarks: AtomicUsize,
    recent_pages: AtomicUsize,
}

impl RecordingNotifier {
    pub fn bookmark_signals(&self) -> usize {
        self.bookmarks.load(Ordering::SeqCst)
    }

    pub fn recent_page_signals(&self) -> usize {
        self.recent_pages.load(Ordering::SeqCst)
    }
}

impl ChangeNotifier for RecordingNotifier {
    fn bookmarks_updated(&self) {
        self.bookmarks.fetch_add(1, Ordering::SeqCst);
    }

    fn recent_pages_updated(&self) {
        self.recent_pages.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mushaf_application::MigrationEngine;
    use mushaf_core::PositionIndex;
    use mushaf_storage::Storage;

    use super::*;

    fn bookmark(id: i64, page: u32, added_at: i64) -> Bookmark {
        Bookmark {
            id,
            sura: None,
            ayah: None,
            page,
            added_at,
            tags: Vec::new(),
        }
    }

    #[test]
    fn spread_layouts_are_monotonic_and_sized() {
        let layout = spread_layout("madani", 604, 3020);
        assert_eq!(layout.page_count(), 604);
        assert!(
            layout
                .page_starts()
                .windows(2)
                .all(|pair| pair[0] <= pair[1])
        );
        assert_eq!(layout.start_of_page(1).unwrap(), SuraAyah::new(1, 1));
    }

    #[tokio::test]
    async fn migration_end_to_end_over_sqlite() -> anyhow::Result<()> {
        let registry = make_registry([
            make_layout("wide", &[(1, 1), (2, 1), (2, 50), (3, 1), (4, 1)]),
            make_layout("narrow", &[(1, 1), (2, 30), (3, 1), (4, 20)]),
        ]);
        let storage = Arc::new(Storage::open_in_memory()?);
        storage.replace_all_bookmarks(&[
            Bookmark {
                sura: Some(2),
                ayah: Some(40),
                tags: vec![11],
                ..bookmark(1, 2, 100)
            },
            bookmark(2, 4, 200),
        ])?;
        storage.replace_all_recent_pages(&[
            RecentPage {
                page: 4,
                visited_at: 300,
            },
            RecentPage {
                page: 1,
                visited_at: 100,
            },
        ])?;

        let notifier = Arc::new(RecordingNotifier::default());
        let engine = MigrationEngine::new(
            Arc::new(registry),
            Arc::clone(&storage) as Arc<dyn BookmarkStore>,
            Arc::clone(&notifier) as Arc<dyn ChangeNotifier>,
        );

        let outcome = engine.migrate("wide", "narrow").await?;
        assert!(outcome.bookmarks_updated);
        assert!(outcome.recent_pages_updated);

        let bookmarks = storage.load_bookmarks()?;
        assert_eq!(bookmarks.len(), 2);
        // Date-added sort puts the newer bookmark first.
        assert_eq!(bookmarks[0].id, 2);
        assert_eq!(bookmarks[0].page, 3);
        assert_eq!(bookmarks[1].id, 1);
        assert_eq!(bookmarks[1].page, 2);
        assert_eq!(bookmarks[1].sura, Some(2));
        assert_eq!(bookmarks[1].ayah, Some(40));
        assert_eq!(bookmarks[1].tags, vec![11]);

        let recents = storage.load_recent_pages()?;
        let stamps: Vec<i64> = recents.iter().map(|recent| recent.visited_at).collect();
        assert_eq!(stamps, vec![100, 300]);
        assert_eq!(recents[0].page, 1);
        assert_eq!(recents[1].page, 3);

        assert_eq!(notifier.bookmark_signals(), 1);
        assert_eq!(notifier.recent_page_signals(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn large_layout_pair_preserves_anchors() -> anyhow::Result<()> {
        let source = spread_layout("madani", 604, 3020);
        let destination = spread_layout("shemerly", 521, 3020);
        let oracle = PositionIndex::new(&destination);
        let registry = make_registry([source.clone(), destination.clone()]);

        let store = Arc::new(MemoryStore::default());
        *store.bookmarks.lock() = vec![
            Bookmark {
                sura: Some(18),
                ayah: Some(1),
                ..bookmark(1, 301, 100)
            },
            bookmark(2, 301, 200),
        ];
        *store.recent_pages.lock() = vec![
            RecentPage {
                page: 301,
                visited_at: 200,
            },
            RecentPage {
                page: 50,
                visited_at: 100,
            },
        ];

        let notifier = Arc::new(RecordingNotifier::default());
        let engine = MigrationEngine::new(
            Arc::new(registry),
            Arc::clone(&store) as Arc<dyn BookmarkStore>,
            Arc::clone(&notifier) as Arc<dyn ChangeNotifier>,
        );

        let outcome = engine.migrate("madani", "shemerly").await?;
        assert!(outcome.bookmarks_updated);

        let bookmarks = store.bookmarks.lock().clone();
        assert_eq!(bookmarks.len(), 2);
        // Explicit anchor wins over the stored page.
        assert_eq!(bookmarks[0].page, oracle.page_for(SuraAyah::new(18, 1)));
        // Derived anchor comes from the source start of the stored page.
        assert_eq!(
            bookmarks[1].page,
            oracle.page_for(source.start_of_page(301)?)
        );

        let recents = store.recent_pages.lock().clone();
        assert_eq!(recents.len(), 2);
        assert_eq!(recents[0].visited_at, 100);
        assert_eq!(recents[0].page, oracle.page_for(source.start_of_page(50)?));
        assert_eq!(recents[1].page, oracle.page_for(source.start_of_page(301)?));
        Ok(())
    }
}
