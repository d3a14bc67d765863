//! Core domain types for Mushaf.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SuraAyah {
    pub sura: u16,
    pub ayah: u16,
}

impl SuraAyah {
    pub fn new(sura: u16, ayah: u16) -> Self {
        Self { sura, ayah }
    }
}

impl std::fmt::Display for SuraAyah {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.sura, self.ayah)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLayout {
    key: String,
    title: String,
    description: String,
    page_starts: Vec<SuraAyah>,
}

impl PageLayout {
    pub fn new(
        key: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        page_starts: Vec<SuraAyah>,
    ) -> anyhow::Result<Self> {
        let key = key.into();
        if page_starts.is_empty() {
            anyhow::bail!("layout {key} has no pages");
        }
        if page_starts.windows(2).any(|pair| pair[0] > pair[1]) {
            anyhow::bail!("layout {key} page starts are not in reading order");
        }
        Ok(Self {
            key,
            title: title.into(),
            description: description.into(),
            page_starts,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn page_count(&self) -> u32 {
        self.page_starts.len() as u32
    }

    pub fn page_starts(&self) -> &[SuraAyah] {
        &self.page_starts
    }

    pub fn start_of_page(&self, page: u32) -> anyhow::Result<SuraAyah> {
        if page == 0 || page > self.page_count() {
            anyhow::bail!(
                "page {page} out of range for layout {} (1..={})",
                self.key,
                self.page_count()
            );
        }
        Ok(self.page_starts[(page - 1) as usize])
    }
}

// Inverse of a layout's page -> start-of-page map. Built once per query
// batch, never mutated.
#[derive(Debug, Clone)]
pub struct PositionIndex {
    page_starts: Vec<SuraAyah>,
}

impl PositionIndex {
    pub fn new(layout: &PageLayout) -> Self {
        Self {
            page_starts: layout.page_starts.clone(),
        }
    }

    pub fn page_for(&self, position: SuraAyah) -> u32 {
        // Last page whose start is at or before the position. Positions
        // ahead of the first page start resolve to page 1.
        let preceding = self
            .page_starts
            .partition_point(|start| *start <= position);
        preceding.max(1) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: i64,
    pub sura: Option<u16>,
    pub ayah: Option<u16>,
    pub page: u32,
    pub added_at: i64,
    pub tags: Vec<i64>,
}

impl Bookmark {
    pub fn is_page_bookmark(&self) -> bool {
        self.sura.is_none() && self.ayah.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentPage {
    pub page: u32,
    pub visited_at: i64,
}

#[derive(Debug, Default, Clone)]
pub struct LayoutRegistry {
    layouts: BTreeMap<String, Arc<PageLayout>>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, layout: PageLayout) {
        self.layouts
            .insert(layout.key.clone(), Arc::new(layout));
    }

    pub fn get(&self, key: &str) -> Option<Arc<PageLayout>> {
        self.layouts.get(key).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<PageLayout>)> {
        self.layouts.iter().map(|(key, layout)| (key.as_str(), layout))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.layouts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

#[async_trait::async_trait]
pub trait BookmarkStore: Send + Sync {
    async fn bookmarks(&self) -> anyhow::Result<Vec<Bookmark>>;
    async fn replace_bookmarks(&self, bookmarks: Vec<Bookmark>) -> anyhow::Result<()>;
    async fn recent_pages(&self) -> anyhow::Result<Vec<RecentPage>>;
    async fn replace_recent_pages(&self, pages: Vec<RecentPage>) -> anyhow::Result<()>;
}
