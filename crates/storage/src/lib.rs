//! Sqlite-backed persistence for bookmarks and recent pages.

use std::path::Path;

use anyhow::Context as _;
use mushaf_core::{Bookmark, BookmarkStore, RecentPage};
use parking_lot::Mutex;
use rusqlite::Connection;

#[derive(Debug)]
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("open sqlite db at {}", path.as_ref().display()))?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.migrate()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        self.conn.lock().execute_batch(
            r#"
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS bookmarks (
                id INTEGER PRIMARY KEY,
                sura INTEGER,
                ayah INTEGER,
                page INTEGER NOT NULL,
                added_at INTEGER NOT NULL DEFAULT (unixepoch()),
                tags_json TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS recent_pages (
                page INTEGER NOT NULL,
                visited_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn load_bookmarks(&self) -> anyhow::Result<Vec<Bookmark>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, sura, ayah, page, added_at, tags_json FROM bookmarks
             ORDER BY added_at DESC, id",
        )?;
        let rows = stmt.query_map([], |row| {
            let tags_json: String = row.get(5)?;
            Ok(Bookmark {
                id: row.get(0)?,
                sura: row.get(1)?,
                ayah: row.get(2)?,
                page: row.get(3)?,
                added_at: row.get(4)?,
                tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn replace_all_bookmarks(&self, bookmarks: &[Bookmark]) -> anyhow::Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM bookmarks", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO bookmarks (id, sura, ayah, page, added_at, tags_json)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            for bookmark in bookmarks {
                let tags_json = serde_json::to_string(&bookmark.tags)?;
                stmt.execute((
                    bookmark.id,
                    bookmark.sura,
                    bookmark.ayah,
                    bookmark.page,
                    bookmark.added_at,
                    tags_json,
                ))?;
            }
        }
        tx.commit().context("commit bookmark replace")?;
        Ok(())
    }

    pub fn load_recent_pages(&self) -> anyhow::Result<Vec<RecentPage>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT page, visited_at FROM recent_pages ORDER BY visited_at")?;
        let rows = stmt.query_map([], |row| {
            Ok(RecentPage {
                page: row.get(0)?,
                visited_at: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn replace_all_recent_pages(&self, pages: &[RecentPage]) -> anyhow::Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM recent_pages", [])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO recent_pages (page, visited_at) VALUES (?, ?)")?;
            for recent in pages {
                stmt.execute((recent.page, recent.visited_at))?;
            }
        }
        tx.commit().context("commit recent pages replace")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BookmarkStore for Storage {
    async fn bookmarks(&self) -> anyhow::Result<Vec<Bookmark>> {
        self.load_bookmarks()
    }

    async fn replace_bookmarks(&self, bookmarks: Vec<Bookmark>) -> anyhow::Result<()> {
        self.replace_all_bookmarks(&bookmarks)
    }

    async fn recent_pages(&self) -> anyhow::Result<Vec<RecentPage>> {
        self.load_recent_pages()
    }

    async fn replace_recent_pages(&self, pages: Vec<RecentPage>) -> anyhow::Result<()> {
        self.replace_all_recent_pages(&pages)
    }
}
