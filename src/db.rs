//! Local library of downloaded worlds
//! Handles SQLite storage for downloaded content and the "already current" check

use crate::types::{LevelMetadata, WorldId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::path::Path;
use tracing::debug;

/// A downloaded world as recorded locally
#[derive(Debug, Clone, PartialEq)]
pub struct LocalWorld {
    pub world_id: WorldId,
    pub name: String,
    pub creator: String,
    pub last_write_time: DateTime<Utc>,
}

pub struct LocalLibrary {
    conn: Connection,
}

impl LocalLibrary {
    /// Open or create the library at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        debug!(path = %path.display(), "Library opened");
        Ok(db)
    }

    /// Throwaway library, used when nothing should touch disk
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS worlds (
                world_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                creator TEXT NOT NULL,
                last_write_time TEXT NOT NULL,
                content BLOB NOT NULL,
                thumbnail BLOB
            );

            CREATE INDEX IF NOT EXISTS idx_worlds_creator ON worlds(creator);",
        )?;
        Ok(())
    }

    /// Store (or overwrite) a downloaded world
    pub fn record_download(
        &self,
        level: &LevelMetadata,
        content: &[u8],
        thumbnail: Option<&[u8]>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO worlds (world_id, name, creator, last_write_time, content, thumbnail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(world_id) DO UPDATE SET
                name = excluded.name,
                creator = excluded.creator,
                last_write_time = excluded.last_write_time,
                content = excluded.content,
                thumbnail = excluded.thumbnail",
            params![
                level.world_id.to_string(),
                level.name,
                level.creator,
                level.last_write_time.to_rfc3339(),
                content,
                thumbnail
            ],
        )?;
        debug!(world = %level.world_id, bytes = content.len(), "World recorded");
        Ok(())
    }

    pub fn get(&self, id: WorldId) -> Result<Option<LocalWorld>> {
        self.conn
            .query_row(
                "SELECT world_id, name, creator, last_write_time FROM worlds WHERE world_id = ?1",
                params![id.to_string()],
                |row| {
                    let raw_id: String = row.get(0)?;
                    let raw_time: String = row.get(3)?;
                    Ok(LocalWorld {
                        world_id: raw_id.parse().map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                0,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?,
                        name: row.get(1)?,
                        creator: row.get(2)?,
                        last_write_time: DateTime::parse_from_rfc3339(&raw_time)
                            .map(|t| t.with_timezone(&Utc))
                            .map_err(|e| {
                                rusqlite::Error::FromSqlConversionFailure(
                                    3,
                                    rusqlite::types::Type::Text,
                                    Box::new(e),
                                )
                            })?,
                    })
                },
            )
            .optional()
    }

    pub fn content(&self, id: WorldId) -> Result<Option<Vec<u8>>> {
        self.conn
            .query_row(
                "SELECT content FROM worlds WHERE world_id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
    }

    /// A local copy exists from the same creator and is at least as new
    pub fn is_current(&self, level: &LevelMetadata) -> Result<bool> {
        Ok(self.get(level.world_id)?.is_some_and(|local| {
            local.world_id == level.world_id
                && local.creator == level.creator
                && local.last_write_time >= level.last_write_time
        }))
    }

    pub fn remove(&self, id: WorldId) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM worlds WHERE world_id = ?1",
            params![id.to_string()],
        )?;
        Ok(n > 0)
    }

    pub fn world_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM worlds", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}
