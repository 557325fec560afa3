//! Persistence for manifests and resource/video status
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use async_trait::async_trait;
use chrono::Utc;
use cinder_types::{
    NewVideoIndexFile, Resource, ResourceUpdate, Status, Video, VideoIndexFile, VideoUpdate,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_postgres::{Client, NoTls};
use tracing::{error, info, warn};

use crate::error::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Manifest rows and the entry point for status transactions
#[async_trait]
pub trait TranscodeStore: Send + Sync {
    /// Append one manifest row, returning its id
    async fn insert_index_file(&self, file: &NewVideoIndexFile) -> StoreResult<i64>;

    /// Open a transaction; it must end in `commit` or `rollback`
    async fn begin(&self) -> StoreResult<Box<dyn StatusTransaction + '_>>;

    fn backend(&self) -> &'static str;
}

/// Reads and conditional writes performed atomically by completion logic
#[async_trait]
pub trait StatusTransaction: Send {
    async fn count_index_files(&mut self, resource_id: i64) -> StoreResult<i64>;

    /// Returns rows affected
    async fn update_resource(&mut self, resource_id: i64, update: &ResourceUpdate) -> StoreResult<u64>;

    /// Resources of a video, optionally only those in `status`
    async fn count_resources(&mut self, video_id: i64, status: Option<Status>) -> StoreResult<i64>;

    /// Update a video unless a reviewer already approved or rejected it.
    /// Returns rows affected.
    async fn update_video_unless_reviewed(
        &mut self,
        video_id: i64,
        update: &VideoUpdate,
    ) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// PostgreSQL store on one dedicated connection.
///
/// Transactions hold the connection lock from `BEGIN` until they finish, so
/// statements from concurrent jobs never interleave inside one.
pub struct PgTranscodeStore {
    client: Arc<Mutex<Client>>,
}

impl PgTranscodeStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        info!("Connecting to transcode database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Database connection error");
            }
        });

        Self::run_migrations(&client).await?;

        info!("Transcode database connected and initialized");

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
        })
    }

    async fn run_migrations(client: &Client) -> StoreResult<()> {
        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS video (
                    id BIGSERIAL PRIMARY KEY,
                    status INTEGER NOT NULL DEFAULT 100
                );

                CREATE TABLE IF NOT EXISTS resource (
                    id BIGSERIAL PRIMARY KEY,
                    vid BIGINT NOT NULL REFERENCES video(id),
                    status INTEGER NOT NULL DEFAULT 100
                );

                CREATE INDEX IF NOT EXISTS idx_resource_vid_status
                ON resource(vid, status);

                CREATE TABLE IF NOT EXISTS video_index_file (
                    id BIGSERIAL PRIMARY KEY,
                    resource_id BIGINT NOT NULL REFERENCES resource(id),
                    quality TEXT NOT NULL,
                    dir_name TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX IF NOT EXISTS idx_video_index_file_resource_id
                ON video_index_file(resource_id);
                "#,
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl TranscodeStore for PgTranscodeStore {
    async fn insert_index_file(&self, file: &NewVideoIndexFile) -> StoreResult<i64> {
        let client = self.client.lock().await;
        let row = client
            .query_one(
                r#"
                INSERT INTO video_index_file (resource_id, quality, dir_name, content)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                "#,
                &[&file.resource_id, &file.quality, &file.dir_name, &file.content],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn begin(&self) -> StoreResult<Box<dyn StatusTransaction + '_>> {
        let client = Arc::clone(&self.client).lock_owned().await;
        client.batch_execute("BEGIN").await?;
        Ok(Box::new(PgTransaction {
            client: Some(client),
        }))
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

struct PgTransaction {
    client: Option<OwnedMutexGuard<Client>>,
}

impl PgTransaction {
    fn client(&self) -> StoreResult<&Client> {
        self.client
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("transaction already finished".to_string()))
    }

    async fn finish(mut self, statement: &str) -> StoreResult<()> {
        match self.client.take() {
            Some(client) => Ok(client.batch_execute(statement).await?),
            None => Err(StoreError::Unavailable("transaction already finished".to_string())),
        }
    }
}

#[async_trait]
impl StatusTransaction for PgTransaction {
    async fn count_index_files(&mut self, resource_id: i64) -> StoreResult<i64> {
        let row = self
            .client()?
            .query_one(
                "SELECT COUNT(*) FROM video_index_file WHERE resource_id = $1",
                &[&resource_id],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn update_resource(&mut self, resource_id: i64, update: &ResourceUpdate) -> StoreResult<u64> {
        update.validate()?;
        let rows = self
            .client()?
            .execute(
                "UPDATE resource SET status = $1 WHERE id = $2",
                &[&update.status.code(), &resource_id],
            )
            .await?;
        Ok(rows)
    }

    async fn count_resources(&mut self, video_id: i64, status: Option<Status>) -> StoreResult<i64> {
        let client = self.client()?;
        let row = match status {
            Some(status) => {
                client
                    .query_one(
                        "SELECT COUNT(*) FROM resource WHERE vid = $1 AND status = $2",
                        &[&video_id, &status.code()],
                    )
                    .await?
            }
            None => {
                client
                    .query_one("SELECT COUNT(*) FROM resource WHERE vid = $1", &[&video_id])
                    .await?
            }
        };
        Ok(row.get(0))
    }

    async fn update_video_unless_reviewed(
        &mut self,
        video_id: i64,
        update: &VideoUpdate,
    ) -> StoreResult<u64> {
        update.validate()?;
        let rows = self
            .client()?
            .execute(
                "UPDATE video SET status = $1 WHERE id = $2 AND status NOT IN ($3, $4)",
                &[
                    &update.status.code(),
                    &video_id,
                    &Status::Approved.code(),
                    &Status::Rejected.code(),
                ],
            )
            .await?;
        Ok(rows)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        (*self).finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        (*self).finish("ROLLBACK").await
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        // Abandoned mid-flight: roll back before the connection is reused
        if let Some(client) = self.client.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = client.batch_execute("ROLLBACK").await {
                            error!(error = %e, "Failed to roll back abandoned transaction");
                        }
                    });
                }
                Err(_) => warn!("Transaction dropped outside a runtime, connection left open"),
            }
        }
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Tables {
    videos: HashMap<i64, Video>,
    resources: HashMap<i64, Resource>,
    index_files: Vec<VideoIndexFile>,
    next_index_id: i64,
}

/// In-process store for tests and database-less runs.
///
/// A transaction works on a copy of the tables and writes it back on commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_video(&self, video: Video) {
        self.tables.lock().await.videos.insert(video.id, video);
    }

    pub async fn insert_resource(&self, resource: Resource) {
        self.tables.lock().await.resources.insert(resource.id, resource);
    }

    pub async fn video(&self, id: i64) -> Option<Video> {
        self.tables.lock().await.videos.get(&id).cloned()
    }

    pub async fn resource(&self, id: i64) -> Option<Resource> {
        self.tables.lock().await.resources.get(&id).cloned()
    }

    pub async fn index_files(&self, resource_id: i64) -> Vec<VideoIndexFile> {
        self.tables
            .lock()
            .await
            .index_files
            .iter()
            .filter(|f| f.resource_id == resource_id)
            .cloned()
            .collect()
    }

    /// Make the next commit fail and discard its changes
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TranscodeStore for MemoryStore {
    async fn insert_index_file(&self, file: &NewVideoIndexFile) -> StoreResult<i64> {
        let mut tables = self.tables.lock().await;
        tables.next_index_id += 1;
        let id = tables.next_index_id;
        tables.index_files.push(VideoIndexFile {
            id,
            resource_id: file.resource_id,
            quality: file.quality.clone(),
            dir_name: file.dir_name.clone(),
            content: file.content.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn begin(&self) -> StoreResult<Box<dyn StatusTransaction + '_>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            fail_commit: self.fail_next_commit.swap(false, Ordering::SeqCst),
        }))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    fail_commit: bool,
}

#[async_trait]
impl StatusTransaction for MemoryTransaction {
    async fn count_index_files(&mut self, resource_id: i64) -> StoreResult<i64> {
        Ok(self
            .working
            .index_files
            .iter()
            .filter(|f| f.resource_id == resource_id)
            .count() as i64)
    }

    async fn update_resource(&mut self, resource_id: i64, update: &ResourceUpdate) -> StoreResult<u64> {
        update.validate()?;
        match self.working.resources.get_mut(&resource_id) {
            Some(resource) => {
                resource.status = update.status;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn count_resources(&mut self, video_id: i64, status: Option<Status>) -> StoreResult<i64> {
        Ok(self
            .working
            .resources
            .values()
            .filter(|r| r.vid == video_id && status.map_or(true, |s| r.status == s))
            .count() as i64)
    }

    async fn update_video_unless_reviewed(
        &mut self,
        video_id: i64,
        update: &VideoUpdate,
    ) -> StoreResult<u64> {
        update.validate()?;
        match self.working.videos.get_mut(&video_id) {
            Some(video) if !video.status.is_review_outcome() => {
                video.status = update.status;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            mut guard,
            working,
            fail_commit,
        } = *self;
        if fail_commit {
            return Err(StoreError::Unavailable("commit rejected".to_string()));
        }
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
