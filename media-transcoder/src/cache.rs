//! Video info cache invalidation
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


use redis::AsyncCommands;
use tracing::{debug, warn};

/// Cache key holding a video's rendered info
pub fn video_info_key(video_id: i64) -> String {
    format!("video_info:{}", video_id)
}

/// Drops cached video info after its status changes.
///
/// Invalidation never blocks or fails the caller.
pub trait VideoCache: Send + Sync {
    fn invalidate(&self, video_id: i64);
}

/// Redis-backed cache
pub struct RedisVideoCache {
    client: redis::Client,
}

impl RedisVideoCache {
    pub fn new(redis_url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }
}

impl VideoCache for RedisVideoCache {
    fn invalidate(&self, video_id: i64) {
        let client = self.client.clone();
        let key = video_info_key(video_id);

        tokio::spawn(async move {
            let result: redis::RedisResult<()> = async {
                let mut conn = client.get_multiplexed_async_connection().await?;
                conn.del::<_, ()>(&key).await
            }
            .await;

            match result {
                Ok(()) => debug!(key = %key, "Video cache invalidated"),
                Err(e) => warn!(key = %key, error = %e, "Failed to invalidate video cache"),
            }
        });
    }
}

/// No cache configured
#[derive(Debug, Default)]
pub struct NoopVideoCache;

impl VideoCache for NoopVideoCache {
    fn invalidate(&self, video_id: i64) {
        debug!(video_id, "No video cache configured, skipping invalidation");
    }
}
