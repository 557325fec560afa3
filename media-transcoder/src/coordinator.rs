//! Process-wide transcode concurrency and GPU health
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


use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

/// Consecutive accelerator failures that disable the GPU path
pub const GPU_FAILURE_THRESHOLD: u32 = 3;

const SOFTWARE_SLOTS: usize = 2;
const GPU_SLOTS: usize = 3;

#[derive(Debug)]
struct BreakerState {
    available: bool,
    consecutive_failures: u32,
}

/// Point-in-time view of the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub available: bool,
    pub consecutive_failures: u32,
}

/// Trips after [`GPU_FAILURE_THRESHOLD`] consecutive accelerator failures.
///
/// Once tripped it stays open until the process restarts.
#[derive(Debug)]
pub struct GpuBreaker {
    state: RwLock<BreakerState>,
}

impl GpuBreaker {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BreakerState {
                available: true,
                consecutive_failures: 0,
            }),
        }
    }

    pub async fn is_available(&self) -> bool {
        self.state.read().await.available
    }

    /// Count one accelerator failure; returns whether the GPU is still usable
    pub async fn record_failure(&self) -> bool {
        let mut state = self.state.write().await;
        state.consecutive_failures += 1;

        warn!(
            failures = state.consecutive_failures,
            threshold = GPU_FAILURE_THRESHOLD,
            "GPU encode failure recorded"
        );

        if state.available && state.consecutive_failures >= GPU_FAILURE_THRESHOLD {
            state.available = false;
            warn!("GPU disabled after repeated failures, using software encoding from now on");
        }
        state.available
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if state.consecutive_failures > 0 {
            info!(
                previous_failures = state.consecutive_failures,
                "GPU encode succeeded, failure count reset"
            );
            state.consecutive_failures = 0;
        }
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state.read().await;
        BreakerSnapshot {
            available: state.available,
            consecutive_failures: state.consecutive_failures,
        }
    }
}

impl Default for GpuBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the lifetime of one rendition; the slot frees on drop
#[derive(Debug)]
pub struct SlotPermit {
    _permit: OwnedSemaphorePermit,
}

/// Bounds how many renditions encode at once across every job in the process
#[derive(Debug)]
pub struct TranscodeCoordinator {
    slots: Arc<Semaphore>,
    max_slots: usize,
    use_gpu: bool,
    breaker: GpuBreaker,
}

impl TranscodeCoordinator {
    /// Two slots for software encoding, three when the GPU is in use
    pub fn new(use_gpu: bool) -> Self {
        let max_slots = if use_gpu { GPU_SLOTS } else { SOFTWARE_SLOTS };
        Self::with_slots(max_slots, use_gpu)
    }

    pub fn with_slots(max_slots: usize, use_gpu: bool) -> Self {
        info!(max_slots, use_gpu, "Transcode coordinator initialized");
        Self {
            slots: Arc::new(Semaphore::new(max_slots)),
            max_slots,
            use_gpu,
            breaker: GpuBreaker::new(),
        }
    }

    pub async fn acquire_slot(&self) -> Result<SlotPermit> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::SlotPoolClosed)?;
        Ok(SlotPermit { _permit: permit })
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    pub fn use_gpu(&self) -> bool {
        self.use_gpu
    }

    /// GPU configured and the breaker still closed
    pub async fn gpu_enabled(&self) -> bool {
        self.use_gpu && self.breaker.is_available().await
    }

    pub fn breaker(&self) -> &GpuBreaker {
        &self.breaker
    }
}
