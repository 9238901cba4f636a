// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::num::NonZeroUsize;
use std::thread;

use serde::Serialize;
use sysinfo::System;

/// Memory used by the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[non_exhaustive]
pub struct MemoryStats {
    /// Resident set size.
    pub resident_bytes: u64,
    /// Virtual memory size.
    pub virtual_bytes: u64,
}

impl MemoryStats {
    /// Reads the current process's memory usage, or `None` if the platform does not expose it.
    #[must_use]
    pub fn current() -> Option<Self> {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut system = System::new();
        if !system.refresh_process(pid) {
            return None;
        }

        system.process(pid).map(|process| Self {
            resident_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        })
    }
}

/// Load of the Tokio runtime the check runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct RuntimeStats {
    /// Worker threads.
    pub workers: usize,
    /// Spawned tasks that have not completed.
    pub alive_tasks: usize,
}

impl RuntimeStats {
    /// Reads the current runtime's metrics, or `None` outside a runtime.
    #[must_use]
    pub fn current() -> Option<Self> {
        let metrics = tokio::runtime::Handle::try_current().ok()?.metrics();
        Some(Self {
            workers: metrics.num_workers(),
            alive_tasks: metrics.num_alive_tasks(),
        })
    }
}

/// Process-level figures included with every health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct SystemHealth {
    /// Process memory, when available.
    pub memory: Option<MemoryStats>,
    /// Runtime load, when called on a runtime.
    pub runtime: Option<RuntimeStats>,
    /// Parallelism the process may use.
    pub available_parallelism: usize,
}

impl SystemHealth {
    /// Collects the current figures.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            memory: MemoryStats::current(),
            runtime: RuntimeStats::current(),
            available_parallelism: thread::available_parallelism().map_or(1, NonZeroUsize::get),
        }
    }
}
