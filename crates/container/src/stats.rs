//! Статистика контейнера

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Снапшот статистики
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub name: String,
    pub definition_count: usize,
    pub shared_instance_count: usize,
    pub hook_count: usize,
    pub total_resolutions: u64,
    pub failed_resolutions: u64,
    pub instances_created: u64,
    pub cache_hits: u64,
}

impl ContainerStats {
    /// Доля успешных top-level запросов
    pub fn success_rate(&self) -> f64 {
        if self.total_resolutions == 0 {
            return 1.0;
        }
        (self.total_resolutions - self.failed_resolutions) as f64 / self.total_resolutions as f64
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    total_resolutions: AtomicU64,
    failed_resolutions: AtomicU64,
    instances_created: AtomicU64,
    cache_hits: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_resolution(&self, success: bool) {
        self.total_resolutions.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_resolutions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_instance_created(&self) {
        self.instances_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fill(&self, stats: &mut ContainerStats) {
        stats.total_resolutions = self.total_resolutions.load(Ordering::Relaxed);
        stats.failed_resolutions = self.failed_resolutions.load(Ordering::Relaxed);
        stats.instances_created = self.instances_created.load(Ordering::Relaxed);
        stats.cache_hits = self.cache_hits.load(Ordering::Relaxed);
    }
}
