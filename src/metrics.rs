//! Per-workspace counters for sender lifecycle and deliveries.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceStats {
    pub sender_lookups: u32,
    pub launches: u32,
    pub launch_failures: u32,
    pub stale_drops: u32,
    pub deliveries: u32,
    pub delivery_failures: u32,
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    workspaces: BTreeMap<usize, WorkspaceStats>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, index: usize) -> &mut WorkspaceStats {
        self.workspaces.entry(index).or_default()
    }

    pub fn on_lookup(&mut self, index: usize) {
        self.record(index).sender_lookups += 1;
    }

    pub fn on_launch(&mut self, index: usize) {
        self.record(index).launches += 1;
    }

    pub fn on_launch_failure(&mut self, index: usize) {
        self.record(index).launch_failures += 1;
    }

    pub fn on_stale(&mut self, index: usize) {
        self.record(index).stale_drops += 1;
    }

    pub fn on_delivery(&mut self, index: usize, delivered: bool) {
        let record = self.record(index);
        if delivered {
            record.deliveries += 1;
        } else {
            record.delivery_failures += 1;
        }
    }

    pub fn stats(&self, index: usize) -> WorkspaceStats {
        self.workspaces.get(&index).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(&self.workspaces).unwrap_or_default()
    }
}
