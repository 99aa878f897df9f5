//! Batch schedule optimizer.
//!
//! Runs cycle detection, then four ordered passes over an owned snapshot:
//! dependency enforcement, conflict resolution, optimal-time alignment and
//! similarity clustering. When dependencies are respected a final sweep
//! re-applies them, since the later passes may have moved a dependency.

pub mod metrics;
pub mod passes;

pub use metrics::{OptimizationMetrics, ScheduleMetrics};
pub use passes::{ChangeKind, ScheduleChange};

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cs_domain::config::ScheduleConfig;
use cs_domain::conflict::{ConflictKind, ConflictSeverity, ScheduleConflict};
use cs_domain::item::ScheduleItem;
use cs_domain::trace::TraceEvent;

use passes::Edge;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub original: Vec<ScheduleItem>,
    pub optimized: Vec<ScheduleItem>,
    /// Every move in the order it was made; an item may appear more than once.
    pub changes: Vec<ScheduleChange>,
    /// Problems the optimizer could not fix (dependency cycles).
    pub conflicts: Vec<ScheduleConflict>,
    pub metrics: OptimizationMetrics,
}

impl OptimizationResult {
    /// Items whose final time differs from the input.
    pub fn moved(&self) -> Vec<(&ScheduleItem, &ScheduleItem)> {
        let before: HashMap<Uuid, &ScheduleItem> =
            self.original.iter().map(|i| (i.id, i)).collect();
        self.optimized
            .iter()
            .filter_map(|after| {
                let orig = before.get(&after.id)?;
                (orig.scheduled_for != after.scheduled_for).then_some((*orig, after))
            })
            .collect()
    }
}

/// Optimize a batch. The input is never modified.
pub fn optimize_schedule(items: &[ScheduleItem], config: &ScheduleConfig) -> OptimizationResult {
    let buffer = config.buffer();
    let toggles = &config.optimization;
    let before = ScheduleMetrics::calculate(items, buffer);

    let cycles = passes::find_cycles(items);
    let conflicts: Vec<ScheduleConflict> = cycles.iter().map(|c| cycle_conflict(c, items)).collect();
    let skip: HashSet<Edge> = cycles.iter().flat_map(|c| passes::cycle_edges(c)).collect();
    for conflict in &conflicts {
        TraceEvent::ConflictDetected {
            item_id: conflict.item_ids.first().copied().unwrap_or_default(),
            kind: conflict.kind,
            severity: conflict.severity,
            with: conflict.item_ids.clone(),
        }
        .emit();
    }

    let mut working = items.to_vec();
    let mut changes = Vec::new();
    let mut record = |(out, found): passes::PassOutput| {
        changes.extend(found);
        out
    };

    if toggles.respect_dependencies {
        working = record(passes::enforce_dependencies(working, buffer, &skip, "dependency"));
    }
    if toggles.avoid_conflicts {
        working = record(passes::resolve_conflicts(working, buffer));
    }
    if toggles.prefer_optimal_times {
        working = record(passes::align_optimal_times(working));
    }
    if toggles.group_similar {
        working = record(passes::cluster_similar(working));
    }
    if toggles.respect_dependencies {
        working = record(passes::enforce_dependencies(
            working,
            buffer,
            &skip,
            "final dependency sweep",
        ));
    }

    let after = ScheduleMetrics::calculate(&working, buffer);
    let metrics = OptimizationMetrics::compare(before, after);

    TraceEvent::OptimizationCompleted {
        items: items.len(),
        changes: changes.len(),
        cycles: cycles.len(),
        concurrency_reduction: metrics.concurrency_reduction,
    }
    .emit();

    OptimizationResult {
        original: items.to_vec(),
        optimized: working,
        changes,
        conflicts,
        metrics,
    }
}

fn cycle_conflict(cycle: &[Uuid], items: &[ScheduleItem]) -> ScheduleConflict {
    let title = |id: &Uuid| {
        items
            .iter()
            .find(|i| i.id == *id)
            .map(|i| i.title.clone())
            .unwrap_or_else(|| id.to_string())
    };
    let mut path: Vec<String> = cycle.iter().map(title).collect();
    if let Some(first) = path.first().cloned() {
        path.push(first);
    }
    ScheduleConflict::new(
        ConflictKind::DependencyViolation,
        ConflictSeverity::Critical,
        cycle.to_vec(),
        format!("dependency cycle: {}", path.join(" -> ")),
        "remove one of the dependencies in the cycle",
    )
}
