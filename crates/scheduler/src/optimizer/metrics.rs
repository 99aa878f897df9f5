//! Schedule quality metrics computed before and after optimization.

use std::collections::HashMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cs_domain::item::{saturating_add, ScheduleItem};

use super::passes::is_aligned;
use crate::validation::max_concurrency;

/// Quality summary of a set of items.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScheduleMetrics {
    /// Sum of estimated durations.
    pub total_duration_minutes: u64,
    /// Peak number of simultaneously active items.
    pub max_concurrency: usize,
    /// Mean of `gap / buffer` (clamped to 0..1) across consecutive items.
    pub buffer_utilization: f64,
    /// Fraction of in-batch dependency edges with `dep end + buffer <= start`.
    pub dependency_satisfaction: f64,
    /// Fraction of items starting inside their type's best time bucket.
    pub optimal_time_alignment: f64,
    /// Last end minus first start.
    pub makespan_minutes: i64,
    /// Total work time divided by makespan.
    pub efficiency: f64,
}

impl ScheduleMetrics {
    pub fn calculate(items: &[ScheduleItem], buffer: Duration) -> Self {
        if items.is_empty() {
            return Self {
                buffer_utilization: 1.0,
                dependency_satisfaction: 1.0,
                optimal_time_alignment: 1.0,
                ..Self::default()
            };
        }

        let total_duration_minutes: u64 = items
            .iter()
            .map(|i| u64::from(i.estimated_duration_minutes))
            .sum();

        let first_start = items.iter().map(|i| i.scheduled_for).min();
        let last_end = items.iter().map(|i| i.ends_at()).max();
        let makespan_minutes = match (first_start, last_end) {
            (Some(s), Some(e)) => (e - s).num_minutes(),
            _ => 0,
        };
        let efficiency = if makespan_minutes > 0 {
            total_duration_minutes as f64 / makespan_minutes as f64
        } else {
            0.0
        };

        let aligned = items.iter().filter(|i| is_aligned(i)).count();

        Self {
            total_duration_minutes,
            max_concurrency: max_concurrency(items),
            buffer_utilization: buffer_utilization(items, buffer),
            dependency_satisfaction: dependency_satisfaction(items, buffer),
            optimal_time_alignment: aligned as f64 / items.len() as f64,
            makespan_minutes,
            efficiency,
        }
    }
}

fn buffer_utilization(items: &[ScheduleItem], buffer: Duration) -> f64 {
    if items.len() < 2 || buffer <= Duration::zero() {
        return 1.0;
    }
    let mut sorted: Vec<&ScheduleItem> = items.iter().collect();
    sorted.sort_by_key(|i| i.scheduled_for);

    let buffer_secs = buffer.num_seconds() as f64;
    let ratios: Vec<f64> = sorted
        .windows(2)
        .map(|w| {
            let gap = (w[1].scheduled_for - w[0].ends_at()).num_seconds() as f64;
            (gap / buffer_secs).clamp(0.0, 1.0)
        })
        .collect();
    ratios.iter().sum::<f64>() / ratios.len() as f64
}

fn dependency_satisfaction(items: &[ScheduleItem], buffer: Duration) -> f64 {
    let by_id: HashMap<Uuid, &ScheduleItem> = items.iter().map(|i| (i.id, i)).collect();
    let mut edges = 0usize;
    let mut satisfied = 0usize;
    for item in items {
        for dep in item.depends_on.iter().filter_map(|d| by_id.get(d)) {
            edges += 1;
            if saturating_add(dep.ends_at(), buffer) <= item.scheduled_for {
                satisfied += 1;
            }
        }
    }
    if edges == 0 {
        1.0
    } else {
        satisfied as f64 / edges as f64
    }
}

/// Before/after comparison reported with every optimization run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationMetrics {
    pub before: ScheduleMetrics,
    pub after: ScheduleMetrics,
    /// `before.max_concurrency − after.max_concurrency`; negative when the
    /// run increased peak load (clustering does this on purpose).
    pub concurrency_reduction: i64,
}

impl OptimizationMetrics {
    pub fn compare(before: ScheduleMetrics, after: ScheduleMetrics) -> Self {
        let concurrency_reduction = before.max_concurrency as i64 - after.max_concurrency as i64;
        Self {
            before,
            after,
            concurrency_reduction,
        }
    }
}
