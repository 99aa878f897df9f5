//! Rewrite passes. Each pass takes ownership of a snapshot and returns the
//! rewritten snapshot plus the changes it made; nothing is shared.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cs_domain::item::{saturating_add, ItemType, ScheduleItem};

use crate::recurrence::resolve_local;

/// Items closer than this are clustered together.
const CLUSTER_THRESHOLD_MINUTES: i64 = 60;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    DependencyShift,
    ConflictResolution,
    OptimalTime,
    Clustering,
}

/// One rescheduling decision made by a pass.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScheduleChange {
    pub item_id: Uuid,
    pub kind: ChangeKind,
    pub original_time: DateTime<Utc>,
    pub new_time: DateTime<Utc>,
    pub reason: String,
}

pub type PassOutput = (Vec<ScheduleItem>, Vec<ScheduleChange>);

/// A `depends_on` edge: `(dependent, dependency)`.
pub type Edge = (Uuid, Uuid);

fn move_item(
    item: &mut ScheduleItem,
    to: DateTime<Utc>,
    kind: ChangeKind,
    reason: String,
    changes: &mut Vec<ScheduleChange>,
) {
    changes.push(ScheduleChange {
        item_id: item.id,
        kind,
        original_time: item.scheduled_for,
        new_time: to,
        reason,
    });
    item.scheduled_for = to;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cycle detection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Edges to ids outside the batch are ignored.

/// Every dependency cycle found by DFS, each as the id path around it.
pub fn find_cycles(items: &[ScheduleItem]) -> Vec<Vec<Uuid>> {
    let adj: HashMap<Uuid, &ScheduleItem> = items.iter().map(|i| (i.id, i)).collect();
    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();
    let mut stack = Vec::new();
    let mut cycles = Vec::new();

    for item in items {
        if !visited.contains(&item.id) {
            cycle_dfs(
                item.id,
                &adj,
                &mut visited,
                &mut in_stack,
                &mut stack,
                &mut cycles,
            );
        }
    }
    cycles
}

fn cycle_dfs(
    node: Uuid,
    adj: &HashMap<Uuid, &ScheduleItem>,
    visited: &mut HashSet<Uuid>,
    in_stack: &mut HashSet<Uuid>,
    stack: &mut Vec<Uuid>,
    cycles: &mut Vec<Vec<Uuid>>,
) {
    visited.insert(node);
    in_stack.insert(node);
    stack.push(node);

    if let Some(item) = adj.get(&node) {
        for &next in &item.depends_on {
            if !adj.contains_key(&next) {
                continue;
            }
            if in_stack.contains(&next) {
                // Back edge → cycle
                let pos = stack.iter().position(|id| *id == next).unwrap_or(0);
                cycles.push(stack[pos..].to_vec());
            } else if !visited.contains(&next) {
                cycle_dfs(next, adj, visited, in_stack, stack, cycles);
            }
        }
    }

    stack.pop();
    in_stack.remove(&node);
}

/// The edges walked by a cycle path, including the closing edge.
pub fn cycle_edges(cycle: &[Uuid]) -> Vec<Edge> {
    let mut edges: Vec<Edge> = cycle.windows(2).map(|w| (w[0], w[1])).collect();
    if let (Some(&last), Some(&first)) = (cycle.last(), cycle.first()) {
        edges.push((last, first));
    }
    edges
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pass 1: dependency enforcement
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Push every item to at least `dependency end + buffer`, repeating to a
/// fixed point (capped at `2 × len` rounds). `skip` holds edges that must
/// not be enforced, typically the ones on a cycle.
pub fn enforce_dependencies(
    mut items: Vec<ScheduleItem>,
    buffer: Duration,
    skip: &HashSet<Edge>,
    reason: &str,
) -> PassOutput {
    let index: HashMap<Uuid, usize> = items.iter().enumerate().map(|(i, it)| (it.id, i)).collect();
    let mut changes = Vec::new();
    let cap = (items.len() * 2).max(1);

    for _ in 0..cap {
        let mut changed = false;
        for i in 0..items.len() {
            let id = items[i].id;
            let required = items[i]
                .depends_on
                .iter()
                .filter(|dep| !skip.contains(&(id, **dep)))
                .filter_map(|dep| index.get(dep))
                .filter_map(|&j| Some((items[j].checked_end()?.checked_add_signed(buffer)?, j)))
                .max_by_key(|(at, _)| *at);

            if let Some((at, j)) = required {
                // A target whose end cannot be represented is left alone.
                if items[i].scheduled_for < at && at.checked_add_signed(items[i].duration()).is_some() {
                    let why = format!("{reason}: must follow '{}'", items[j].title);
                    move_item(&mut items[i], at, ChangeKind::DependencyShift, why, &mut changes);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    (items, changes)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pass 2: conflict resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Greedy priority-ordered interval packing: items are placed in
/// `(priority desc, time asc)` order and each one is pushed past every
/// already-placed item it overlaps, plus the buffer.
pub fn resolve_conflicts(mut items: Vec<ScheduleItem>, buffer: Duration) -> PassOutput {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (&items[a], &items[b]);
        y.priority
            .cmp(&x.priority)
            .then(x.scheduled_for.cmp(&y.scheduled_for))
            .then(a.cmp(&b))
    });

    let mut placed: Vec<(DateTime<Utc>, DateTime<Utc>, usize)> = Vec::new();
    let mut changes = Vec::new();

    for i in order {
        let duration = items[i].duration();
        let mut start = items[i].scheduled_for;
        let mut blocker = None;
        // Each round moves strictly past a placed interval, so this ends
        // after at most `placed.len()` rounds.
        loop {
            let hit = placed
                .iter()
                .filter(|(s, e, _)| *s < saturating_add(start, duration) && start < *e)
                .map(|&(_, e, j)| (e, j))
                .max_by_key(|(e, _)| *e);
            let Some((end, j)) = hit else { break };
            match end
                .checked_add_signed(buffer)
                .filter(|next| next.checked_add_signed(duration).is_some())
            {
                Some(next) => {
                    start = next;
                    blocker = Some(j);
                }
                None => {
                    // No room left before the end of time: keep it where it was.
                    tracing::debug!(item_id = %items[i].id, "no later slot to move to");
                    start = items[i].scheduled_for;
                    blocker = None;
                    break;
                }
            }
        }

        if let Some(j) = blocker {
            let why = format!(
                "overlapped '{}' (priority {})",
                items[j].title, items[j].priority
            );
            move_item(&mut items[i], start, ChangeKind::ConflictResolution, why, &mut changes);
        }
        placed.push((start, saturating_add(start, duration), i));
    }
    (items, changes)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pass 3: optimal-time alignment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Whether the item's local start hour is inside its type's best bucket.
pub fn is_aligned(item: &ScheduleItem) -> bool {
    let hour = item.scheduled_for.with_timezone(&item.tz()).hour();
    item.item_type.optimal_bucket().contains_hour(hour)
}

/// Move out-of-bucket items to the bucket's canonical hour on the same
/// local calendar day.
pub fn align_optimal_times(mut items: Vec<ScheduleItem>) -> PassOutput {
    let mut changes = Vec::new();
    for item in items.iter_mut() {
        if is_aligned(item) {
            continue;
        }
        let tz = item.tz();
        let bucket = item.item_type.optimal_bucket();
        let local_day = item.scheduled_for.with_timezone(&tz).date_naive();
        let Some(canonical) = NaiveTime::from_hms_opt(bucket.canonical_hour(), 0, 0) else {
            continue;
        };
        let Some(target) = resolve_local(local_day.and_time(canonical), tz)
            .filter(|t| t.checked_add_signed(item.duration()).is_some())
        else {
            continue;
        };
        if target != item.scheduled_for {
            let why = format!("{:?} performs best in the {:?} window", item.item_type, bucket);
            move_item(item, target, ChangeKind::OptimalTime, why, &mut changes);
        }
    }
    (items, changes)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pass 4: similarity clustering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Group by (type, publish targets), single-linkage cluster each group on
/// start time, and move every multi-member cluster to its mean instant.
pub fn cluster_similar(mut items: Vec<ScheduleItem>) -> PassOutput {
    let mut groups: BTreeMap<(ItemType, Vec<String>), Vec<usize>> = BTreeMap::new();
    for (i, item) in items.iter().enumerate() {
        let mut targets = item.publish_to.clone();
        targets.sort();
        targets.dedup();
        groups.entry((item.item_type, targets)).or_default().push(i);
    }

    let threshold = Duration::minutes(CLUSTER_THRESHOLD_MINUTES);
    let mut changes = Vec::new();

    for members in groups.into_values() {
        let mut members = members;
        members.sort_by_key(|&i| (items[i].scheduled_for, i));

        let mut clusters: Vec<Vec<usize>> = Vec::new();
        for i in members {
            match clusters.last_mut() {
                Some(current)
                    if current.last().map_or(false, |&prev| {
                        items[i].scheduled_for - items[prev].scheduled_for <= threshold
                    }) =>
                {
                    current.push(i)
                }
                _ => clusters.push(vec![i]),
            }
        }

        for cluster in clusters.into_iter().filter(|c| c.len() > 1) {
            let n = cluster.len() as i64;
            let sum: i128 = cluster
                .iter()
                .map(|&i| i128::from(items[i].scheduled_for.timestamp()))
                .sum();
            let Some(mean) = i64::try_from(sum / i128::from(n))
                .ok()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            else {
                continue;
            };
            for &i in &cluster {
                let fits = mean.checked_add_signed(items[i].duration()).is_some();
                if fits && items[i].scheduled_for != mean {
                    let why = format!("clustered with {} similar items", n - 1);
                    move_item(&mut items[i], mean, ChangeKind::Clustering, why, &mut changes);
                }
            }
        }
    }
    (items, changes)
}
