//! Listing items: filter, sort and page over a snapshot of the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cs_domain::item::{ItemStatus, ItemType, ScheduleItem};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Listing: filter, sort, paginate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// All set fields must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemFilter {
    /// Inclusive lower bound on `scheduled_for`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `scheduled_for`.
    pub to: Option<DateTime<Utc>>,
    pub item_type: Option<ItemType>,
    pub status: Option<ItemStatus>,
    /// Matches items whose `publish_to` contains this platform.
    pub platform: Option<String>,
    pub created_by: Option<String>,
}

impl ItemFilter {
    pub fn matches(&self, item: &ScheduleItem) -> bool {
        if self.from.map_or(false, |from| item.scheduled_for < from) {
            return false;
        }
        if self.to.map_or(false, |to| item.scheduled_for >= to) {
            return false;
        }
        if self.item_type.map_or(false, |t| item.item_type != t) {
            return false;
        }
        if self.status.map_or(false, |s| item.status != s) {
            return false;
        }
        if let Some(platform) = &self.platform {
            if !item.publish_to.iter().any(|p| p.eq_ignore_ascii_case(platform)) {
                return false;
            }
        }
        if let Some(creator) = &self.created_by {
            if item.created_by != *creator {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    ScheduledFor,
    CreatedAt,
    Priority,
    Title,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemQuery {
    #[serde(default)]
    pub filter: ItemFilter,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub offset: usize,
    /// `None` returns every match after `offset`.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ItemQuery {
    pub fn sorted_by(mut self, sort: SortField, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPage {
    pub items: Vec<ScheduleItem>,
    pub total: usize,
}

/// Filter, sort and paginate. Ties fall back to `scheduled_for`, then id,
/// so pages are stable.
pub fn run_query<'a>(
    items: impl IntoIterator<Item = &'a ScheduleItem>,
    query: &ItemQuery,
) -> ItemPage {
    let mut matching: Vec<&ScheduleItem> = items
        .into_iter()
        .filter(|i| query.filter.matches(i))
        .collect();

    matching.sort_by(|a, b| {
        let primary = match query.sort {
            SortField::ScheduledFor => a.scheduled_for.cmp(&b.scheduled_for),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::Priority => a.priority.cmp(&b.priority),
            SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        };
        let primary = match query.order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary
            .then(a.scheduled_for.cmp(&b.scheduled_for))
            .then(a.id.cmp(&b.id))
    });

    let total = matching.len();
    let items = matching
        .into_iter()
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();

    ItemPage { items, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cs_domain::item::ItemSpec;

    fn make(title: &str, ty: ItemType, hour: u32, priority: u8, platform: &str) -> ScheduleItem {
        let at = Utc.with_ymd_and_hms(2024, 6, 17, hour, 0, 0).unwrap();
        let spec = ItemSpec::new(title, ty, at)
            .with_priority(priority)
            .publish_to(platform)
            .created_by("ana");
        ScheduleItem::from_spec(spec, 3, at)
    }

    fn sample() -> Vec<ScheduleItem> {
        vec![
            make("delta", ItemType::Email, 9, 2, "mail"),
            make("alpha", ItemType::SocialPost, 11, 9, "x"),
            make("Charlie", ItemType::SocialPost, 10, 5, "LinkedIn"),
            make("bravo", ItemType::Task, 12, 5, "x"),
        ]
    }

    fn titles(page: &ItemPage) -> Vec<&str> {
        page.items.iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn default_sorts_by_time() {
        let items = sample();
        let page = run_query(&items, &ItemQuery::default());
        assert_eq!(page.total, 4);
        assert_eq!(titles(&page), vec!["delta", "Charlie", "alpha", "bravo"]);
    }

    #[test]
    fn filters_combine() {
        let items = sample();
        let mut query = ItemQuery::default();
        query.filter.item_type = Some(ItemType::SocialPost);
        query.filter.platform = Some("linkedin".into());
        let page = run_query(&items, &query);
        assert_eq!(titles(&page), vec!["Charlie"]);

        let mut query = ItemQuery::default();
        query.filter.from = Some(Utc.with_ymd_and_hms(2024, 6, 17, 10, 0, 0).unwrap());
        query.filter.to = Some(Utc.with_ymd_and_hms(2024, 6, 17, 12, 0, 0).unwrap());
        assert_eq!(run_query(&items, &query).total, 2);

        let mut query = ItemQuery::default();
        query.filter.created_by = Some("bob".into());
        assert_eq!(run_query(&items, &query).total, 0);
    }

    #[test]
    fn priority_desc_with_stable_ties() {
        let items = sample();
        let query = ItemQuery::default().sorted_by(SortField::Priority, SortOrder::Desc);
        let page = run_query(&items, &query);
        assert_eq!(titles(&page), vec!["alpha", "Charlie", "bravo", "delta"]);
    }

    #[test]
    fn title_sort_ignores_case() {
        let items = sample();
        let query = ItemQuery::default().sorted_by(SortField::Title, SortOrder::Asc);
        assert_eq!(
            titles(&run_query(&items, &query)),
            vec!["alpha", "bravo", "Charlie", "delta"]
        );
    }

    #[test]
    fn pagination_reports_total() {
        let items = sample();
        let page = run_query(&items, &ItemQuery::default().page(1, 2));
        assert_eq!(page.total, 4);
        assert_eq!(titles(&page), vec!["Charlie", "alpha"]);
        let past_end = run_query(&items, &ItemQuery::default().page(10, 2));
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 4);
    }
}
