//! Adverse-media provider.
//!
//! The synthetic provider draws news items for customers from the news
//! stream. The signal stage only sees items published on or before the
//! observation date.

use crate::{
    clock::{add_days, SimCalendar},
    config::PopulationConfig,
    population_subsystem::Population,
    rng::{RngBank, StageSlot},
    types::{Day, EntityId, MediaSeverity},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CATEGORIES: &[&str] = &[
    "fraud",
    "corruption",
    "money_laundering",
    "tax_evasion",
    "sanctions_evasion",
];

/// Items can predate the run window by up to this many days.
const LOOKBACK_DAYS: i64 = 365;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub news_id: EntityId,
    pub entity_id: EntityId,
    pub published: Day,
    pub category: String,
    pub severity: MediaSeverity,
    pub headline: String,
}

/// What the provider knows about one entity at one date.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MediaSummary {
    pub count: u32,
    pub max_severity: Option<MediaSeverity>,
}

impl MediaSummary {
    pub fn flagged(&self) -> bool {
        self.count > 0
    }

    pub fn severity_label(&self) -> &'static str {
        self.max_severity.map_or("none", MediaSeverity::as_str)
    }
}

pub trait NewsProvider: Send + Sync {
    fn adverse_media(&self, entity_id: &str, as_of: Day) -> MediaSummary;
}

/// Provider with no coverage.
pub struct NoNews;

impl NewsProvider for NoNews {
    fn adverse_media(&self, _entity_id: &str, _as_of: Day) -> MediaSummary {
        MediaSummary::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyntheticNews {
    items: BTreeMap<EntityId, Vec<NewsItem>>,
}

impl SyntheticNews {
    pub fn generate(
        population: &Population,
        settings: &PopulationConfig,
        rng_bank: RngBank,
        calendar: SimCalendar,
    ) -> Self {
        let mut items: BTreeMap<EntityId, Vec<NewsItem>> = BTreeMap::new();
        let earliest = add_days(calendar.start, -LOOKBACK_DAYS);
        let spread = (calendar.end - earliest).num_days().max(0) as u64;

        for customer in &population.customers {
            let mut rng = rng_bank.stream(StageSlot::News, &customer.customer_id, "adverse_media");
            let rate = if customer.is_pep {
                settings.pep_adverse_media_rate
            } else {
                settings.adverse_media_rate
            };
            if !rng.chance(rate) {
                continue;
            }
            let n = rng.range_inclusive(settings.media_items.min as u64, settings.media_items.max as u64);
            let mut found = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let severity = if rng.chance(settings.critical_media_share) {
                    MediaSeverity::Critical
                } else {
                    MediaSeverity::Negative
                };
                let category = rng.pick(CATEGORIES).copied().unwrap_or("fraud");
                let published = add_days(earliest, rng.range_inclusive(0, spread) as i64);
                found.push(NewsItem {
                    news_id: format!("NEWS_{}", rng.uuid().simple()),
                    entity_id: customer.customer_id.clone(),
                    published,
                    category: category.to_string(),
                    severity,
                    headline: format!("{} linked to {} inquiry", customer.name, category.replace('_', " ")),
                });
            }
            found.sort_by(|a, b| a.published.cmp(&b.published).then_with(|| a.news_id.cmp(&b.news_id)));
            items.insert(customer.customer_id.clone(), found);
        }
        log::info!(
            "stage=news entities={} items={}",
            items.len(),
            items.values().map(Vec::len).sum::<usize>()
        );
        Self { items }
    }

    /// Every item in entity then publication order.
    pub fn items(&self) -> impl Iterator<Item = &NewsItem> {
        self.items.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl NewsProvider for SyntheticNews {
    fn adverse_media(&self, entity_id: &str, as_of: Day) -> MediaSummary {
        let Some(items) = self.items.get(entity_id) else {
            return MediaSummary::default();
        };
        items
            .iter()
            .filter(|item| item.published <= as_of)
            .fold(MediaSummary::default(), |acc, item| MediaSummary {
                count: acc.count + 1,
                max_severity: acc.max_severity.max(Some(item.severity)),
            })
    }
}
