use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::api::types::DailyClicks;

/// Folds the visit-timestamp list into per-day click counts, sorted by day.
pub fn bucket_visits_by_day(visits: &[DateTime<Utc>]) -> Vec<DailyClicks> {
    let mut days: BTreeMap<_, i64> = BTreeMap::new();
    for visit in visits {
        *days.entry(visit.date_naive()).or_default() += 1;
    }
    days.into_iter()
        .map(|(date, clicks)| DailyClicks { date, clicks })
        .collect()
}
