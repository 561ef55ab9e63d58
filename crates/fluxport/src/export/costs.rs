// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Cost entries

use super::{BucketExport, ResolvedWindow};
use crate::bucket::Bucket;
use crate::config::FluxportConfig;
use crate::decode;
use crate::error::{Error, Result};
use crate::query::QueryBuilder;
use crate::record::CostRecord;
use crate::registry::{TAG_BILLING_PERIOD, TAG_CATEGORY, TAG_CURRENCY, TAG_PROVIDER};
use crate::row::FluxRecord;
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone)]
pub struct CostExport {
    bucket: String,
}

impl CostExport {
    #[must_use]
    pub fn new<S: Into<String>>(bucket: S) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &FluxportConfig) -> Self {
        Self::new(config.bucket_name(Bucket::Costs))
    }

    pub fn by_currency(&self, window: &ResolvedWindow, currency: &str) -> Result<QueryBuilder> {
        Ok(self.query(window)?.tag(TAG_CURRENCY, currency))
    }

    pub fn by_provider(&self, window: &ResolvedWindow, provider: &str) -> Result<QueryBuilder> {
        Ok(self.query(window)?.tag(TAG_PROVIDER, provider))
    }

    pub fn by_category(&self, window: &ResolvedWindow, category: &str) -> Result<QueryBuilder> {
        Ok(self.query(window)?.tag(TAG_CATEGORY, category))
    }

    /// `period` as the billing system labels it, e.g. `2024-03`
    pub fn by_billing_period(&self, window: &ResolvedWindow, period: &str) -> Result<QueryBuilder> {
        Ok(self.query(window)?.tag(TAG_BILLING_PERIOD, period))
    }

    /// Entries of one UTC calendar day
    pub fn by_date(&self, date: NaiveDate) -> Result<QueryBuilder> {
        self.by_date_range(date, date)
    }

    /// Entries from the start of `first` to the end of `last`, UTC
    pub fn by_date_range(&self, first: NaiveDate, last: NaiveDate) -> Result<QueryBuilder> {
        if first > last {
            return Err(Error::invalid_argument(format!(
                "date range {first}..{last} is inverted"
            )));
        }
        let start = start_of_day(first)?;
        let stop = last
            .succ_opt()
            .ok_or_else(|| Error::invalid_argument(format!("no day after {last}")))
            .and_then(start_of_day)?;
        QueryBuilder::from_bucket(self.bucket_name())?.range(start, stop)
    }
}

fn start_of_day(date: NaiveDate) -> Result<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .ok_or_else(|| Error::invalid_argument(format!("invalid date {date}")))
}

impl BucketExport for CostExport {
    type Record = CostRecord;

    fn category(&self) -> Bucket {
        Bucket::Costs
    }

    fn bucket_name(&self) -> &str {
        &self.bucket
    }

    fn decode(&self, row: &FluxRecord) -> Option<CostRecord> {
        decode::decode_cost(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportWindow;
    use chrono::TimeZone;

    fn window() -> ResolvedWindow {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        ExportWindow::default().resolve(now).unwrap()
    }

    #[test]
    fn date_queries_cover_whole_days() {
        let strategy = CostExport::new("costs");
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let query = strategy.by_date(day).unwrap().build();
        assert!(query.contains("range(start: 2024-02-29T00:00:00Z, stop: 2024-03-01T00:00:00Z)"), "{query}");

        let last = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let query = strategy.by_date_range(day, last).unwrap().build();
        assert!(query.contains("range(start: 2024-02-29T00:00:00Z, stop: 2024-04-01T00:00:00Z)"));

        assert!(strategy.by_date_range(last, day).is_err());
    }

    #[test]
    fn tag_filters() {
        let strategy = CostExport::new("costs");
        let w = window();
        assert!(strategy.by_currency(&w, "EUR").unwrap().build().contains("(r.currency == \"EUR\")"));
        assert!(strategy.by_provider(&w, "hetzner").unwrap().build().contains("(r.provider == \"hetzner\")"));
        assert!(strategy.by_category(&w, "energy").unwrap().build().contains("(r.category == \"energy\")"));
        assert!(strategy.by_billing_period(&w, "2024-03").unwrap().build()
            .contains("(r.billing_period == \"2024-03\")"));
    }
}
