//! Derived reads over the per-token time-series kinds.

use super::collection::Collection;
use indexmirror_protocol::{Entity, Granularity};
use serde::Serialize;
use std::cmp::Reverse;

/// Number of buckets returned by a historical read when no limit is given.
pub const DEFAULT_SERIES_LIMIT: usize = 168;

/// Most recent known price of a token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    /// Price in USD.
    #[serde(rename = "priceUSD")]
    pub price_usd: f64,
    /// Bucket start, Unix seconds.
    pub timestamp: u64,
    /// Bucket size the price was read from.
    pub granularity: Granularity,
}

/// One normalized bucket of a historical series.
///
/// Absent numeric fields are coerced to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    /// Bucket start, Unix seconds.
    pub timestamp: u64,
    /// Price in USD.
    #[serde(rename = "priceUSD")]
    pub price_usd: f64,
    /// Volume in token units.
    pub volume: f64,
    /// Volume in USD.
    #[serde(rename = "volumeUSD")]
    pub volume_usd: f64,
    /// Opening price (falls back to the price).
    pub open: f64,
    /// High price (falls back to the price).
    pub high: f64,
    /// Low price (falls back to the price).
    pub low: f64,
    /// Closing price (falls back to the price).
    pub close: f64,
    /// Liquidity in token units.
    pub total_value_locked: f64,
    /// Liquidity in USD.
    #[serde(rename = "totalValueLockedUSD")]
    pub total_value_locked_usd: f64,
}

impl SeriesPoint {
    fn from_entity(entity: &Entity) -> Self {
        let price = entity.f64_field("priceUSD");
        let or_price = |field: &str| entity.f64_field(field).or(price).unwrap_or(0.0);
        Self {
            timestamp: bucket_start(entity),
            price_usd: price.unwrap_or(0.0),
            volume: entity.first_f64(&["volume", "dailyVolumeToken"]).unwrap_or(0.0),
            volume_usd: entity.first_f64(&["volumeUSD", "dailyVolumeUSD"]).unwrap_or(0.0),
            open: or_price("open"),
            high: or_price("high"),
            low: or_price("low"),
            close: or_price("close"),
            total_value_locked: entity
                .first_f64(&["totalValueLocked", "totalLiquidityToken"])
                .unwrap_or(0.0),
            total_value_locked_usd: entity
                .first_f64(&["totalValueLockedUSD", "totalLiquidityUSD"])
                .unwrap_or(0.0),
        }
    }
}

/// Bucket start in Unix seconds: `periodStartUnix`, then `date`, else 0.
fn bucket_start(entity: &Entity) -> u64 {
    entity
        .first_f64(&["periodStartUnix", "date"])
        .filter(|v| *v >= 0.0)
        .map_or(0, |v| v as u64)
}

fn belongs_to(entity: &Entity, token_id: &str) -> bool {
    entity
        .ref_id("token")
        .is_some_and(|id| id.eq_ignore_ascii_case(token_id))
}

/// Rows of `token_id`, newest bucket first.
fn rows_newest_first<'a>(collection: &'a Collection, token_id: &str) -> Vec<&'a Entity> {
    let mut rows: Vec<&Entity> = collection
        .iter()
        .filter(|entity| belongs_to(entity, token_id))
        .collect();
    rows.sort_by_key(|entity| Reverse(bucket_start(entity)));
    rows
}

/// Price from the newest bucket of one granularity, if it carries one.
pub(crate) fn newest_price(
    collection: &Collection,
    token_id: &str,
    granularity: Granularity,
) -> Option<PricePoint> {
    let newest = rows_newest_first(collection, token_id).into_iter().next()?;
    Some(PricePoint {
        price_usd: newest.f64_field("priceUSD")?,
        timestamp: bucket_start(newest),
        granularity,
    })
}

/// Normalized buckets of `token_id`, newest first, at most `limit`.
pub(crate) fn history(collection: &Collection, token_id: &str, limit: usize) -> Vec<SeriesPoint> {
    rows_newest_first(collection, token_id)
        .into_iter()
        .take(limit)
        .map(SeriesPoint::from_entity)
        .collect()
}
