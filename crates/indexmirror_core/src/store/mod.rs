//! In-memory cache store.
//!
//! Every kind lives behind its own `Arc`. Readers clone the `Arc` under a
//! short read lock and keep an immutable snapshot; writers build the next
//! collection off to the side and swap it in. A writer mutex serializes
//! full loads, merges and clears so two writers never race on the same
//! base collection.

mod collection;
mod series;

pub use collection::{Collection, MergeCounts};
pub use series::{PricePoint, SeriesPoint, DEFAULT_SERIES_LIMIT};

use crate::error::{CoreError, CoreResult};
use crate::stats::CacheStats;
use crate::time::unix_millis;
use indexmirror_protocol::{Entity, EntityKind, Granularity, Payload};
use parking_lot::{Mutex, RwLock};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
struct StoreState {
    collections: BTreeMap<EntityKind, Arc<Collection>>,
    singletons: BTreeMap<EntityKind, Arc<Entity>>,
    initialized: bool,
    last_updated: Option<SystemTime>,
    total_records: usize,
}

impl StoreState {
    fn recount(&mut self) {
        self.total_records = self.collections.values().map(|c| c.len()).sum::<usize>()
            + self.singletons.len();
    }
}

/// Per-kind entity collections and singletons.
///
/// # Invariants
///
/// - Collections are unique by id and keep arrival order
/// - `total_records` equals the sum of collection lengths plus present
///   singletons after every write
/// - A reader observes each kind either entirely before or entirely after
///   a merge
#[derive(Debug, Default)]
pub struct CacheStore {
    state: RwLock<StoreState>,
    writer: Mutex<()>,
}

impl CacheStore {
    /// Creates an empty, uninitialized store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a reader-facing kind name.
    pub fn resolve_kind(name: &str) -> CoreResult<EntityKind> {
        EntityKind::from_name(name).ok_or_else(|| CoreError::UnknownKind {
            name: name.to_owned(),
        })
    }

    // === Writes ===

    /// Replaces every collection and singleton from a full snapshot.
    ///
    /// Missing fields become empty collections or absent singletons.
    /// Returns the resulting total record count.
    pub fn load_full(&self, payload: &Payload) -> usize {
        let _writer = self.writer.lock();

        let mut next = StoreState::default();
        for kind in EntityKind::all() {
            if kind.is_singleton() {
                if let Some(entity) = payload.singleton(kind) {
                    next.singletons.insert(kind, Arc::new(entity));
                }
            } else {
                let collection = Collection::from_records(payload.records(kind));
                next.collections.insert(kind, Arc::new(collection));
            }
        }
        next.initialized = true;
        next.last_updated = Some(SystemTime::now());
        next.recount();

        let total = next.total_records;
        *self.state.write() = next;
        info!(total_records = total, "cache loaded from full snapshot");
        total
    }

    /// Merges a delta into the cached collections.
    ///
    /// Each kind present in the payload is merged under its policy from the
    /// kind table. Singletons present in the payload overwrite the cached
    /// one. Returns the number of newly appended records; replacements and
    /// skips do not count.
    pub fn merge_delta(&self, payload: &Payload) -> usize {
        self.merge_delta_counts(payload).added
    }

    /// Like [`merge_delta`](Self::merge_delta), returning the full counts.
    pub fn merge_delta_counts(&self, payload: &Payload) -> MergeCounts {
        let _writer = self.writer.lock();
        let mut totals = MergeCounts::default();

        for kind in EntityKind::all() {
            if !payload.contains(kind) {
                continue;
            }

            if kind.is_singleton() {
                let Some(entity) = payload.singleton(kind) else {
                    continue;
                };
                let mut state = self.state.write();
                let previous = state.singletons.insert(kind, Arc::new(entity));
                if previous.is_some() {
                    totals.replaced += 1;
                } else {
                    totals.added += 1;
                }
                state.recount();
                continue;
            }

            let incoming = payload.records(kind);
            if incoming.is_empty() {
                continue;
            }

            let base = self.state.read().collections.get(&kind).cloned();
            let mut next = base.map(|c| (*c).clone()).unwrap_or_default();
            let counts = next.merge(incoming, kind.policy());
            debug!(
                kind = %kind,
                added = counts.added,
                replaced = counts.replaced,
                skipped = counts.skipped,
                "merged kind"
            );
            totals.absorb(counts);

            let mut state = self.state.write();
            state.collections.insert(kind, Arc::new(next));
            state.recount();
        }

        let mut state = self.state.write();
        state.last_updated = Some(SystemTime::now());
        state.recount();
        if totals.added > 0 {
            info!(added = totals.added, total_records = state.total_records, "merged new records");
        }
        totals
    }

    /// Resets to the empty, uninitialized state.
    pub fn clear(&self) {
        let _writer = self.writer.lock();
        *self.state.write() = StoreState::default();
        info!("cache cleared");
    }

    // === Reads ===

    /// Returns true once a full load has completed with at least one record.
    pub fn is_ready(&self) -> bool {
        let state = self.state.read();
        state.initialized && state.total_records > 0
    }

    /// Returns true once a full load has completed.
    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Total records across all kinds.
    pub fn total_records(&self) -> usize {
        self.state.read().total_records
    }

    /// Returns an immutable snapshot of one kind.
    ///
    /// Singleton kinds yield a collection of zero or one record.
    pub fn get(&self, kind: EntityKind) -> Arc<Collection> {
        let state = self.state.read();
        if kind.is_singleton() {
            let records = state
                .singletons
                .get(&kind)
                .map(|entity| vec![Entity::clone(entity)])
                .unwrap_or_default();
            return Arc::new(Collection::from_records(records));
        }
        state.collections.get(&kind).cloned().unwrap_or_default()
    }

    /// Like [`get`](Self::get), addressed by name. Unknown names yield `None`.
    pub fn get_named(&self, name: &str) -> Option<Arc<Collection>> {
        match EntityKind::from_name(name) {
            Some(kind) => Some(self.get(kind)),
            None => {
                debug!(name, "cache miss: unknown entity kind");
                None
            }
        }
    }

    /// Returns a singleton kind's record.
    pub fn singleton(&self, kind: EntityKind) -> Option<Entity> {
        self.state
            .read()
            .singletons
            .get(&kind)
            .map(|entity| Entity::clone(entity))
    }

    /// Looks a record up by id.
    pub fn get_by_id(&self, kind: EntityKind, id: &str) -> Option<Entity> {
        self.get(kind).get(id).cloned()
    }

    /// Returns the records of `kind` matching `predicate`, in arrival order.
    pub fn get_filtered<F>(&self, kind: EntityKind, predicate: F) -> Vec<Entity>
    where
        F: Fn(&Entity) -> bool,
    {
        self.get(kind)
            .iter()
            .filter(|entity| predicate(entity))
            .cloned()
            .collect()
    }

    /// Returns up to `limit` records of `kind`, newest first.
    ///
    /// Records are ordered by `timestamp`, falling back to `createdAt`;
    /// records with neither sort last, keeping arrival order.
    pub fn get_recent(&self, kind: EntityKind, limit: usize) -> Vec<Entity> {
        let collection = self.get(kind);
        let mut records: Vec<&Entity> = collection.iter().collect();
        records.sort_by_key(|entity| {
            Reverse(
                entity
                    .first_f64(&["timestamp", "createdAt"])
                    .filter(|v| *v >= 0.0)
                    .map_or(0, |v| v as u64),
            )
        });
        records.into_iter().take(limit).cloned().collect()
    }

    /// Latest price of a token: newest minute bucket, else newest hour
    /// bucket.
    pub fn latest_price(&self, token_id: &str) -> Option<PricePoint> {
        [Granularity::Minute, Granularity::Hour]
            .into_iter()
            .find_map(|granularity| {
                series::newest_price(&self.get(granularity.kind()), token_id, granularity)
            })
    }

    /// Normalized buckets of a token, newest first, at most `limit`.
    pub fn historical_series(
        &self,
        token_id: &str,
        granularity: Granularity,
        limit: usize,
    ) -> Vec<SeriesPoint> {
        series::history(&self.get(granularity.kind()), token_id, limit)
    }

    /// ERC-20 tokens referenced as `token0` or `token1` by any pair.
    pub fn trading_tokens(&self) -> Vec<Entity> {
        let traded: HashSet<String> = self
            .get(EntityKind::Pairs)
            .iter()
            .flat_map(|pair| [pair.ref_id("token0"), pair.ref_id("token1")])
            .flatten()
            .map(str::to_ascii_lowercase)
            .collect();
        self.get_filtered(EntityKind::Erc20Tokens, |token| {
            traded.contains(&token.id().to_ascii_lowercase())
        })
    }

    /// Returns a summary of the store contents.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.read();
        let entities = EntityKind::all()
            .map(|kind| {
                let count = if kind.is_singleton() {
                    usize::from(state.singletons.contains_key(&kind))
                } else {
                    state.collections.get(&kind).map_or(0, |c| c.len())
                };
                (kind.name(), count)
            })
            .collect();
        CacheStats {
            initialized: state.initialized,
            last_updated: state.last_updated.map(unix_millis),
            total_records: state.total_records,
            entities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn payload(checkpoint: u64, fields: Value) -> Payload {
        let mut data = fields;
        data["_meta"] = json!({ "block": { "number": checkpoint } });
        Payload::from_data(data).unwrap()
    }

    fn ids(store: &CacheStore, kind: EntityKind) -> Vec<String> {
        store.get(kind).ids().map(str::to_owned).collect()
    }

    fn recomputed(store: &CacheStore) -> usize {
        store.stats().entities.values().sum()
    }

    #[test]
    fn empty_store_is_not_ready() {
        let store = CacheStore::new();
        assert!(!store.is_ready());
        assert!(!store.is_initialized());
        assert!(store.get(EntityKind::Tokens).is_empty());
        assert_eq!(store.singleton(EntityKind::GlobalStats), None);
    }

    #[test]
    fn full_load_populates_everything() {
        let store = CacheStore::new();
        let total = store.load_full(&payload(
            100,
            json!({
                "tokens": [{ "id": "A", "symbol": "AAA", "tokenHourData": [
                    { "id": "A-1", "periodStartUnix": 3600, "priceUSD": "1" }
                ]}],
                "pairs": [],
                "globalStats": [{ "id": "g", "count": 1 }],
                "piculeFactories": [{ "id": "f" }]
            }),
        ));

        assert_eq!(total, 4);
        assert!(store.is_ready());
        assert_eq!(ids(&store, EntityKind::Tokens), ["A"]);
        assert_eq!(store.get(EntityKind::TokenHourData).len(), 1);
        assert!(store.get(EntityKind::Listings).is_empty());
        assert_eq!(store.singleton(EntityKind::GlobalStats).unwrap().id(), "g");
        assert_eq!(store.get(EntityKind::PiculeFactory).len(), 1);
        assert_eq!(store.singleton(EntityKind::MarketplaceStats), None);
        assert_eq!(store.total_records(), recomputed(&store));
    }

    #[test]
    fn full_load_is_idempotent() {
        let store = CacheStore::new();
        let snapshot = payload(1, json!({ "tokens": [{ "id": "A" }, { "id": "B" }] }));
        store.load_full(&snapshot);
        let first = ids(&store, EntityKind::Tokens);
        store.load_full(&snapshot);
        assert_eq!(ids(&store, EntityKind::Tokens), first);
        assert_eq!(store.total_records(), 2);
    }

    #[test]
    fn initialized_but_empty_is_not_ready() {
        let store = CacheStore::new();
        store.load_full(&payload(1, json!({})));
        assert!(store.is_initialized());
        assert!(!store.is_ready());
    }

    #[test]
    fn merge_replaces_tokens_in_place() {
        let store = CacheStore::new();
        store.load_full(&payload(100, json!({ "tokens": [{ "id": "A", "volume": "1" }] })));

        let added = store.merge_delta(&payload(
            105,
            json!({ "tokens": [{ "id": "A", "volume": "9" }, { "id": "B" }] }),
        ));
        assert_eq!(added, 1);
        assert_eq!(ids(&store, EntityKind::Tokens), ["A", "B"]);
        let a = store.get_by_id(EntityKind::Tokens, "A").unwrap();
        assert_eq!(a.str_field("volume"), Some("9"));
        assert_eq!(store.total_records(), 2);
    }

    #[test]
    fn merge_skips_existing_event_records() {
        let store = CacheStore::new();
        store.load_full(&payload(1, json!({ "contributions": [{ "id": "c1", "amount": "1" }] })));
        let delta = payload(
            2,
            json!({ "contributions": [{ "id": "c1", "amount": "5" }, { "id": "c2", "amount": "2" }] }),
        );

        assert_eq!(store.merge_delta(&delta), 1);
        let after_first = store.get(EntityKind::Contributions).to_vec();
        assert_eq!(store.merge_delta(&delta), 0);
        assert_eq!(store.get(EntityKind::Contributions).to_vec(), after_first);
        assert_eq!(
            store.get_by_id(EntityKind::Contributions, "c1").unwrap().str_field("amount"),
            Some("1")
        );
    }

    #[test]
    fn merge_without_matching_fields_is_noop() {
        let store = CacheStore::new();
        store.load_full(&payload(1, json!({ "tokens": [{ "id": "A" }] })));
        assert_eq!(store.merge_delta(&payload(2, json!({ "unrelated": [1, 2] }))), 0);
        assert_eq!(store.merge_delta(&payload(3, json!({ "pairs": [] }))), 0);
        assert_eq!(store.total_records(), 1);
    }

    #[test]
    fn merge_updates_singletons() {
        let store = CacheStore::new();
        store.load_full(&payload(1, json!({})));
        let counts = store.merge_delta_counts(&payload(2, json!({ "globalStats": [{ "id": "g", "n": 1 }] })));
        assert_eq!(counts.added, 1);
        let counts = store.merge_delta_counts(&payload(3, json!({ "globalStats": [{ "id": "g", "n": 2 }] })));
        assert_eq!(counts.replaced, 1);
        assert_eq!(store.singleton(EntityKind::GlobalStats).unwrap().get("n"), Some(&json!(2)));
        assert_eq!(store.total_records(), 1);
    }

    #[test]
    fn snapshots_are_isolated_from_later_merges() {
        let store = CacheStore::new();
        store.load_full(&payload(1, json!({ "tokens": [{ "id": "A" }] })));
        let before = store.get(EntityKind::Tokens);
        store.merge_delta(&payload(2, json!({ "tokens": [{ "id": "B" }] })));
        assert_eq!(before.len(), 1);
        assert_eq!(store.get(EntityKind::Tokens).len(), 2);
    }

    #[test]
    fn named_lookup() {
        let store = CacheStore::new();
        store.load_full(&payload(1, json!({ "icorequests": [{ "id": "r" }] })));
        assert_eq!(store.get_named("icoRequests").unwrap().len(), 1);
        assert!(store.get_named("widgets").is_none());
        assert!(matches!(
            CacheStore::resolve_kind("widgets"),
            Err(CoreError::UnknownKind { .. })
        ));
        assert_eq!(CacheStore::resolve_kind("sales").unwrap(), EntityKind::Sales);
    }

    #[test]
    fn filtered_and_recent() {
        let store = CacheStore::new();
        store.load_full(&payload(
            1,
            json!({ "sales": [
                { "id": "s1", "timestamp": "100", "price": 1 },
                { "id": "s2", "createdAt": 300, "price": 5 },
                { "id": "s3", "price": 9 },
                { "id": "s4", "timestamp": 200, "price": 2 }
            ]}),
        ));

        let expensive = store.get_filtered(EntityKind::Sales, |s| {
            s.f64_field("price").is_some_and(|p| p > 1.0)
        });
        assert_eq!(expensive.len(), 3);

        let recent: Vec<String> = store
            .get_recent(EntityKind::Sales, 3)
            .iter()
            .map(|e| e.id().to_owned())
            .collect();
        assert_eq!(recent, ["s2", "s4", "s1"]);
    }

    #[test]
    fn latest_price_falls_back_to_hourly() {
        let store = CacheStore::new();
        store.load_full(&payload(
            1,
            json!({ "tokens": [{
                "id": "0xAA",
                "tokenMinuteData": [],
                "tokenHourData": [
                    { "id": "h1", "periodStartUnix": 3600, "priceUSD": "1.25" },
                    { "id": "h2", "periodStartUnix": 7200, "priceUSD": "1.5" }
                ]
            }]}),
        ));

        let price = store.latest_price("0xaa").unwrap();
        assert_eq!(price.price_usd, 1.5);
        assert_eq!(price.timestamp, 7200);
        assert_eq!(price.granularity, Granularity::Hour);
        assert_eq!(store.latest_price("0xbb"), None);

        store.merge_delta(&payload(
            2,
            json!({ "tokens": [{
                "id": "0xAA",
                "tokenMinuteData": [{ "id": "m1", "periodStartUnix": 7260, "priceUSD": "1.6" }]
            }]}),
        ));
        assert_eq!(store.latest_price("0xAA").unwrap().granularity, Granularity::Minute);
    }

    #[test]
    fn historical_series_by_granularity() {
        let store = CacheStore::new();
        store.load_full(&payload(
            1,
            json!({ "tokens": [{
                "id": "t",
                "tokenDayData": [
                    { "id": "d1", "date": 86400, "priceUSD": "3" },
                    { "id": "d2", "date": 172800, "priceUSD": "4" }
                ]
            }]}),
        ));
        let days = store.historical_series("T", Granularity::Day, DEFAULT_SERIES_LIMIT);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].timestamp, 172800);
        assert!(store.historical_series("t", Granularity::Minute, 10).is_empty());
    }

    #[test]
    fn trading_tokens_match_pairs() {
        let store = CacheStore::new();
        store.load_full(&payload(
            1,
            json!({
                "erc20Tokens": [{ "id": "0xA" }, { "id": "0xb" }, { "id": "0xc" }],
                "pairs": [{ "id": "p", "token0": { "id": "0xa" }, "token1": { "id": "0xB" } }]
            }),
        ));
        let traded: Vec<String> = store.trading_tokens().iter().map(|t| t.id().to_owned()).collect();
        assert_eq!(traded, ["0xA", "0xb"]);
    }

    #[test]
    fn clear_resets() {
        let store = CacheStore::new();
        store.load_full(&payload(1, json!({ "tokens": [{ "id": "A" }], "globalStats": [{ "id": "g" }] })));
        store.clear();
        assert!(!store.is_initialized());
        assert_eq!(store.total_records(), 0);
        assert_eq!(store.singleton(EntityKind::GlobalStats), None);
        let stats = store.stats();
        assert_eq!(stats.last_updated, None);
        assert!(stats.entities.values().all(|count| *count == 0));
    }

    fn arb_records(prefix: &'static str) -> impl Strategy<Value = Value> {
        prop::collection::vec(0u8..12, 0..8).prop_map(move |ids| {
            Value::Array(
                ids.into_iter()
                    .map(|i| json!({ "id": format!("{prefix}{i}") }))
                    .collect(),
            )
        })
    }

    proptest! {
        #[test]
        fn total_matches_recount_after_any_sequence(
            full_tokens in arb_records("t"),
            deltas in prop::collection::vec((arb_records("t"), arb_records("c"), any::<bool>()), 0..6),
        ) {
            let store = CacheStore::new();
            store.load_full(&payload(1, json!({ "tokens": full_tokens })));
            prop_assert_eq!(store.total_records(), recomputed(&store));

            for (i, (tokens, contributions, stats)) in deltas.into_iter().enumerate() {
                let mut fields = json!({ "tokens": tokens, "contributions": contributions });
                if stats {
                    fields["marketplaceStats"] = json!([{ "id": "m" }]);
                }
                store.merge_delta(&payload(2 + i as u64, fields));
                prop_assert_eq!(store.total_records(), recomputed(&store));
                let tokens = store.get(EntityKind::Tokens);
                let unique: HashSet<&str> = tokens.ids().collect();
                prop_assert_eq!(unique.len(), tokens.len());
            }
        }
    }
}
