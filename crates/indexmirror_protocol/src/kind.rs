//! Entity kinds and their merge policies.
//!
//! Every cached kind is described by one row of [`KINDS`]. The cache store
//! consults this table in a single generic merge routine, so adding a kind
//! means adding a variant and a row here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a merge treats a record whose id is already cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The remote always sends the latest full state per id; overwrite in
    /// place, keeping the record's position.
    Replace,
    /// The kind is an append-only event log; keep the cached record.
    SkipExisting,
}

/// Bucket size of a time-series kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One bucket per minute.
    Minute,
    /// One bucket per hour.
    Hour,
    /// One bucket per day.
    Day,
}

impl Granularity {
    /// All granularities, finest first.
    pub const ALL: [Granularity; 3] = [Granularity::Minute, Granularity::Hour, Granularity::Day];

    /// The cached kind holding buckets of this size.
    pub fn kind(self) -> EntityKind {
        match self {
            Granularity::Minute => EntityKind::TokenMinuteData,
            Granularity::Hour => EntityKind::TokenHourData,
            Granularity::Day => EntityKind::TokenDayData,
        }
    }

    /// Lower-case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minute" => Ok(Granularity::Minute),
            "hour" => Ok(Granularity::Hour),
            "day" => Ok(Granularity::Day),
            other => Err(format!("unknown granularity: {other}")),
        }
    }
}

/// Where a kind's records come from in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A top-level array field.
    Collection,
    /// Rows nested under each `tokens[]` element, flattened and annotated
    /// with their parent token.
    Series(Granularity),
    /// At most one record: the first element of an array field, or the
    /// field itself if it is an object.
    Singleton,
}

/// A named category of cached records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// Fundraising requests.
    #[serde(rename = "icoRequests")]
    IcoRequests,
    /// Contributions to fundraising requests.
    #[serde(rename = "contributions")]
    Contributions,
    /// Launched projects.
    #[serde(rename = "projects")]
    Projects,
    /// ERC-20 tokens.
    #[serde(rename = "erc20Tokens")]
    Erc20Tokens,
    /// Marketplace listings.
    #[serde(rename = "listings")]
    Listings,
    /// Marketplace sales.
    #[serde(rename = "sales")]
    Sales,
    /// DEX tokens with running totals.
    #[serde(rename = "tokens")]
    Tokens,
    /// DEX pairs.
    #[serde(rename = "pairs")]
    Pairs,
    /// Accounts.
    #[serde(rename = "accounts")]
    Accounts,
    /// Recent transactions.
    #[serde(rename = "transactions")]
    Transactions,
    /// Funds-manager checkpoints.
    #[serde(rename = "checkpoints")]
    Checkpoints,
    /// LP token locks.
    #[serde(rename = "lpTokenLocks")]
    LpTokenLocks,
    /// Bonus claims.
    #[serde(rename = "bonusClaims")]
    BonusClaims,
    /// Per-minute token buckets.
    #[serde(rename = "tokenMinuteData")]
    TokenMinuteData,
    /// Per-hour token buckets.
    #[serde(rename = "tokenHourData")]
    TokenHourData,
    /// Per-day token buckets.
    #[serde(rename = "tokenDayData")]
    TokenDayData,
    /// Protocol-wide counters.
    #[serde(rename = "globalStats")]
    GlobalStats,
    /// Marketplace counters.
    #[serde(rename = "marketplaceStats")]
    MarketplaceStats,
    /// DEX factory.
    #[serde(rename = "piculeFactory")]
    PiculeFactory,
}

/// One row of the kind table.
#[derive(Debug, Clone, Copy)]
pub struct KindSpec {
    /// The kind described.
    pub kind: EntityKind,
    /// Name used by readers.
    pub name: &'static str,
    /// Payload field the records are read from.
    pub field: &'static str,
    /// Duplicate handling on merge.
    pub policy: MergePolicy,
    /// Payload shape.
    pub shape: Shape,
}

const fn row(
    kind: EntityKind,
    name: &'static str,
    field: &'static str,
    policy: MergePolicy,
    shape: Shape,
) -> KindSpec {
    KindSpec {
        kind,
        name,
        field,
        policy,
        shape,
    }
}

use EntityKind as K;
use MergePolicy::{Replace, SkipExisting};

/// The kind table, in [`EntityKind`] declaration order.
pub static KINDS: [KindSpec; 19] = [
    row(K::IcoRequests, "icoRequests", "icorequests", SkipExisting, Shape::Collection),
    row(K::Contributions, "contributions", "contributions", SkipExisting, Shape::Collection),
    row(K::Projects, "projects", "projects", SkipExisting, Shape::Collection),
    row(K::Erc20Tokens, "erc20Tokens", "erc20Tokens", SkipExisting, Shape::Collection),
    row(K::Listings, "listings", "listings", SkipExisting, Shape::Collection),
    row(K::Sales, "sales", "sales", SkipExisting, Shape::Collection),
    row(K::Tokens, "tokens", "tokens", Replace, Shape::Collection),
    row(K::Pairs, "pairs", "pairs", SkipExisting, Shape::Collection),
    row(K::Accounts, "accounts", "accounts", SkipExisting, Shape::Collection),
    row(K::Transactions, "transactions", "transactions", SkipExisting, Shape::Collection),
    row(K::Checkpoints, "checkpoints", "checkpoints", SkipExisting, Shape::Collection),
    row(K::LpTokenLocks, "lpTokenLocks", "lpTokenLocks", SkipExisting, Shape::Collection),
    row(K::BonusClaims, "bonusClaims", "bonusClaims", SkipExisting, Shape::Collection),
    row(
        K::TokenMinuteData,
        "tokenMinuteData",
        "tokenMinuteData",
        SkipExisting,
        Shape::Series(Granularity::Minute),
    ),
    row(
        K::TokenHourData,
        "tokenHourData",
        "tokenHourData",
        SkipExisting,
        Shape::Series(Granularity::Hour),
    ),
    row(
        K::TokenDayData,
        "tokenDayData",
        "tokenDayData",
        SkipExisting,
        Shape::Series(Granularity::Day),
    ),
    row(K::GlobalStats, "globalStats", "globalStats", Replace, Shape::Singleton),
    row(K::MarketplaceStats, "marketplaceStats", "marketplaceStats", Replace, Shape::Singleton),
    row(K::PiculeFactory, "piculeFactory", "piculeFactories", Replace, Shape::Singleton),
];

impl EntityKind {
    /// Iterates over every kind in table order.
    pub fn all() -> impl Iterator<Item = EntityKind> {
        KINDS.iter().map(|spec| spec.kind)
    }

    /// Returns this kind's table row.
    pub fn spec(self) -> &'static KindSpec {
        &KINDS[self as usize]
    }

    /// Returns the reader-facing name.
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Returns the merge policy.
    pub fn policy(self) -> MergePolicy {
        self.spec().policy
    }

    /// Returns true for kinds holding at most one record.
    pub fn is_singleton(self) -> bool {
        matches!(self.spec().shape, Shape::Singleton)
    }

    /// Looks a kind up by its reader-facing name.
    pub fn from_name(name: &str) -> Option<EntityKind> {
        KINDS.iter().find(|spec| spec.name == name).map(|spec| spec.kind)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::from_name(s).ok_or_else(|| format!("unknown entity kind: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_discriminant() {
        for (index, spec) in KINDS.iter().enumerate() {
            assert_eq!(spec.kind as usize, index, "row {} out of order", spec.name);
            assert_eq!(spec.kind.spec().name, spec.name);
        }
    }

    #[test]
    fn names_round_trip() {
        for kind in EntityKind::all() {
            assert_eq!(kind.name().parse::<EntityKind>(), Ok(kind));
        }
        assert!("nope".parse::<EntityKind>().is_err());
    }

    #[test]
    fn only_mutable_state_kinds_replace() {
        assert_eq!(EntityKind::Tokens.policy(), MergePolicy::Replace);
        assert_eq!(EntityKind::Contributions.policy(), MergePolicy::SkipExisting);
        assert_eq!(EntityKind::Accounts.policy(), MergePolicy::SkipExisting);
        assert_eq!(EntityKind::TokenHourData.policy(), MergePolicy::SkipExisting);
    }

    #[test]
    fn granularity_maps_to_series_kind() {
        for granularity in Granularity::ALL {
            let kind = granularity.kind();
            assert_eq!(kind.spec().shape, Shape::Series(granularity));
        }
        assert_eq!("Hour".parse::<Granularity>(), Ok(Granularity::Hour));
        assert!("week".parse::<Granularity>().is_err());
    }

    #[test]
    fn serde_uses_reader_names() {
        let json = serde_json::to_string(&EntityKind::IcoRequests).unwrap();
        assert_eq!(json, "\"icoRequests\"");
    }
}
