//! GraphQL documents and the request/response envelope.
//!
//! Every document selects `_meta { block { number } }` so the response
//! carries the checkpoint visible at fetch time.

use crate::checkpoint::Checkpoint;
use crate::error::{ProtocolError, ProtocolResult};
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Complete snapshot of every cached kind.
pub const FULL_SNAPSHOT_QUERY: &str = r#"
query FullSnapshot($first: Int!) {
  _meta { block { number } }
  transactions(first: 5) { id blockNumber timestamp gasUsed }
  icorequests(first: $first, orderBy: createdAt, orderDirection: desc) {
    id numOfRequest creator { id } createdAt
    transaction { id blockNumber timestamp }
    totalContributions totalContributors active
  }
  contributions(first: $first, orderBy: timestamp, orderDirection: desc) {
    id icoRequest { id numOfRequest } numOfProject contributor { id }
    amount timestamp transaction { id blockNumber timestamp }
  }
  projects(first: $first, orderBy: createdAt, orderDirection: desc) {
    id icoId creator { id }
    token { id name symbol decimals totalSupply }
    nft { id name symbol totalSupply }
    fundsManager { id } createdAt transaction { id blockNumber timestamp }
  }
  erc20Tokens(first: $first, orderBy: totalSupply, orderDirection: desc) {
    id name symbol decimals totalSupply derivedUSD derivedMON totalTransfers totalHolders
  }
  listings(first: $first, orderBy: createdAt, orderDirection: desc) {
    id seller { id } nftContract tokenId token { id identifier uri }
    price active createdAt updatedAt
  }
  sales(first: $first, orderBy: timestamp, orderDirection: desc) {
    id seller { id } buyer { id } nftContract tokenId price timestamp
    transaction { id blockNumber }
  }
  tokens(first: $first, orderBy: txCount, orderDirection: desc) {
    ...TokenFields
  }
  pairs(first: $first, orderBy: txCount, orderDirection: desc) {
    id token0 { id symbol name } token1 { id symbol name }
    reserve0 reserve1 totalSupply reserveUSD token0Price token1Price
    volumeUSD txCount createdAtTimestamp
  }
  checkpoints(first: $first, orderBy: timestamp, orderDirection: desc) {
    id fundsManager { id } amount timestamp
  }
  lpTokenLocks(first: $first, orderBy: lockedAt, orderDirection: desc) {
    id fundsManager { id } amount lockedAt unlockAt
  }
  bonusClaims(first: $first, orderBy: timestamp, orderDirection: desc) {
    id account { id } amount0 amount1 timestamp
  }
  globalStats(where: { id: "1" }) {
    id totalProjects totalTokensCreated totalICORequests totalContributions
    totalContributionValue totalContributionValueUSD totalListings totalSales
    totalVolume totalVolumeUSD
  }
  marketplaceStats(where: { id: "1" }) {
    id totalListings totalSales totalVolume totalVolumeUSD
  }
  piculeFactories(first: 1) {
    id pairCount totalVolumeUSD totalVolumeMON untrackedVolumeUSD
    totalLiquidityUSD totalLiquidityMON txCount
  }
  accounts(first: $first, orderBy: usdSwapped, orderDirection: desc) {
    ...AccountFields
  }
}
"#;

/// Entities changed after `$fromBlock`.
pub const DELTA_QUERY: &str = r#"
query DeltaSince($fromBlock: Int!) {
  _meta { block { number } }
  icorequests(where: { transaction_: { blockNumber_gt: $fromBlock } }, orderBy: createdAt, orderDirection: desc) {
    id numOfRequest creator { id } createdAt
    transaction { id blockNumber timestamp }
    totalContributions totalContributors active
  }
  contributions(where: { transaction_: { blockNumber_gt: $fromBlock } }, orderBy: timestamp, orderDirection: desc) {
    id icoRequest { id numOfRequest } numOfProject contributor { id }
    amount timestamp transaction { id blockNumber timestamp }
  }
  projects(where: { transaction_: { blockNumber_gt: $fromBlock } }, orderBy: createdAt, orderDirection: desc) {
    id icoId creator { id }
    token { id name symbol decimals totalSupply }
    nft { id name symbol totalSupply }
    fundsManager { id } createdAt transaction { id blockNumber timestamp }
  }
  listings(where: { createdAtBlockNumber_gt: $fromBlock }, orderBy: createdAt, orderDirection: desc) {
    id seller { id } nftContract tokenId token { id identifier uri }
    price active createdAt updatedAt
  }
  sales(where: { transaction_: { blockNumber_gt: $fromBlock } }, orderBy: timestamp, orderDirection: desc) {
    id seller { id } buyer { id } nftContract tokenId price timestamp
    transaction { id blockNumber }
  }
  tokens(where: { lastMinuteRecorded_gt: $fromBlock }, orderBy: txCount, orderDirection: desc) {
    ...TokenFields
  }
  pairs(where: { createdAtBlockNumber_gt: $fromBlock }, orderBy: createdAtTimestamp, orderDirection: desc) {
    id token0 { id symbol name } token1 { id symbol name }
    reserve0 reserve1 totalSupply reserveUSD token0Price token1Price
    volumeUSD txCount createdAtTimestamp createdAtBlockNumber
  }
  checkpoints(where: { blockNumber_gt: $fromBlock }) {
    id fundsManager { id } amount timestamp
  }
  lpTokenLocks(where: { blockNumber_gt: $fromBlock }) {
    id fundsManager { id } amount lockedAt unlockAt
  }
  bonusClaims(where: { blockNumber_gt: $fromBlock }) {
    id account { id } amount0 amount1 timestamp
  }
  accounts(where: { or: [
    { contributions_: { transaction_: { blockNumber_gt: $fromBlock } } },
    { salesAsBuyer_: { transaction_: { blockNumber_gt: $fromBlock } } },
    { salesAsSeller_: { transaction_: { blockNumber_gt: $fromBlock } } },
    { icoRequests_: { transaction_: { blockNumber_gt: $fromBlock } } }
  ] }) {
    ...AccountFields
  }
}
"#;

/// Checkpoint only.
pub const CHECKPOINT_QUERY: &str = "query Checkpoint { _meta { block { number } } }";

const FRAGMENTS: &str = r#"
fragment TokenFields on Token {
  id symbol name decimals totalSupply tradeVolume tradeVolumeUSD
  txCount totalLiquidity derivedMON
  tokenMinuteData(first: 60, orderBy: periodStartUnix, orderDirection: desc) {
    id periodStartUnix priceUSD open high low close volume volumeUSD
    totalValueLocked totalValueLockedUSD
  }
  tokenHourData(first: 168, orderBy: periodStartUnix, orderDirection: desc) {
    id periodStartUnix priceUSD open high low close volume volumeUSD
    totalValueLocked totalValueLockedUSD
  }
  tokenDayData(first: 30, orderBy: date, orderDirection: desc) {
    id date priceUSD dailyVolumeToken dailyVolumeUSD
    totalLiquidityToken totalLiquidityUSD
  }
}
fragment AccountFields on Account {
  id usdSwapped
  liquidityPositions { id liquidityTokenBalance }
  ERC721tokens { id identifier }
  listings { id price active }
  salesAsBuyer { id price }
  salesAsSeller { id price }
  contributions { id amount icoRequest { numOfRequest } }
  icoRequests { id numOfRequest }
  createdProjects { id icoId }
  bonusClaims { id amount1 }
}
"#;

/// A GraphQL POST body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphqlRequest {
    /// Query document.
    pub query: String,
    /// Query variables.
    pub variables: Value,
}

impl GraphqlRequest {
    /// Full snapshot with `first` rows per collection.
    pub fn full_snapshot(first: u32) -> Self {
        Self {
            query: format!("{FULL_SNAPSHOT_QUERY}{FRAGMENTS}"),
            variables: json!({ "first": first }),
        }
    }

    /// Everything changed after `since`.
    pub fn delta(since: Checkpoint) -> Self {
        Self {
            query: format!("{DELTA_QUERY}{FRAGMENTS}"),
            variables: json!({ "fromBlock": since }),
        }
    }

    /// Just the current checkpoint.
    pub fn checkpoint() -> Self {
        Self {
            query: CHECKPOINT_QUERY.to_owned(),
            variables: json!({}),
        }
    }

    /// Serializes the request body.
    pub fn to_body(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// An inline error reported by the remote.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphqlError {
    /// Human-readable message.
    pub message: String,
}

/// The GraphQL response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlResponse {
    /// The `data` member.
    #[serde(default)]
    pub data: Option<Value>,
    /// Inline errors.
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

impl GraphqlResponse {
    /// Decodes a response body.
    pub fn from_slice(body: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Converts to a payload, requiring a parseable checkpoint.
    ///
    /// Inline errors win over any partial data: a response carrying errors
    /// is a failure, never a partial success.
    pub fn into_payload(self) -> ProtocolResult<Payload> {
        if !self.errors.is_empty() {
            let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(ProtocolError::Remote(messages.join(", ")));
        }
        let data = match self.data {
            Some(Value::Null) | None => return Err(ProtocolError::MissingData),
            Some(data) => data,
        };
        let payload = Payload::from_data(data)?;
        if payload.checkpoint().is_none() {
            return Err(ProtocolError::MissingCheckpoint);
        }
        Ok(payload)
    }
}
