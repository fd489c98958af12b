//! Price oracle adapter
//!
//! Wraps the external price feed collaborator and rejects anything that is
//! not a fresh, positive answer. No caching and no retry: every query hits
//! the feed, and a bad answer fails the operation that asked for it.

use ledger_types::ids::PriceSourceId;
use ledger_types::numeric::MAX_POW10;
use ledger_types::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::errors::{FeedError, OracleError};
use crate::registry::AssetConfig;

/// Raw answer reported by a price feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRound {
    pub answer: i128,
    pub decimals: u8,
    pub updated_at: Timestamp,
}

/// External price feed collaborator.
pub trait PriceFeed: Send + Sync {
    fn latest_round(&self, source: &PriceSourceId) -> Result<PriceRound, FeedError>;
}

/// A validated, strictly positive price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Price {
    pub value: u128,
    pub decimals: u8,
}

/// Freshness and positivity gate in front of a [`PriceFeed`].
#[derive(Clone)]
pub struct PriceOracleAdapter {
    feed: Arc<dyn PriceFeed>,
    native_usd_source: PriceSourceId,
    /// `None` disables the age check.
    max_age_secs: Option<i64>,
}

impl PriceOracleAdapter {
    pub fn new(
        feed: Arc<dyn PriceFeed>,
        native_usd_source: PriceSourceId,
        max_age_secs: Option<i64>,
    ) -> Self {
        Self {
            feed,
            native_usd_source,
            max_age_secs,
        }
    }

    pub fn native_usd_source(&self) -> &PriceSourceId {
        &self.native_usd_source
    }

    /// Freshest answer of `source`, validated against `now`.
    pub fn latest_price(
        &self,
        source: &PriceSourceId,
        now: Timestamp,
    ) -> Result<Price, OracleError> {
        let round = self
            .feed
            .latest_round(source)
            .map_err(|reason| OracleError::Feed {
                feed: source.clone(),
                reason,
            })?;

        if round.answer <= 0 {
            return Err(OracleError::NonPositive {
                feed: source.clone(),
                answer: round.answer,
            });
        }
        if u32::from(round.decimals) > MAX_POW10 {
            return Err(OracleError::UnsupportedDecimals {
                feed: source.clone(),
                decimals: round.decimals,
            });
        }
        if round.updated_at > now {
            return Err(OracleError::FromFuture {
                feed: source.clone(),
                updated_at: round.updated_at,
                now,
            });
        }
        if let Some(max_age) = self.max_age_secs {
            if now.saturating_sub(round.updated_at) > max_age {
                return Err(OracleError::Stale {
                    feed: source.clone(),
                    updated_at: round.updated_at,
                    now,
                    max_age,
                });
            }
        }

        Ok(Price {
            value: round.answer.unsigned_abs(),
            decimals: round.decimals,
        })
    }

    /// Canonical native → USD price.
    pub fn native_usd_price(&self, now: Timestamp) -> Result<Price, OracleError> {
        self.latest_price(&self.native_usd_source, now)
    }

    /// Asset → native price for a token.
    pub fn asset_native_price(
        &self,
        config: &AssetConfig,
        now: Timestamp,
    ) -> Result<Price, OracleError> {
        let source = config
            .price_source
            .as_ref()
            .ok_or_else(|| OracleError::MissingSource {
                asset: config.asset.clone(),
            })?;
        self.latest_price(source, now)
    }
}

impl std::fmt::Debug for PriceOracleAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceOracleAdapter")
            .field("native_usd_source", &self.native_usd_source)
            .field("max_age_secs", &self.max_age_secs)
            .finish_non_exhaustive()
    }
}

/// In-process price feed holding the latest round per source.
#[derive(Debug, Default)]
pub struct InMemoryPriceFeed {
    rounds: RwLock<HashMap<PriceSourceId, PriceRound>>,
}

impl InMemoryPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new round for `source`, replacing the previous one.
    pub fn set_price(
        &self,
        source: impl Into<PriceSourceId>,
        answer: i128,
        decimals: u8,
        updated_at: Timestamp,
    ) {
        self.rounds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                source.into(),
                PriceRound {
                    answer,
                    decimals,
                    updated_at,
                },
            );
    }

    pub fn remove(&self, source: &PriceSourceId) {
        self.rounds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(source);
    }
}

impl PriceFeed for InMemoryPriceFeed {
    fn latest_round(&self, source: &PriceSourceId) -> Result<PriceRound, FeedError> {
        self.rounds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .copied()
            .ok_or(FeedError::UnknownSource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::ids::AssetId;

    const NOW: Timestamp = 1_700_000_000;

    fn adapter(feed: Arc<InMemoryPriceFeed>) -> PriceOracleAdapter {
        PriceOracleAdapter::new(feed, PriceSourceId::new("ETH/USD"), Some(3600))
    }

    #[test]
    fn test_native_price_ok() {
        let feed = Arc::new(InMemoryPriceFeed::new());
        feed.set_price("ETH/USD", 2000_00000000, 8, NOW - 10);
        let price = adapter(feed).native_usd_price(NOW).unwrap();
        assert_eq!(price.value, 2000_00000000);
        assert_eq!(price.decimals, 8);
    }

    #[test]
    fn test_non_positive_rejected() {
        let feed = Arc::new(InMemoryPriceFeed::new());
        feed.set_price("ETH/USD", 0, 8, NOW);
        assert!(matches!(
            adapter(feed.clone()).native_usd_price(NOW),
            Err(OracleError::NonPositive { answer: 0, .. })
        ));
        feed.set_price("ETH/USD", -5, 8, NOW);
        assert!(matches!(
            adapter(feed).native_usd_price(NOW),
            Err(OracleError::NonPositive { answer: -5, .. })
        ));
    }

    #[test]
    fn test_stale_rejected() {
        let feed = Arc::new(InMemoryPriceFeed::new());
        feed.set_price("ETH/USD", 2000_00000000, 8, NOW - 3601);
        assert!(matches!(
            adapter(feed).native_usd_price(NOW),
            Err(OracleError::Stale { max_age: 3600, .. })
        ));
    }

    #[test]
    fn test_ancient_round_rejected_without_overflow() {
        let feed = Arc::new(InMemoryPriceFeed::new());
        feed.set_price("ETH/USD", 2000_00000000, 8, i64::MIN);
        assert!(matches!(
            adapter(feed).native_usd_price(NOW),
            Err(OracleError::Stale { updated_at: i64::MIN, max_age: 3600, .. })
        ));
    }

    #[test]
    fn test_exactly_max_age_accepted() {
        let feed = Arc::new(InMemoryPriceFeed::new());
        feed.set_price("ETH/USD", 2000_00000000, 8, NOW - 3600);
        assert!(adapter(feed).native_usd_price(NOW).is_ok());
    }

    #[test]
    fn test_future_round_rejected() {
        let feed = Arc::new(InMemoryPriceFeed::new());
        feed.set_price("ETH/USD", 2000_00000000, 8, NOW + 1);
        assert!(matches!(
            adapter(feed).native_usd_price(NOW),
            Err(OracleError::FromFuture { .. })
        ));
    }

    #[test]
    fn test_age_check_disabled() {
        let feed = Arc::new(InMemoryPriceFeed::new());
        feed.set_price("ETH/USD", 2000_00000000, 8, 0);
        let adapter = PriceOracleAdapter::new(feed, PriceSourceId::new("ETH/USD"), None);
        assert!(adapter.native_usd_price(NOW).is_ok());
    }

    #[test]
    fn test_unknown_source() {
        let feed = Arc::new(InMemoryPriceFeed::new());
        assert!(matches!(
            adapter(feed).native_usd_price(NOW),
            Err(OracleError::Feed {
                reason: FeedError::UnknownSource,
                ..
            })
        ));
    }

    #[test]
    fn test_asset_without_source() {
        let feed = Arc::new(InMemoryPriceFeed::new());
        let config = AssetConfig {
            asset: AssetId::token("0xdai"),
            decimals: 18,
            is_native: false,
            price_source: None,
            supported: true,
        };
        assert_eq!(
            adapter(feed).asset_native_price(&config, NOW),
            Err(OracleError::MissingSource {
                asset: AssetId::token("0xdai")
            })
        );
    }

    #[test]
    fn test_removed_source_fails() {
        let feed = Arc::new(InMemoryPriceFeed::new());
        feed.set_price("ETH/USD", 1, 8, NOW);
        feed.remove(&PriceSourceId::new("ETH/USD"));
        assert!(adapter(feed).native_usd_price(NOW).is_err());
    }
}
