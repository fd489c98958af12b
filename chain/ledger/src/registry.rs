//! Asset registry: accepted assets, their precision and price sources
//!
//! The native asset is implicitly accepted and never stored; its config is
//! synthesized from the engine-wide native → USD source. Tokens are soft
//! deleted: unregistering flips a flag so historical balances stay valued.

use ledger_types::ids::{AssetId, PriceSourceId};
use ledger_types::numeric::NATIVE_DECIMALS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::LedgerError;

/// Highest token precision the fixed-point range supports.
pub const MAX_ASSET_DECIMALS: u8 = 36;

/// Registry entry for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub asset: AssetId,
    pub decimals: u8,
    pub is_native: bool,
    /// For tokens: the asset → native feed. For native: the native → USD feed.
    pub price_source: Option<PriceSourceId>,
    pub supported: bool,
}

/// Outcome of a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    /// A previously unregistered token was accepted again.
    Reenabled,
    /// Already registered and supported; nothing changed.
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRegistry {
    assets: BTreeMap<AssetId, AssetConfig>,
    native_usd_source: PriceSourceId,
}

impl AssetRegistry {
    pub fn new(native_usd_source: PriceSourceId) -> Self {
        Self {
            assets: BTreeMap::new(),
            native_usd_source,
        }
    }

    /// Register a token.
    ///
    /// Registering a present token is an idempotent no-op: decimals are never
    /// changed after the first registration.
    pub fn register(
        &mut self,
        asset: AssetId,
        decimals: u8,
        is_native: bool,
        price_source: Option<PriceSourceId>,
    ) -> Result<Registration, LedgerError> {
        if asset.is_native() || asset.is_zero_token() || is_native {
            return Err(LedgerError::InvalidAsset { asset });
        }
        if decimals > MAX_ASSET_DECIMALS {
            return Err(LedgerError::InvalidAsset { asset });
        }

        if let Some(existing) = self.assets.get_mut(&asset) {
            if existing.supported {
                return Ok(Registration::AlreadyPresent);
            }
            existing.supported = true;
            return Ok(Registration::Reenabled);
        }

        self.assets.insert(
            asset.clone(),
            AssetConfig {
                asset,
                decimals,
                is_native: false,
                price_source,
                supported: true,
            },
        );
        Ok(Registration::Added)
    }

    /// Flip a token's supported flag off. Returns whether anything changed.
    pub fn unregister(&mut self, asset: &AssetId) -> Result<bool, LedgerError> {
        if asset.is_native() {
            return Err(LedgerError::InvalidAsset {
                asset: asset.clone(),
            });
        }
        match self.assets.get_mut(asset) {
            Some(config) if config.supported => {
                config.supported = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Point a token at a new asset → native price feed.
    pub fn rotate_price_source(
        &mut self,
        asset: &AssetId,
        price_source: PriceSourceId,
    ) -> Result<Option<PriceSourceId>, LedgerError> {
        if asset.is_native() {
            return Err(LedgerError::InvalidAsset {
                asset: asset.clone(),
            });
        }
        let config = self
            .assets
            .get_mut(asset)
            .ok_or_else(|| LedgerError::UnsupportedAsset {
                asset: asset.clone(),
            })?;
        Ok(config.price_source.replace(price_source))
    }

    pub fn is_supported(&self, asset: &AssetId) -> bool {
        asset.is_native() || self.assets.get(asset).map_or(false, |c| c.supported)
    }

    /// Config of a supported asset.
    pub fn resolve(&self, asset: &AssetId) -> Result<AssetConfig, LedgerError> {
        let config = self.lookup(asset)?;
        if !config.supported {
            return Err(LedgerError::UnsupportedAsset {
                asset: asset.clone(),
            });
        }
        Ok(config)
    }

    /// Config of any known asset, supported or not.
    pub fn lookup(&self, asset: &AssetId) -> Result<AssetConfig, LedgerError> {
        if asset.is_native() {
            return Ok(self.native_config());
        }
        self.assets
            .get(asset)
            .cloned()
            .ok_or_else(|| LedgerError::UnsupportedAsset {
                asset: asset.clone(),
            })
    }

    pub fn native_usd_source(&self) -> &PriceSourceId {
        &self.native_usd_source
    }

    pub(crate) fn set_native_usd_source(&mut self, source: PriceSourceId) {
        self.native_usd_source = source;
    }

    /// Every registered token, in identifier order.
    pub fn tokens(&self) -> impl Iterator<Item = &AssetConfig> {
        self.assets.values()
    }

    fn native_config(&self) -> AssetConfig {
        AssetConfig {
            asset: AssetId::Native,
            decimals: NATIVE_DECIMALS,
            is_native: true,
            price_source: Some(self.native_usd_source.clone()),
            supported: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AssetRegistry {
        AssetRegistry::new(PriceSourceId::new("ETH/USD"))
    }

    fn usdc() -> AssetId {
        AssetId::token("0xusdc")
    }

    #[test]
    fn test_native_always_supported() {
        let reg = registry();
        assert!(reg.is_supported(&AssetId::Native));
        let native = reg.resolve(&AssetId::Native).unwrap();
        assert_eq!(native.decimals, 18);
        assert!(native.is_native);
        assert_eq!(native.price_source, Some(PriceSourceId::new("ETH/USD")));
    }

    #[test]
    fn test_register_and_resolve() {
        let mut reg = registry();
        let outcome = reg
            .register(usdc(), 6, false, Some(PriceSourceId::new("USDC/ETH")))
            .unwrap();
        assert_eq!(outcome, Registration::Added);
        let config = reg.resolve(&usdc()).unwrap();
        assert_eq!(config.decimals, 6);
        assert!(config.supported);
    }

    #[test]
    fn test_register_twice_keeps_single_entry() {
        let mut reg = registry();
        reg.register(usdc(), 6, false, None).unwrap();
        let outcome = reg.register(usdc(), 18, false, None).unwrap();
        assert_eq!(outcome, Registration::AlreadyPresent);
        assert_eq!(reg.tokens().count(), 1);
        assert_eq!(reg.resolve(&usdc()).unwrap().decimals, 6);
    }

    #[test]
    fn test_register_native_sentinel_rejected() {
        let mut reg = registry();
        assert_eq!(
            reg.register(AssetId::Native, 18, true, None),
            Err(LedgerError::InvalidAsset {
                asset: AssetId::Native
            })
        );
        assert!(reg
            .register(AssetId::token("0x0000"), 18, false, None)
            .is_err());
        assert!(reg.register(usdc(), 6, true, None).is_err());
    }

    #[test]
    fn test_register_rejects_excessive_decimals() {
        let mut reg = registry();
        assert!(matches!(
            reg.register(usdc(), 40, false, None),
            Err(LedgerError::InvalidAsset { .. })
        ));
    }

    #[test]
    fn test_unregister_is_soft_and_idempotent() {
        let mut reg = registry();
        reg.register(usdc(), 6, false, None).unwrap();
        assert!(reg.unregister(&usdc()).unwrap());
        assert!(!reg.unregister(&usdc()).unwrap());
        assert!(!reg.is_supported(&usdc()));
        assert!(matches!(
            reg.resolve(&usdc()),
            Err(LedgerError::UnsupportedAsset { .. })
        ));
        // Historical config stays queryable
        assert_eq!(reg.lookup(&usdc()).unwrap().decimals, 6);
    }

    #[test]
    fn test_unregister_native_rejected() {
        let mut reg = registry();
        assert!(reg.unregister(&AssetId::Native).is_err());
    }

    #[test]
    fn test_reregister_reenables() {
        let mut reg = registry();
        reg.register(usdc(), 6, false, None).unwrap();
        reg.unregister(&usdc()).unwrap();
        assert_eq!(
            reg.register(usdc(), 6, false, None).unwrap(),
            Registration::Reenabled
        );
        assert!(reg.is_supported(&usdc()));
    }

    #[test]
    fn test_rotate_price_source() {
        let mut reg = registry();
        reg.register(usdc(), 6, false, Some(PriceSourceId::new("old")))
            .unwrap();
        let previous = reg
            .rotate_price_source(&usdc(), PriceSourceId::new("new"))
            .unwrap();
        assert_eq!(previous, Some(PriceSourceId::new("old")));
        assert_eq!(
            reg.resolve(&usdc()).unwrap().price_source,
            Some(PriceSourceId::new("new"))
        );
    }

    #[test]
    fn test_rotate_unknown_asset() {
        let mut reg = registry();
        assert!(matches!(
            reg.rotate_price_source(&usdc(), PriceSourceId::new("x")),
            Err(LedgerError::UnsupportedAsset { .. })
        ));
    }

    #[test]
    fn test_resolve_unknown_asset() {
        let reg = registry();
        assert_eq!(
            reg.resolve(&usdc()),
            Err(LedgerError::UnsupportedAsset { asset: usdc() })
        );
    }
}
