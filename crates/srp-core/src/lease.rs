//! Lease and TTL policy
//!
//! Pure functions clamping the durations a client requests to the bounds the
//! server is configured with. All values are in seconds.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Bounds applied to the TTL of registered records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlConfig {
    /// Minimum granted TTL
    #[serde(default = "default_min_ttl")]
    pub min_ttl: u32,

    /// Maximum granted TTL
    #[serde(default = "default_max_ttl")]
    pub max_ttl: u32,
}

impl TtlConfig {
    /// Create a TTL configuration
    pub fn new(min_ttl: u32, max_ttl: u32) -> Self {
        Self { min_ttl, max_ttl }
    }

    /// Validate the TTL bounds
    pub fn validate(&self) -> Result<()> {
        if self.min_ttl > self.max_ttl {
            return Err(Error::config(format!(
                "min TTL ({}) must not exceed max TTL ({})",
                self.min_ttl, self.max_ttl
            )));
        }
        Ok(())
    }

    /// TTL granted for a record given the granted lease
    ///
    /// The TTL never outlives the lease before clamping to the bounds.
    pub fn grant_ttl(&self, lease: u32, ttl: u32) -> u32 {
        ttl.min(lease).clamp(self.min_ttl, self.max_ttl)
    }
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            min_ttl: default_min_ttl(),
            max_ttl: default_max_ttl(),
        }
    }
}

/// Bounds applied to requested lease and key-lease intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Minimum granted lease
    #[serde(default = "default_min_lease")]
    pub min_lease: u32,

    /// Maximum granted lease
    #[serde(default = "default_max_lease")]
    pub max_lease: u32,

    /// Minimum granted key lease
    #[serde(default = "default_min_key_lease")]
    pub min_key_lease: u32,

    /// Maximum granted key lease
    #[serde(default = "default_max_key_lease")]
    pub max_key_lease: u32,
}

impl LeaseConfig {
    /// Create a lease configuration
    pub fn new(min_lease: u32, max_lease: u32, min_key_lease: u32, max_key_lease: u32) -> Self {
        Self {
            min_lease,
            max_lease,
            min_key_lease,
            max_key_lease,
        }
    }

    /// Validate the lease bounds
    pub fn validate(&self) -> Result<()> {
        if self.min_lease > self.max_lease {
            return Err(Error::config("min lease must not exceed max lease"));
        }
        if self.min_key_lease > self.max_key_lease {
            return Err(Error::config("min key lease must not exceed max key lease"));
        }
        if self.min_lease > self.min_key_lease {
            return Err(Error::config("min lease must not exceed min key lease"));
        }
        if self.max_lease > self.max_key_lease {
            return Err(Error::config("max lease must not exceed max key lease"));
        }
        Ok(())
    }

    /// Lease granted for a requested lease; zero stays zero
    pub fn grant_lease(&self, lease: u32) -> u32 {
        if lease == 0 {
            0
        } else {
            lease.clamp(self.min_lease, self.max_lease)
        }
    }

    /// Key lease granted for a requested key lease; zero stays zero
    pub fn grant_key_lease(&self, key_lease: u32) -> u32 {
        if key_lease == 0 {
            0
        } else {
            key_lease.clamp(self.min_key_lease, self.max_key_lease)
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            min_lease: default_min_lease(),
            max_lease: default_max_lease(),
            min_key_lease: default_min_key_lease(),
            max_key_lease: default_max_key_lease(),
        }
    }
}

/// Lease and key-lease of a registered entry, with the time remaining
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseInfo {
    /// Granted lease
    pub lease: Duration,
    /// Granted key lease
    pub key_lease: Duration,
    /// Time until the lease expires
    pub remaining_lease: Duration,
    /// Time until the key lease expires
    pub remaining_key_lease: Duration,
}

impl LeaseInfo {
    pub(crate) fn new(update_time: Instant, lease: u32, key_lease: u32, now: Instant) -> Self {
        let lease = Duration::from_secs(lease.into());
        let key_lease = Duration::from_secs(key_lease.into());

        Self {
            lease,
            key_lease,
            remaining_lease: (update_time + lease).saturating_duration_since(now),
            remaining_key_lease: (update_time + key_lease).saturating_duration_since(now),
        }
    }
}

/// Expiry instant of a lease measured from `update_time`
pub(crate) fn expire_at(update_time: Instant, seconds: u32) -> Instant {
    update_time + Duration::from_secs(seconds.into())
}

fn default_min_ttl() -> u32 {
    60
}

fn default_max_ttl() -> u32 {
    7200
}

fn default_min_lease() -> u32 {
    1800
}

fn default_max_lease() -> u32 {
    7200
}

fn default_min_key_lease() -> u32 {
    86400
}

fn default_max_key_lease() -> u32 {
    1_209_600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_lease_clamps_non_zero() {
        let config = LeaseConfig::default();

        assert_eq!(config.grant_lease(0), 0);
        assert_eq!(config.grant_lease(1), 1800);
        assert_eq!(config.grant_lease(3600), 3600);
        assert_eq!(config.grant_lease(u32::MAX), 7200);

        assert_eq!(config.grant_key_lease(0), 0);
        assert_eq!(config.grant_key_lease(7200), 86400);
        assert_eq!(config.grant_key_lease(u32::MAX), 1_209_600);
    }

    #[test]
    fn test_grant_ttl_never_exceeds_lease_before_clamp() {
        let config = TtlConfig::default();

        assert_eq!(config.grant_ttl(3600, 7200), 3600);
        assert_eq!(config.grant_ttl(3600, 120), 120);
        assert_eq!(config.grant_ttl(3600, 10), 60);
        assert_eq!(config.grant_ttl(100_000, 100_000), 7200);
    }

    #[test]
    fn test_grant_bounds_hold_across_range() {
        let lease_config = LeaseConfig::new(30, 300, 600, 6000);
        let ttl_config = TtlConfig::new(5, 120);

        for requested in [1u32, 29, 30, 31, 299, 300, 301, 5000, u32::MAX] {
            let granted = lease_config.grant_lease(requested);
            assert!(
                (30..=300).contains(&granted),
                "granted lease {} out of bounds for request {}",
                granted,
                requested
            );

            for ttl in [0u32, 1, 60, 1000] {
                let granted_ttl = ttl_config.grant_ttl(granted, ttl);
                assert!(granted_ttl >= 5);
                assert!(granted_ttl <= granted.min(120).max(5));
            }
        }
    }

    #[test]
    fn test_lease_config_validation() {
        assert!(LeaseConfig::default().validate().is_ok());
        assert!(LeaseConfig::new(100, 50, 200, 300).validate().is_err());
        assert!(LeaseConfig::new(10, 50, 300, 200).validate().is_err());
        assert!(LeaseConfig::new(100, 200, 50, 300).validate().is_err());
        assert!(LeaseConfig::new(10, 400, 50, 300).validate().is_err());
        assert!(TtlConfig::new(10, 5).validate().is_err());
    }

    #[test]
    fn test_lease_info_remaining_saturates() {
        let start = Instant::now();
        let info = LeaseInfo::new(start, 10, 20, start + Duration::from_secs(15));

        assert_eq!(info.remaining_lease, Duration::ZERO);
        assert_eq!(info.remaining_key_lease, Duration::from_secs(5));
    }
}
