use std::time::Duration;

use crate::common::MAX_BUCKET_SIZE_K;
use crate::{Error, Result};

/// Default number of concurrent requests per lookup.
pub const DEFAULT_ALPHA: usize = 3;
/// Default number of consecutive responses without a closer contact tolerated
/// before a lookup is considered converged.
pub const DEFAULT_CONVERGENCE_THRESHOLD: usize = 3;

#[derive(Debug, Clone)]
/// Lookup configurations
pub struct Config {
    /// Number of concurrently outstanding requests per lookup.
    ///
    /// Defaults to [DEFAULT_ALPHA]
    pub alpha: usize,
    /// Maximum number of closest contacts tracked and returned.
    ///
    /// Defaults to [MAX_BUCKET_SIZE_K]
    pub k: usize,
    /// A lookup is done once more than this many consecutive responses failed
    /// to surface a contact closer than the closest known one.
    ///
    /// Empty responses count too, so if every peer answers with no contacts
    /// the lookup ends after `convergence_threshold + 1` responses without
    /// asking the remaining candidates.
    ///
    /// Defaults to [DEFAULT_CONVERGENCE_THRESHOLD]
    pub convergence_threshold: usize,
    /// Deadline for a whole lookup, on top of each request's own timeout.
    ///
    /// Defaults to None, where a lookup runs until it converges or runs out
    /// of contacts to ask.
    pub lookup_timeout: Option<Duration>,
    /// Hash keys passed to [crate::Kademlia::find_data] and friends with SHA-1.
    ///
    /// When false, keys are expected to be hex encoded [crate::Id]s already,
    /// which is handy in tests.
    ///
    /// Defaults to true
    pub hash_keys: bool,
}

impl Config {
    /// Returns an error if `alpha` or `k` are zero.
    pub fn validate(&self) -> Result<()> {
        if self.alpha == 0 {
            return Err(Error::InvalidConfig("alpha must be at least 1"));
        }
        if self.k == 0 {
            return Err(Error::InvalidConfig("k must be at least 1"));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            k: MAX_BUCKET_SIZE_K,
            convergence_threshold: DEFAULT_CONVERGENCE_THRESHOLD,
            lookup_timeout: None,
            hash_keys: true,
        }
    }
}
