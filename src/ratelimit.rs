//! Per-flow request admission.

use crate::{
    Error, Result,
    config::{Config, RateLimitConfig},
};
use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Built once at startup and shared through application state.
///
/// Only known flows get their own limiter. Requests for any other id share
/// a single limiter under the default policy and go on to fail lookup, so
/// arbitrary ids in the URL never add state.
pub struct RateLimiterManager {
    default_policy: RateLimitConfig,
    policies: DashMap<String, RateLimitConfig>,
    limiters: DashMap<String, Arc<DefaultDirectRateLimiter>>,
    unknown: OnceLock<Arc<DefaultDirectRateLimiter>>,
}

impl RateLimiterManager {
    pub fn new(default_policy: RateLimitConfig) -> Self {
        Self {
            default_policy,
            policies: DashMap::new(),
            limiters: DashMap::new(),
            unknown: OnceLock::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let manager = Self::new(config.rate_limit.clone());
        for flow in &config.flows {
            manager.register_flow(&flow.id, flow.rate_limit.clone());
        }
        info!(
            "Rate limiter ready ({} flows, default {} per {}s)",
            manager.policies.len(),
            config.rate_limit.max_requests,
            config.rate_limit.window_secs
        );
        manager
    }

    /// Makes `flow_id` known, with its own override or the default policy.
    pub fn register_flow(&self, flow_id: &str, policy: Option<RateLimitConfig>) {
        self.update_policy(flow_id, policy.unwrap_or_else(|| self.default_policy.clone()));
    }

    /// Replaces the policy for one flow and resets its counters.
    pub fn update_policy(&self, flow_id: &str, policy: RateLimitConfig) {
        self.limiters.remove(flow_id);
        self.policies.insert(flow_id.to_string(), policy);
        debug!("Rate limit policy updated for flow {}", flow_id);
    }

    pub fn is_known(&self, flow_id: &str) -> bool {
        self.policies.contains_key(flow_id)
    }

    pub fn policy_for(&self, flow_id: &str) -> RateLimitConfig {
        self.policies
            .get(flow_id)
            .map(|p| p.value().clone())
            .unwrap_or_else(|| self.default_policy.clone())
    }

    /// Number of per-flow limiters currently held.
    pub fn limiter_count(&self) -> usize {
        self.limiters.len()
    }

    /// Admits one request for `flow_id` or fails with `RateLimited`.
    pub fn check(&self, flow_id: &str) -> Result<()> {
        let policy = self.policy_for(flow_id);
        if policy.max_requests == 0 {
            return Ok(());
        }

        let limiter = if self.is_known(flow_id) {
            self.flow_limiter(flow_id, &policy)?
        } else {
            self.unknown_limiter(&policy)?
        };

        limiter.check().map_err(|_| {
            warn!("Rate limit exceeded for flow {}", flow_id);
            Error::RateLimited(policy.message.clone())
        })
    }

    fn flow_limiter(
        &self,
        flow_id: &str,
        policy: &RateLimitConfig,
    ) -> Result<Arc<DefaultDirectRateLimiter>> {
        if let Some(limiter) = self.limiters.get(flow_id).map(|l| Arc::clone(l.value())) {
            return Ok(limiter);
        }

        let limiter = Arc::new(RateLimiter::direct(quota_for(policy)?));
        Ok(Arc::clone(
            self.limiters
                .entry(flow_id.to_string())
                .or_insert(limiter)
                .value(),
        ))
    }

    fn unknown_limiter(&self, policy: &RateLimitConfig) -> Result<Arc<DefaultDirectRateLimiter>> {
        if let Some(limiter) = self.unknown.get() {
            return Ok(Arc::clone(limiter));
        }

        let quota = quota_for(policy)?;
        Ok(Arc::clone(
            self.unknown
                .get_or_init(|| Arc::new(RateLimiter::direct(quota))),
        ))
    }
}

/// `max_requests` per `window_secs`, with the whole allowance usable as a burst.
fn quota_for(policy: &RateLimitConfig) -> Result<Quota> {
    let burst = NonZeroU32::new(policy.max_requests)
        .ok_or_else(|| Error::config("rate limit max_requests must be positive"))?;
    let period = Duration::from_secs(policy.window_secs) / policy.max_requests;

    Quota::with_period(period)
        .map(|quota| quota.allow_burst(burst))
        .ok_or_else(|| Error::config("rate limit window must be positive"))
}
