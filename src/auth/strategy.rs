//! Authorization strategy chain: Cache -> LocalList -> Remote ->
//! OfflineFallback (spec.md §4.G). The first strategy to return a
//! non-`Invalid` decision wins; only the tail strategy's non-`Accepted`
//! result is returned as-is.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::auth::cache_strategy::InMemoryAuthCache;
use crate::auth::unified::{AuthDecision, AuthRequest};
use crate::tags::cache::TagCache;

/// Whatever can perform a remote `Authorize`/`TransactionEvent(Started)`
/// round trip. Implemented by the station's OCPP binding + correlator;
/// kept as a trait so the auth pipeline doesn't depend on the protocol
/// dispatch layer directly.
#[async_trait]
pub trait RemoteAuthorizer: Send + Sync {
    async fn authorize_remote(&self, identifier: &str) -> AuthDecision;
}

/// Offline-fallback policy flags (spec.md §4.G `OfflineFallback`).
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflinePolicy {
    pub allow_offline_tx_for_unknown_id: bool,
    pub local_authorize_offline: bool,
}

pub struct AuthPipeline {
    cache: InMemoryAuthCache,
    tag_cache: Arc<TagCache>,
    local_list_path: Option<String>,
    local_auth_list_enabled: bool,
    remote: Option<Arc<dyn RemoteAuthorizer>>,
    offline_policy: OfflinePolicy,
}

impl AuthPipeline {
    pub fn new(
        tag_cache: Arc<TagCache>,
        local_list_path: Option<String>,
        local_auth_list_enabled: bool,
        remote: Option<Arc<dyn RemoteAuthorizer>>,
        offline_policy: OfflinePolicy,
    ) -> Self {
        Self {
            cache: InMemoryAuthCache::new(),
            tag_cache,
            local_list_path,
            local_auth_list_enabled,
            remote,
            offline_policy,
        }
    }

    /// A pipeline with no local list and no remote authorizer, used where
    /// only the offline-fallback tail can ever decide (tests, stations
    /// with `remoteAuthorization=false` and no tag file configured).
    pub fn new_offline_only() -> Self {
        Self::new(Arc::new(TagCache::new()), None, false, None, OfflinePolicy::default())
    }

    /// Synchronous local-only check: Cache then LocalList, skipping
    /// Remote. Used by handlers that must reply without a network round
    /// trip, e.g. RemoteStart's local-list gate (spec.md §4.E).
    pub fn check_local(&self, identifier: &str) -> AuthDecision {
        if let Some(cached) = self.cache.get(identifier) {
            debug!(identifier, "auth cache hit (local check)");
            return cached;
        }
        if self.local_auth_list_enabled {
            if let Some(path) = &self.local_list_path {
                if self.tag_cache.contains(path, identifier) {
                    let decision = AuthDecision::accepted();
                    self.cache.put(identifier, decision.clone());
                    return decision;
                }
            }
        }
        AuthDecision::invalid("not found in local list")
    }

    /// Full chain: Cache -> LocalList -> Remote -> OfflineFallback
    /// (spec.md §4.G).
    pub async fn evaluate(&self, request: &AuthRequest) -> AuthDecision {
        let identifier = request.identifier.value.as_str();

        if let Some(cached) = self.cache.get(identifier) {
            debug!(identifier, "auth cache hit");
            return cached;
        }

        if self.local_auth_list_enabled {
            if let Some(path) = &self.local_list_path {
                if self.tag_cache.contains(path, identifier) {
                    let decision = AuthDecision::accepted();
                    self.cache.put(identifier, decision.clone());
                    return decision;
                }
            }
        }

        if let Some(remote) = &self.remote {
            let decision = remote.authorize_remote(identifier).await;
            if decision.is_terminal_non_invalid() {
                self.cache.put(identifier, decision.clone());
                return decision;
            }
        }

        // OfflineFallback is the tail: its result is returned as-is even
        // when it is Invalid (spec.md §4.G).
        if request.allow_offline
            && (self.offline_policy.allow_offline_tx_for_unknown_id || self.offline_policy.local_authorize_offline)
        {
            let mut decision = AuthDecision::accepted();
            decision.is_offline = true;
            decision
        } else {
            AuthDecision::invalid("no strategy could authorize identifier while offline")
        }
    }

    pub fn cache_statistics(&self) -> crate::auth::cache_strategy::CacheStatistics {
        self.cache.statistics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::unified::{AuthContext, AuthStatus, IdentifierType, UnifiedIdentifier};
    use crate::protocol::version::OcppVersion;

    fn request(id: &str, allow_offline: bool) -> AuthRequest {
        AuthRequest {
            identifier: UnifiedIdentifier {
                value: id.to_string(),
                id_type: IdentifierType::IdTag,
                ocpp_version: OcppVersion::V16,
                parent_id: None,
                additional_info: None,
            },
            connector_id: 1,
            context: AuthContext::TransactionStart,
            transaction_id: None,
            allow_offline,
        }
    }

    #[tokio::test]
    async fn offline_fallback_accepts_when_policy_allows() {
        let pipeline = AuthPipeline::new(
            Arc::new(TagCache::new()),
            None,
            false,
            None,
            OfflinePolicy {
                allow_offline_tx_for_unknown_id: true,
                local_authorize_offline: false,
            },
        );
        let decision = pipeline.evaluate(&request("UNKNOWN", true)).await;
        assert_eq!(decision.status, AuthStatus::Accepted);
        assert!(decision.is_offline);
    }

    #[tokio::test]
    async fn offline_fallback_rejects_without_offline_allowance() {
        let pipeline = AuthPipeline::new_offline_only();
        let decision = pipeline.evaluate(&request("UNKNOWN", false)).await;
        assert_eq!(decision.status, AuthStatus::Invalid);
    }
}
