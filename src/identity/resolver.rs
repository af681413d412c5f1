/// Identity Resolver - whois lookup with forwarded-header fallback
use crate::{
    identity::{
        agent::{AgentError, IdentityAgent},
        IdentityRecord, ResolutionOutcome,
    },
    metrics::Metrics,
};
use axum::http::HeaderMap;
use std::{net::SocketAddr, sync::Arc, time::Duration, time::Instant};
use tracing::debug;

/// Login name asserted by a Tailscale edge proxy
pub const LOGIN_HEADER: &str = "Tailscale-User-Login";
/// Display name asserted by a Tailscale edge proxy
pub const NAME_HEADER: &str = "Tailscale-User-Name";
/// Profile picture URL asserted by a Tailscale edge proxy
pub const PROFILE_PIC_HEADER: &str = "Tailscale-User-Profile-Pic";

const TAGGED_REASON: &str = "tagged node has no user identity";
const UNIDENTIFIED_REASON: &str = "could not identify remote user";

/// Identity resolution configuration
#[derive(Debug, Clone)]
pub struct IdentityResolverConfig {
    /// Upper bound on a single whois call
    pub lookup_timeout: Duration,
}

impl Default for IdentityResolverConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(2),
        }
    }
}

/// Records one lookup latency sample when finished or dropped, whichever
/// comes first
struct LookupTimer<'a> {
    metrics: &'a Metrics,
    started: Option<Instant>,
}

impl<'a> LookupTimer<'a> {
    fn start(metrics: &'a Metrics) -> Self {
        Self {
            metrics,
            started: Some(Instant::now()),
        }
    }

    fn finish(mut self) {
        self.record();
    }

    fn record(&mut self) {
        if let Some(started) = self.started.take() {
            self.metrics
                .observe(started.elapsed().as_secs_f64() * 1000.0);
        }
    }
}

impl Drop for LookupTimer<'_> {
    fn drop(&mut self) {
        self.record();
    }
}

/// Resolves the user behind an inbound request
#[derive(Clone)]
pub struct IdentityResolver {
    agent: Arc<dyn IdentityAgent>,
    metrics: Arc<Metrics>,
    config: IdentityResolverConfig,
}

impl IdentityResolver {
    pub fn new(
        agent: Arc<dyn IdentityAgent>,
        metrics: Arc<Metrics>,
        config: IdentityResolverConfig,
    ) -> Self {
        Self {
            agent,
            metrics,
            config,
        }
    }

    /// Resolve the identity of `peer`
    ///
    /// Resolution order:
    /// 1. Ask the agent (bounded by `lookup_timeout`)
    /// 2. On success, apply policy (tagged nodes and empty logins are rejected)
    /// 3. On failure, fall back to forwarded identity headers when present
    /// 4. Otherwise report the lookup failure
    pub async fn resolve(&self, peer: SocketAddr, headers: &HeaderMap) -> ResolutionOutcome {
        let timer = LookupTimer::start(&self.metrics);
        let lookup = tokio::time::timeout(self.config.lookup_timeout, self.agent.whois(peer))
            .await
            .unwrap_or(Err(AgentError::Timeout));
        timer.finish();

        let (label, outcome) = match lookup {
            Ok(who) if who.is_tagged() => (
                "rejected",
                ResolutionOutcome::Rejected(TAGGED_REASON.to_string()),
            ),
            Ok(who) => match who.user_profile.and_then(|p| {
                IdentityRecord::new(p.login_name, p.display_name)
                    .map(|r| r.with_profile_pic(Some(p.profile_pic_url)))
            }) {
                Some(record) => ("resolved", ResolutionOutcome::Resolved(record)),
                None => (
                    "rejected",
                    ResolutionOutcome::Rejected(UNIDENTIFIED_REASON.to_string()),
                ),
            },
            Err(err) => match forwarded_identity(headers) {
                Some(record) => {
                    debug!(peer = %peer, error = %err, "whois failed, using forwarded identity");
                    ("forwarded", ResolutionOutcome::Resolved(record))
                }
                None => (
                    "unavailable",
                    ResolutionOutcome::Unavailable(format!(
                        "failed to identify remote host: {}",
                        err
                    )),
                ),
            },
        };

        self.metrics.record_resolution(label);
        debug!(
            peer = %peer,
            outcome = label,
            login = outcome.record().map(IdentityRecord::login_name),
            reason = outcome.reason(),
            "identity resolved"
        );
        outcome
    }
}

/// Identity asserted by an upstream Tailscale proxy, if a login is present
///
/// Values are taken verbatim; they are only safe to display once
/// output-encoded.
fn forwarded_identity(headers: &HeaderMap) -> Option<IdentityRecord> {
    let login = header_text(headers, LOGIN_HEADER)?;
    let name = header_text(headers, NAME_HEADER).unwrap_or_default();
    let pic = header_text(headers, PROFILE_PIC_HEADER);
    IdentityRecord::new(login, name).map(|r| r.with_profile_pic(pic))
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::agent::{PeerNode, UserProfile, WhoIs};
    use async_trait::async_trait;
    use axum::http::HeaderValue;

    enum Behaviour {
        Answer(WhoIs),
        Fail,
        Hang,
    }

    struct FakeAgent(Behaviour);

    #[async_trait]
    impl IdentityAgent for FakeAgent {
        async fn whois(&self, _peer: SocketAddr) -> Result<WhoIs, AgentError> {
            match &self.0 {
                Behaviour::Answer(who) => Ok(who.clone()),
                Behaviour::Fail => Err(AgentError::Status {
                    status: 404,
                    body: "peer not found".to_string(),
                }),
                Behaviour::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn who(login: &str, display: &str, tags: Option<Vec<String>>) -> WhoIs {
        WhoIs {
            node: Some(PeerNode {
                name: "peer.tail.ts.net.".to_string(),
                tags,
            }),
            user_profile: Some(UserProfile {
                login_name: login.to_string(),
                display_name: display.to_string(),
                profile_pic_url: String::new(),
            }),
        }
    }

    fn resolver(behaviour: Behaviour) -> (IdentityResolver, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new().unwrap());
        let resolver = IdentityResolver::new(
            Arc::new(FakeAgent(behaviour)),
            Arc::clone(&metrics),
            IdentityResolverConfig {
                lookup_timeout: Duration::from_millis(50),
            },
        );
        (resolver, metrics)
    }

    fn peer() -> SocketAddr {
        "100.64.0.7:41000".parse().unwrap()
    }

    fn forwarded(login: &str, name: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LOGIN_HEADER, HeaderValue::from_str(login).unwrap());
        headers.insert(NAME_HEADER, HeaderValue::from_str(name).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_resolves_user_profile() {
        let (resolver, metrics) = resolver(Behaviour::Answer(who("ada@example.com", "Ada Lovelace", None)));

        let outcome = resolver.resolve(peer(), &HeaderMap::new()).await;
        let record = outcome.record().unwrap();
        assert_eq!(record.login_name(), "ada@example.com");
        assert_eq!(record.display_name(), "Ada Lovelace");
        assert_eq!(metrics.lookup_samples(), 1);
    }

    #[tokio::test]
    async fn test_tagged_node_rejected() {
        let (resolver, metrics) = resolver(Behaviour::Answer(who(
            "ada@example.com",
            "Ada Lovelace",
            Some(vec!["tag:server".to_string()]),
        )));

        // Headers must not rescue a successful lookup
        let outcome = resolver.resolve(peer(), &forwarded("mallory", "M")).await;
        assert_eq!(
            outcome,
            ResolutionOutcome::Rejected("tagged node has no user identity".to_string())
        );
        assert_eq!(metrics.lookup_samples(), 1);
    }

    #[tokio::test]
    async fn test_empty_login_rejected() {
        let (resolver, _) = resolver(Behaviour::Answer(who("", "Nobody", None)));
        let outcome = resolver.resolve(peer(), &HeaderMap::new()).await;
        assert_eq!(
            outcome,
            ResolutionOutcome::Rejected("could not identify remote user".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_profile_rejected() {
        let (resolver, _) = resolver(Behaviour::Answer(WhoIs::default()));
        let outcome = resolver.resolve(peer(), &HeaderMap::new()).await;
        assert!(matches!(outcome, ResolutionOutcome::Rejected(_)));
    }

    #[tokio::test]
    async fn test_lookup_failure_without_headers_is_unavailable() {
        let (resolver, metrics) = resolver(Behaviour::Fail);
        let outcome = resolver.resolve(peer(), &HeaderMap::new()).await;
        assert!(matches!(outcome, ResolutionOutcome::Unavailable(_)));
        assert_eq!(metrics.lookup_samples(), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_uses_forwarded_headers() {
        let (resolver, metrics) = resolver(Behaviour::Fail);
        let outcome = resolver.resolve(peer(), &forwarded("carol", "")).await;
        let record = outcome.record().unwrap();
        assert_eq!(record.login_name(), "carol");
        assert_eq!(record.display_name(), "");
        assert_eq!(metrics.lookup_samples(), 1);
    }

    #[tokio::test]
    async fn test_forwarded_values_are_verbatim() {
        let (resolver, _) = resolver(Behaviour::Fail);
        let outcome = resolver
            .resolve(peer(), &forwarded("dave\"<x>", "Dave \"The\" Tab\tName"))
            .await;
        let record = outcome.record().unwrap();
        assert_eq!(record.login_name(), "dave\"<x>");
        assert_eq!(record.display_name(), "Dave \"The\" Tab\tName");
    }

    #[tokio::test]
    async fn test_empty_login_header_is_ignored() {
        let (resolver, _) = resolver(Behaviour::Fail);
        let outcome = resolver.resolve(peer(), &forwarded("", "Someone")).await;
        assert!(matches!(outcome, ResolutionOutcome::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_hung_agent_times_out() {
        let (resolver, metrics) = resolver(Behaviour::Hang);
        let outcome = resolver.resolve(peer(), &HeaderMap::new()).await;
        match outcome {
            ResolutionOutcome::Unavailable(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected Unavailable, got {:?}", other),
        }
        assert_eq!(metrics.lookup_samples(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_resolution_still_records_once() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let resolver = IdentityResolver::new(
            Arc::new(FakeAgent(Behaviour::Hang)),
            Arc::clone(&metrics),
            IdentityResolverConfig {
                lookup_timeout: Duration::from_secs(60),
            },
        );

        let headers = HeaderMap::new();
        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), resolver.resolve(peer(), &headers))
                .await;
        assert!(cancelled.is_err());
        assert_eq!(metrics.lookup_samples(), 1);
    }

    #[tokio::test]
    async fn test_one_sample_per_call() {
        let (resolver, metrics) = resolver(Behaviour::Fail);
        for _ in 0..5 {
            resolver.resolve(peer(), &forwarded("carol", "")).await;
        }
        assert_eq!(metrics.lookup_samples(), 5);
    }
}
