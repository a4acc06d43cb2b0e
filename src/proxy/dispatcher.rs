use crate::error::ProxyError;
use crate::http::message::{is_hop_by_hop, HttpResponse, ParsedRequest};
use crate::pool::{order_candidates, HealthMap, PoolSnapshot, Upstream};
use crate::proxy::observability::ObservableState;
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::{debug, warn};

/// Headers stripped from the buffered client request before it is replayed
/// upstream: the credential headers we're about to replace, `Host` and
/// `Content-Length` (both recomputed for the upstream leg), and the
/// hop-by-hop set from §4.3 (shared with the response path via
/// `is_hop_by_hop` so the two directions can't drift).
fn is_stripped_request_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("authorization")
        || name.eq_ignore_ascii_case("x-api-key")
        || name.eq_ignore_ascii_case("host")
        || name.eq_ignore_ascii_case("content-length")
        || is_hop_by_hop(name)
}

/// Upper bound on redirect hops followed per attempt. The spec requires
/// redirects be followed with the injected credential re-applied on each
/// hop; `reqwest`'s built-in redirect handling strips `Authorization` once
/// the hop crosses hosts, so hops are followed manually here instead, with
/// the credential headers re-applied on every request we issue.
const MAX_REDIRECTS: u8 = 10;

/// The failover loop: tries each candidate from the Scheduler in order,
/// sequentially, until one succeeds or the pool is exhausted.
pub struct Dispatcher {
    client: reqwest::Client,
}

impl Dispatcher {
    /// Builds the shared upstream HTTP client once. Per-attempt timeout is
    /// supplied fresh on every `dispatch()` call (read from the
    /// `ConfigProvider` by the caller) rather than baked in here, so a
    /// config reload takes effect on the very next request without
    /// rebuilding the connection pool.
    pub fn new() -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|e| ProxyError::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }

    /// Runs the full dispatch loop for one buffered request, returning the
    /// response to send to the client.
    pub async fn dispatch(
        &self,
        request: &ParsedRequest,
        snapshot: &PoolSnapshot,
        health: &HealthMap,
        state: &ObservableState,
        request_timeout: Duration,
    ) -> HttpResponse {
        if snapshot.is_empty() {
            return HttpResponse::json_error(503, "No providers configured in proxy pool");
        }

        let candidates = order_candidates(snapshot, health);
        state.set_requesting(true);

        for candidate in &candidates {
            state.set_current_upstream(Some(candidate.clone()));
            let attempt_start = std::time::Instant::now();

            match self.attempt(request, candidate, request_timeout).await {
                Ok(outcome) => {
                    health.record_success(candidate.id);
                    state.record_success(candidate.clone());
                    state.set_requesting(false);
                    record_attempt_metrics(candidate, "success", attempt_start, health.penalty(candidate.id));
                    return outcome;
                }
                Err(reason) => {
                    health.record_failure(candidate.id);
                    record_attempt_metrics(candidate, "soft_failure", attempt_start, health.penalty(candidate.id));
                    warn!(
                        upstream = %candidate.name,
                        reason = %reason,
                        "dispatch: soft failure, advancing to next candidate"
                    );
                }
            }
        }

        state.set_requesting(false);
        state.set_current_upstream(None);
        HttpResponse::json_error(502, "All providers failed")
    }

    /// One dispatch attempt against a single candidate: rewrite, send,
    /// follow redirects, classify. Returns `Ok` only for `Success`; any
    /// `SoftFailure` reason is returned as `Err` so the caller can advance.
    async fn attempt(
        &self,
        request: &ParsedRequest,
        upstream: &Upstream,
        request_timeout: Duration,
    ) -> Result<HttpResponse, String> {
        let mut url = build_target_url(upstream, &request.target)?;
        let method = parse_method(&request.method)?;

        let mut hop = 0u8;
        loop {
            let mut builder = self
                .client
                .request(method.clone(), url.clone())
                .timeout(request_timeout);

            for (name, value) in &request.headers {
                if is_stripped_request_header(name) {
                    continue;
                }
                builder = builder.header(name, value);
            }
            builder = builder
                .header("Authorization", format!("Bearer {}", upstream.credential))
                .header("X-Api-Key", upstream.credential.clone());

            if !request.body.is_empty() {
                builder = builder.body(request.body.clone());
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    "upstream timeout".to_string()
                } else {
                    format!("transport error: {e}")
                }
            })?;

            let status = response.status().as_u16();

            if is_redirect(status) {
                hop += 1;
                if hop > MAX_REDIRECTS {
                    return Err("too many redirects".to_string());
                }
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| "redirect with no Location header".to_string())?;
                url = url
                    .join(location)
                    .map_err(|e| format!("invalid redirect location: {e}"))?;
                debug!(next = %url, "dispatch: following redirect, re-applying credential");
                continue;
            }

            if is_soft_failure_status(status) {
                return Err(format!("upstream status {status}"));
            }

            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).to_string()))
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|e| format!("failed reading upstream body: {e}"))?;

            let http_response = HttpResponse::new(status, body.to_vec()).with_upstream_headers(&headers);
            return Ok(http_response);
        }
    }
}

fn build_target_url(upstream: &Upstream, target: &str) -> Result<reqwest::Url, String> {
    let base = upstream.base_url.trim_end_matches('/');
    let path = if target.starts_with('/') {
        target.to_string()
    } else {
        format!("/{target}")
    };
    reqwest::Url::parse(&format!("{base}{path}")).map_err(|e| format!("invalid target url: {e}"))
}

fn parse_method(method: &str) -> Result<reqwest::Method, String> {
    reqwest::Method::from_bytes(method.as_bytes()).map_err(|e| format!("invalid method: {e}"))
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Classification per §4.5 step 4: transport errors are handled at the call
/// site; this covers the status-code based soft-failure set.
fn is_soft_failure_status(status: u16) -> bool {
    matches!(status, 401 | 403 | 429) || status >= 500
}

fn record_attempt_metrics(upstream: &Upstream, outcome: &'static str, start: std::time::Instant, penalty: i64) {
    metrics::counter!(
        "switchboard_upstream_attempts_total",
        "upstream" => upstream.name.clone(),
        "outcome" => outcome,
    )
    .increment(1);
    metrics::histogram!(
        "switchboard_upstream_attempt_duration_seconds",
        "upstream" => upstream.name.clone(),
    )
    .record(start.elapsed().as_secs_f64());
    metrics::gauge!(
        "switchboard_upstream_penalty",
        "upstream" => upstream.name.clone(),
    )
    .set(penalty as f64);
}
