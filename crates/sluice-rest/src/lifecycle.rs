use std::time::{Duration, Instant};

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::client::RestClient;
use crate::error::RestError;
use crate::supervise::Tunnel;

/// Build metadata reported alongside a creation request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Metadata {
    pub release: String,
    pub git_version: String,
    pub build: String,
    pub platform: String,
    pub hostname: String,
    pub no_file_limit: u64,
    pub command: String,
}

/// A tunnel creation request. Immutable once submitted.
#[derive(Debug, Clone, Default)]
pub struct TunnelRequest {
    /// Optional tunnel name; jobs use a named tunnel only by explicitly
    /// providing it.
    pub tunnel_identifier: Option<String>,
    /// Domains served by the tunnel. Left empty together with the name, the
    /// client substitutes its configured default domain.
    pub domain_names: Vec<String>,
    /// Domains whose requests bypass the tunnel.
    pub direct_domains: Vec<String>,
    /// Requests matching these patterns are dropped instantly.
    pub fast_fail_regexps: Vec<String>,
    pub no_proxy_caching: bool,
    /// Let sub-accounts of the owner use the tunnel.
    pub shared_tunnel: bool,
    pub vm_version: Option<String>,
    /// Domains that must not be SSL re-encrypted.
    pub no_ssl_bump_domains: Vec<String>,
    /// Free-form extra feature flags, as a JSON document.
    pub extra_info: Option<String>,
    pub kgp_port: u16,
    pub metadata: Metadata,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    tunnel_identifier: Option<&'a str>,
    domain_names: &'a [String],
    metadata: &'a Metadata,
    ssh_port: u16,
    no_proxy_caching: bool,
    use_kgp: bool,
    fast_fail_regexps: &'a [String],
    direct_domains: &'a [String],
    shared_tunnel: bool,
    vm_version: Option<&'a str>,
    no_ssl_bump_domains: &'a [String],
    extra_info: Option<&'a str>,
}

impl<'a> WireRequest<'a> {
    fn build(request: &'a TunnelRequest, default_domain: &'a String) -> Self {
        Self {
            tunnel_identifier: request.tunnel_identifier.as_deref(),
            domain_names: effective_domains(request, default_domain),
            metadata: &request.metadata,
            ssh_port: request.kgp_port,
            no_proxy_caching: request.no_proxy_caching,
            use_kgp: true,
            fast_fail_regexps: &request.fast_fail_regexps,
            direct_domains: &request.direct_domains,
            shared_tunnel: request.shared_tunnel,
            vm_version: request.vm_version.as_deref(),
            no_ssl_bump_domains: &request.no_ssl_bump_domains,
            extra_info: request.extra_info.as_deref(),
        }
    }
}

fn effective_domains<'a>(request: &'a TunnelRequest, default_domain: &'a String) -> &'a [String] {
    let unnamed = request
        .tunnel_identifier
        .as_deref()
        .unwrap_or("")
        .is_empty();
    if unnamed && request.domain_names.is_empty() {
        std::slice::from_ref(default_domain)
    } else {
        &request.domain_names
    }
}

/// Effective remote state of a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Running,
    Halting,
    Terminated,
    UserShutdown,
}

/// One status poll's snapshot. Never cached beyond one poll cycle.
#[derive(Debug, Clone)]
pub struct TunnelStatus {
    /// Effective status string; a set `user_shutdown` flag overrides the
    /// literal value reported by the service.
    pub status: String,
    /// Host serving the tunnel, assigned once it is running.
    pub host: Option<String>,
}

impl TunnelStatus {
    pub fn state(&self) -> TunnelState {
        match self.status.as_str() {
            "running" => TunnelState::Running,
            "halting" => TunnelState::Halting,
            "user shutdown" => TunnelState::UserShutdown,
            _ => TunnelState::Terminated,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == TunnelState::Running
    }
}

#[derive(Deserialize)]
struct WireStatus {
    status: String,
    #[serde(default)]
    user_shutdown: Option<bool>,
    #[serde(default)]
    host: Option<String>,
}

impl From<WireStatus> for TunnelStatus {
    fn from(wire: WireStatus) -> Self {
        let status = if wire.user_shutdown.unwrap_or(false) {
            "user shutdown".to_string()
        } else {
            wire.status
        };
        TunnelStatus {
            status,
            host: wire.host,
        }
    }
}

impl RestClient {
    /// Create a tunnel and wait for it to come up within `timeout`.
    ///
    /// The status is checked once immediately and then once per second. On
    /// success the returned handle carries the assigned host and its
    /// supervision loop is already running; on [`RestError::Timeout`] no
    /// supervision is started and the remote record, which may still exist,
    /// is the caller's to clean up.
    pub async fn create(
        &self,
        request: &TunnelRequest,
        timeout: Duration,
    ) -> Result<Tunnel, RestError> {
        let id = self.submit(request).await?;
        tracing::info!(%id, "tunnel record created, waiting for it to come up");
        let status = self.wait_for_running(&id, timeout).await?;
        Ok(Tunnel::start(self.clone(), id, status.host))
    }

    async fn submit(&self, request: &TunnelRequest) -> Result<String, RestError> {
        #[derive(Deserialize)]
        struct Created {
            id: String,
        }

        let doc = WireRequest::build(request, &self.default_domain);
        let body = self.encode(&doc)?;
        let bytes = self
            .execute(
                Method::POST,
                &format!("/{}/tunnels", self.username),
                Some(body),
            )
            .await?;
        let created: Created = self.decode(&bytes)?;
        Ok(created.id)
    }

    async fn wait_for_running(
        &self,
        id: &str,
        timeout: Duration,
    ) -> Result<TunnelStatus, RestError> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.status(id).await?;
            if status.is_running() {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                return Err(RestError::Timeout {
                    id: id.to_string(),
                    timeout,
                });
            }
            sleep(Duration::from_secs(1)).await;
        }
    }

    /// Fetch the current status record of tunnel `id`.
    pub async fn status(&self, id: &str) -> Result<TunnelStatus, RestError> {
        let wire: WireStatus = self
            .get_json(&format!("/{}/tunnels/{}", self.username, id))
            .await?;
        Ok(wire.into())
    }

    /// Shut down tunnel `id`.
    ///
    /// With `wait_for_jobs` the remote side lets in-flight jobs finish
    /// first. Returns the number of jobs that were still running at the
    /// moment of the call; informational, not an error even when non-zero.
    pub async fn shutdown(&self, id: &str, wait_for_jobs: bool) -> Result<u64, RestError> {
        #[derive(Deserialize)]
        struct Removed {
            #[serde(default)]
            jobs_running: u64,
        }

        let path = if wait_for_jobs {
            format!("/{}/tunnels/{}?wait_for_jobs=1", self.username, id)
        } else {
            format!("/{}/tunnels/{}", self.username, id)
        };
        let body = self.execute(Method::DELETE, &path, None).await?;
        if body.is_empty() {
            return Ok(0);
        }
        let removed: Removed = self.decode(&body)?;
        Ok(removed.jobs_running)
    }

    /// Report the local client's liveness for tunnel `id`.
    ///
    /// The response carries nothing useful and is not decoded.
    pub async fn ping(
        &self,
        id: &str,
        connected: bool,
        since_change: Duration,
    ) -> Result<(), RestError> {
        #[derive(Serialize)]
        struct Heartbeat {
            kgp_is_connected: bool,
            kgp_seconds_since_last_status_change: u64,
        }

        let body = self.encode(&Heartbeat {
            kgp_is_connected: connected,
            kgp_seconds_since_last_status_change: since_change.as_secs(),
        })?;
        self.execute(
            Method::POST,
            &format!("/{}/tunnels/{}/connected", self.username, id),
            Some(body),
        )
        .await?;
        Ok(())
    }
}
