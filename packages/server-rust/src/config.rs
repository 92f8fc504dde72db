//! Command-line and environment configuration for the `callwired` binary.
//!
//! Every flag has an environment-variable twin so deployments can configure
//! the server either way. The auth token has no default on purpose: a
//! deployment must choose its own secret.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::call::CallConfig;
use crate::network::{NetworkConfig, TlsConfig};
use crate::provider::ProviderConfig;

/// Callwire server: streamed call execution over an OpenAI-compatible provider.
#[derive(Debug, Parser)]
#[command(name = "callwired", version, about)]
pub struct ServerArgs {
    /// Bind address.
    #[arg(long, env = "CALLWIRE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bind port.
    #[arg(long, env = "CALLWIRE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Bearer token clients must present on every non-public route.
    #[arg(long, env = "CALLWIRE_AUTH_TOKEN")]
    pub auth_token: String,

    /// Upstream provider API key. The server boots without one, but stays
    /// not-ready until it is supplied.
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// Upstream provider API root.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Model identifier sent with every provider request.
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    /// Default completion size cap; callers may lower or raise it per call.
    #[arg(long, env = "CALLWIRE_MAX_TOKENS", default_value_t = 512)]
    pub max_tokens: u32,

    /// Sampling temperature for provider requests.
    #[arg(long, env = "CALLWIRE_TEMPERATURE", default_value_t = 0.0)]
    pub temperature: f64,

    /// Relay poll interval in milliseconds.
    #[arg(long, env = "CALLWIRE_STREAM_POLL_MS", default_value_t = 200)]
    pub stream_poll_ms: u64,

    /// Total idle seconds after which a stream synthesizes its timeout error.
    #[arg(long, env = "CALLWIRE_STREAM_TIMEOUT_SECS", default_value_t = 300)]
    pub stream_timeout_secs: u64,

    /// Maximum milestone events retained per session.
    #[arg(long, env = "CALLWIRE_SESSION_BUFFER_MAX", default_value_t = 50)]
    pub session_buffer_max: usize,

    /// Maximum terminal calls retained for late stream attach and replay.
    #[arg(long, env = "CALLWIRE_RETAINED_TERMINAL_MAX", default_value_t = 1024)]
    pub retained_terminal_max: usize,

    /// Timeout for non-streaming requests, in seconds.
    #[arg(long, env = "CALLWIRE_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Maximum accepted request body size in bytes.
    #[arg(long, env = "CALLWIRE_BODY_LIMIT_BYTES", default_value_t = 1_048_576)]
    pub body_limit_bytes: usize,

    /// Allowed CORS origin; repeat for several. `*` allows any.
    #[arg(long = "cors-origin", env = "CALLWIRE_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// TLS certificate path (PEM). Requires `--tls-key`.
    #[arg(long, env = "CALLWIRE_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key path (PEM). Requires `--tls-cert`.
    #[arg(long, env = "CALLWIRE_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, env = "CALLWIRE_LOG_JSON")]
    pub log_json: bool,
}

impl ServerArgs {
    /// Network-layer configuration derived from the arguments.
    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: cert.clone(),
                key_path: key.clone(),
            }),
            _ => None,
        };
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            tls,
            auth_token: self.auth_token.clone(),
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            body_limit_bytes: self.body_limit_bytes,
        }
    }

    /// Call-engine tunables derived from the arguments.
    #[must_use]
    pub fn call_config(&self) -> CallConfig {
        CallConfig {
            stream_poll_interval: Duration::from_millis(self.stream_poll_ms),
            stream_timeout: Duration::from_secs(self.stream_timeout_secs),
            session_buffer_max: self.session_buffer_max,
            retained_terminal_max: self.retained_terminal_max,
        }
    }

    /// Provider configuration derived from the arguments.
    ///
    /// With no API key configured the provider is still constructed (calls
    /// fail upstream with an auth error); readiness reports the gap.
    #[must_use]
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self.openai_api_key.clone().unwrap_or_default(),
            base_url: self.openai_base_url.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Whether an upstream credential was supplied.
    #[must_use]
    pub fn provider_configured(&self) -> bool {
        self.openai_api_key
            .as_deref()
            .is_some_and(|key| !key.is_empty())
    }
}
