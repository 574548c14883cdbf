//
// Copyright 2026 the seqrpc authors. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Client configuration.

use std::time::Duration;

#[cfg(feature = "tls")]
use std::path::PathBuf;

/// Default connect and per-call deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for an [`RpcClient`](crate::RpcClient).
///
/// # Examples
///
/// ```rust
/// use seqrpc::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new()
///     .with_client_id(7)
///     .with_endpoint("127.0.0.1", "8801")
///     .with_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Opaque label carried in log events.
    pub client_id: u32,

    /// Deadline for connecting; also the default deadline applied by
    /// the `*_with_timeout` connect variants.
    ///
    /// Default: 5 seconds.
    pub timeout_duration: Duration,

    /// Target host name or address.
    pub host: String,

    /// Target port.
    pub port: String,

    /// PEM file with the CA certificate(s) used to verify the server.
    ///
    /// `None` disables TLS.
    #[cfg(feature = "tls")]
    pub ssl_cert_path: Option<PathBuf>,

    /// Hostname used for SNI and peer verification.
    #[cfg(feature = "tls")]
    pub ssl_domain: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: 0,
            timeout_duration: DEFAULT_TIMEOUT,
            host: String::new(),
            port: String::new(),
            #[cfg(feature = "tls")]
            ssl_cert_path: None,
            #[cfg(feature = "tls")]
            ssl_domain: "localhost".to_string(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the client id used in log events.
    pub fn with_client_id(mut self, client_id: u32) -> Self {
        self.client_id = client_id;
        self
    }

    /// Sets the connect deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_duration = timeout;
        self
    }

    /// Sets the target endpoint.
    pub fn with_endpoint(mut self, host: impl Into<String>, port: impl Into<String>) -> Self {
        self.host = host.into();
        self.port = port.into();
        self
    }

    /// Enables TLS with a PEM CA file and the domain to verify against.
    #[cfg(feature = "tls")]
    pub fn with_tls(mut self, cert_path: impl Into<PathBuf>, domain: impl Into<String>) -> Self {
        self.ssl_cert_path = Some(cert_path.into());
        self.ssl_domain = domain.into();
        self
    }
}
