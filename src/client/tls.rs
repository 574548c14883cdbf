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

//! Client-mode TLS.
//!
//! Built once from the configured PEM CA file and SNI domain; the handshake
//! runs after the TCP connect and every subsequent read and write uses the
//! TLS stream.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::{client, TlsConnector};

use crate::error::{ErrorKind, RpcError, RpcResult};

/// Reusable client-side TLS context: connector plus server name.
pub(crate) struct TlsContext {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl TlsContext {
    /// Builds a context that verifies the server against the CA
    /// certificates in `cert_path` and checks the peer against `domain`.
    pub(crate) fn from_ca_file(cert_path: &Path, domain: &str) -> RpcResult<Self> {
        tracing::info!(cert = %cert_path.display(), domain, "init tls");

        let pem = std::fs::read(cert_path).map_err(|e| {
            RpcError::new(
                ErrorKind::NotConnected,
                format!("failed to read ca file {}: {e}", cert_path.display()),
            )
        })?;
        let certs = rustls_pemfile::certs(&mut &pem[..])
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                RpcError::new(
                    ErrorKind::NotConnected,
                    format!("failed to parse ca file {}: {e}", cert_path.display()),
                )
            })?;

        let mut roots = rustls::RootCertStore::empty();
        for cert in certs {
            roots.add(cert).map_err(|e| {
                RpcError::new(
                    ErrorKind::NotConnected,
                    format!("rejected ca certificate: {e}"),
                )
            })?;
        }

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(domain.to_string()).map_err(|e| {
            RpcError::new(ErrorKind::NotConnected, format!("invalid ssl domain: {e}"))
        })?;

        Ok(Self {
            connector,
            server_name,
        })
    }

    /// Runs the client-mode handshake over a connected TCP stream.
    pub(crate) async fn handshake(&self, stream: TcpStream) -> RpcResult<client::TlsStream<TcpStream>> {
        self.connector
            .connect(self.server_name.clone(), stream)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "tls handshake failed");
                RpcError::new(ErrorKind::NotConnected, format!("tls handshake failed: {e}"))
            })
    }
}
