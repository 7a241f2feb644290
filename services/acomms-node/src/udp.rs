//! UDP transport to relay daemons

use acomms_c2_router::AcousticTransport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Sends frames as single datagrams to each relay's configured endpoint
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    endpoints: BTreeMap<String, SocketAddr>,
}

impl UdpTransport {
    /// Parse `relay name -> host:port` pairs
    pub fn new(socket: Arc<UdpSocket>, endpoints: &BTreeMap<String, String>) -> Result<Self> {
        let endpoints = endpoints
            .iter()
            .map(|(name, addr)| {
                let parsed = addr
                    .parse::<SocketAddr>()
                    .with_context(|| format!("invalid endpoint {addr:?} for relay {name}"))?;
                Ok((name.clone(), parsed))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self { socket, endpoints })
    }

    pub fn relays(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }
}

#[async_trait]
impl AcousticTransport for UdpTransport {
    async fn send_raw(&self, bytes: &[u8], gateway: &str) -> bool {
        let Some(addr) = self.endpoints.get(gateway) else {
            tracing::warn!(gateway, "no endpoint configured for relay");
            return false;
        };
        match self.socket.send_to(bytes, addr).await {
            Ok(sent) => sent == bytes.len(),
            Err(e) => {
                tracing::warn!(gateway, %addr, error = %e, "datagram send failed");
                false
            }
        }
    }
}
