use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::AtomicU16;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use crate::config::coap::EXCHANGE_LIFETIME;
use crate::protocol::domain::TransportError;


/// Destino CoAP con la forma `host:puerto/path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
}


impl CoapTarget {
    pub fn parse(destination: &str) -> Result<Self, TransportError> {
        let invalid = || TransportError::InvalidDestination(destination.to_string());

        let (authority, path) = destination.split_once('/').ok_or_else(invalid)?;
        let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        let path = path.trim_matches('/');
        if host.is_empty() || path.is_empty() {
            return Err(invalid());
        }

        Ok(Self { host: host.to_string(), port, path: path.to_string() })
    }

    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}


pub struct CoapProtocol {
    pub(super) path: String,
    pub(super) message_id: AtomicU16,
    pub(super) stop: CancellationToken,
    pub(super) local_addr: SocketAddr,
}


impl CoapProtocol {
    pub fn new(path: &str, local_addr: SocketAddr) -> Self {
        Self {
            path: path.trim_matches('/').to_string(),
            message_id: AtomicU16::new(1),
            stop: CancellationToken::new(),
            local_addr,
        }
    }

    /// Dirección efectiva del servidor (útil cuando se enlaza al puerto 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}


/// Respuestas ya enviadas a requests confirmables, por `(peer, message id)`.
///
/// Una retransmisión del mismo request recibe la respuesta guardada sin volver
/// a procesarse. Las entradas vencen tras `EXCHANGE_LIFETIME`.
#[derive(Debug, Default)]
pub struct ExchangeCache {
    entries: HashMap<(SocketAddr, u16), (Instant, Vec<u8>)>,
}


impl ExchangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, peer: SocketAddr, message_id: u16, now: Instant) -> Option<&[u8]> {
        self.purge(now);
        self.entries.get(&(peer, message_id)).map(|(_, response)| response.as_slice())
    }

    pub fn insert(&mut self, peer: SocketAddr, message_id: u16, response: Vec<u8>, now: Instant) {
        self.purge(now);
        self.entries.insert((peer, message_id), (now, response));
    }

    fn purge(&mut self, now: Instant) {
        self.entries.retain(|_, (at, _)| now.saturating_duration_since(*at) < EXCHANGE_LIFETIME);
    }
}
