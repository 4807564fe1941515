//! Contrato de los adaptadores de transporte.
//!
//! El barramento no conoce MQTT ni CoAP: sólo ve un objeto capaz de enviar un
//! [`Message`], desconectarse y dar un nombre para logs. Los futuros van en
//! `Box` para poder guardar los adaptadores como `Arc<dyn Protocol>` en la tabla
//! de preferencias.


use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use crate::message::domain::Message;


pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;


pub trait Protocol: Send + Sync {

    /// Nombre para logs. Por defecto, el nombre corto del tipo que implementa el trait.
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    fn send<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<(), TransportError>>;

    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransportError>>;
}


fn short_type_name(full: &'static str) -> &'static str {
    full.rsplit("::").next().unwrap_or(full)
}


/// Fallas de un adaptador al enviar o desconectar.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no se pudo serializar el mensaje: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("error de I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("destino inválido: '{0}'")]
    InvalidDestination(String),

    #[error("error del cliente: {0}")]
    Client(String),

    #[error("sin respuesta de '{0}'")]
    Timeout(String),
}
