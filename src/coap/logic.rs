//! Adaptador CoAP.
//!
//! Servidor UDP que acepta `POST /<COAP_PATH>` con un mensaje JSON y cliente que
//! entrega mensajes salientes a destinos `host:puerto/path` como requests
//! confirmables.
//!
//! # Confiabilidad
//! * El cliente retransmite el request con backoff exponencial (`ACK_TIMEOUT`,
//!   `MAX_RETRANSMIT`) y acepta respuestas piggybacked o separadas; una respuesta
//!   separada confirmable se confirma con un ACK vacío.
//! * El servidor guarda la respuesta de cada request confirmable en un
//!   [`ExchangeCache`] y la repite ante retransmisiones, sin volver a encolar.


use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use coap_lite::{CoapRequest, CoapResponse, ContentFormat, MessageClass, MessageType, Packet, RequestType, ResponseType};
use tokio::net::{lookup_host, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};
use crate::config::coap::{ACK_TIMEOUT, MAX_DATAGRAM_SIZE, MAX_RETRANSMIT, RESPONSE_TIMEOUT};
use crate::message::domain::Message;
use crate::protocol::domain::{BoxFuture, Protocol, TransportError};
use crate::system::domain::System;
use crate::worker::domain::{Inbound, ReceptionWorker};
use crate::worker::logic::admit;
use super::domain::{CoapProtocol, CoapTarget, ExchangeCache};


impl CoapProtocol {

    /// Decide el código de respuesta para un request entrante y, si corresponde,
    /// entrega el mensaje al barramento.
    ///
    /// Un `ENVIAR_MENSAGEM` sin destino se responde 4.00 y devuelve el `ERRO_ENVIO`
    /// que el servidor envía al origen después de responder.
    pub(super) fn handle_request(&self,
                                 request: &CoapRequest<SocketAddr>,
                                 inbox: &ReceptionWorker) -> (ResponseType, Option<Message>) {

        if *request.get_method() != RequestType::Post {
            return (ResponseType::MethodNotAllowed, None);
        }
        if request.get_path().trim_matches('/') != self.path {
            return (ResponseType::NotFound, None);
        }
        if inbox.is_stopped() {
            return (ResponseType::InternalServerError, None);
        }

        let text = String::from_utf8_lossy(&request.message.payload);
        info!("Info: mensaje recibido vía CoAP: {}", text);

        let msg = match Message::from_json(&text) {
            Ok(msg) => msg,
            Err(e) => {
                error!("Error: mensaje CoAP inválido: {}", e);
                return (ResponseType::BadRequest, None);
            }
        };

        match admit(inbox, msg) {
            Inbound::Queued => (ResponseType::Changed, None),
            Inbound::Rejected(reply) => (ResponseType::BadRequest, Some(reply)),
        }
    }
}


enum Reply {
    Response(Packet),
    /// ACK vacío: la respuesta llega después, separada.
    EmptyAck,
}


/// Espera el ACK del request `message_id` o una respuesta con `token`.
///
/// Con `message_id` en `None` sólo se aceptan respuestas separadas.
async fn await_reply(socket: &UdpSocket, message_id: Option<u16>, token: &[u8]) -> Result<Reply, TransportError> {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        let packet = match Packet::from_bytes(&buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Warning: respuesta CoAP ilegible: {}", e);
                continue;
            }
        };

        let kind = packet.header.get_type();
        let same_exchange = message_id == Some(packet.header.message_id);

        match kind {
            MessageType::Reset if same_exchange => {
                return Err(TransportError::Client("request rechazado con RST".to_string()));
            }
            MessageType::Acknowledgement if same_exchange => {
                if packet.header.code == MessageClass::Empty {
                    return Ok(Reply::EmptyAck);
                }
                return Ok(Reply::Response(packet));
            }
            MessageType::Confirmable | MessageType::NonConfirmable if packet.get_token() == token => {
                acknowledge(socket, &packet, peer).await?;
                return Ok(Reply::Response(packet));
            }
            _ => debug!("Debug: datagrama CoAP ajeno descartado"),
        }
    }
}


async fn await_separate(socket: &UdpSocket, token: &[u8]) -> Result<Packet, TransportError> {
    loop {
        if let Reply::Response(packet) = await_reply(socket, None, token).await? {
            return Ok(packet);
        }
    }
}


/// Confirma una respuesta separada confirmable con un ACK vacío.
async fn acknowledge(socket: &UdpSocket, packet: &Packet, peer: SocketAddr) -> Result<(), TransportError> {
    if packet.header.get_type() != MessageType::Confirmable {
        return Ok(());
    }

    let mut ack = Packet::new();
    ack.header.set_type(MessageType::Acknowledgement);
    ack.header.code = MessageClass::Empty;
    ack.header.message_id = packet.header.message_id;

    let bytes = ack.to_bytes().map_err(|e| TransportError::Client(e.to_string()))?;
    socket.send_to(&bytes, peer).await?;
    Ok(())
}


impl Protocol for CoapProtocol {

    fn send<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let destination = message.destination();
            let target = CoapTarget::parse(destination)?;
            let json = message.to_json()?;

            let addr = lookup_host(target.authority())
                .await?
                .next()
                .ok_or_else(|| TransportError::InvalidDestination(destination.to_string()))?;
            let socket = UdpSocket::bind(if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }).await?;

            let message_id = self.message_id.fetch_add(1, Ordering::Relaxed);
            let token = message_id.to_be_bytes().to_vec();
            let mut request: CoapRequest<SocketAddr> = CoapRequest::new();
            request.set_method(RequestType::Post);
            request.set_path(&target.path);
            request.message.header.set_type(MessageType::Confirmable);
            request.message.header.message_id = message_id;
            request.message.set_token(token.clone());
            request.message.set_content_format(ContentFormat::ApplicationJSON);
            request.message.payload = json.into_bytes();

            let bytes = request.message
                .to_bytes()
                .map_err(|e| TransportError::Client(e.to_string()))?;

            let mut wait = ACK_TIMEOUT;
            let mut retransmissions = 0;
            let packet = loop {
                socket.send_to(&bytes, addr).await?;

                match timeout(wait, await_reply(&socket, Some(message_id), &token)).await {
                    Ok(Ok(Reply::Response(packet))) => break packet,
                    Ok(Ok(Reply::EmptyAck)) => {
                        debug!("Debug: '{}' confirmó el request, esperando respuesta separada", destination);
                        break timeout(RESPONSE_TIMEOUT, await_separate(&socket, &token))
                            .await
                            .map_err(|_| TransportError::Timeout(destination.to_string()))??;
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(_) if retransmissions < MAX_RETRANSMIT => {
                        retransmissions += 1;
                        wait *= 2;
                        debug!("Debug: sin ACK de '{}', retransmisión {}/{}", destination, retransmissions, MAX_RETRANSMIT);
                    }
                    Err(_) => return Err(TransportError::Timeout(destination.to_string())),
                }
            };

            let response = CoapResponse { message: packet };
            match response.get_status() {
                ResponseType::Created | ResponseType::Changed | ResponseType::Content | ResponseType::Valid => {
                    debug!("Debug: '{}' respondió {:?}", destination, response.get_status());
                }
                status => warn!("Warning: '{}' respondió {:?}", destination, status),
            }
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.stop.cancel();
            info!("Info: servidor CoAP detenido");
            Ok(())
        })
    }
}


#[instrument(name = "coap_server", skip_all, fields(addr = %protocol.local_addr))]
async fn run_coap_server(protocol: Arc<CoapProtocol>, socket: UdpSocket, inbox: ReceptionWorker) {
    let stop = inbox.stop_signal();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut exchanges = ExchangeCache::new();

    loop {
        let (len, peer) = tokio::select! {
            _ = stop.cancelled() => break,
            _ = protocol.stop.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    error!("Error: fallo al recibir datagrama CoAP: {}", e);
                    continue;
                }
            },
        };

        let packet = match Packet::from_bytes(&buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Warning: datagrama CoAP inválido de {}: {}", peer, e);
                continue;
            }
        };

        let confirmable = packet.header.get_type() == MessageType::Confirmable;
        let message_id = packet.header.message_id;

        if confirmable {
            if let Some(cached) = exchanges.get(peer, message_id, Instant::now()) {
                debug!("Debug: request {} de {} repetido, reenviando respuesta", message_id, peer);
                if let Err(e) = socket.send_to(cached, peer).await {
                    error!("Error: no se pudo responder a {}: {}", peer, e);
                }
                continue;
            }
        }

        let mut request = CoapRequest::from_packet(packet, peer);
        let (status, rejection) = protocol.handle_request(&request, &inbox);

        // ACK y RST no llevan respuesta.
        if let Some(response) = request.response.as_mut() {
            response.set_status(status);

            match response.message.to_bytes() {
                Ok(bytes) => {
                    if let Err(e) = socket.send_to(&bytes, peer).await {
                        error!("Error: no se pudo responder a {}: {}", peer, e);
                    }
                    if confirmable {
                        exchanges.insert(peer, message_id, bytes, Instant::now());
                    }
                }
                Err(e) => error!("Error: no se pudo codificar la respuesta CoAP: {}", e),
            }
        }

        if let Some(reply) = rejection {
            let protocol = protocol.clone();
            tokio::spawn(async move {
                if let Err(e) = protocol.send(&reply).await {
                    error!("Error: no se pudo enviar ERRO_ENVIO a '{}': {}", reply.destination(), e);
                }
            });
        }
    }

    info!("Info: servidor CoAP finalizado");
}


/// Enlaza el socket del servidor CoAP y lanza su tarea de recepción.
pub async fn start_coap(system: &System, inbox: ReceptionWorker) -> io::Result<(Arc<CoapProtocol>, JoinHandle<()>)> {
    let socket = UdpSocket::bind(system.coap_bind.as_str()).await?;
    let protocol = Arc::new(CoapProtocol::new(&system.coap_path, socket.local_addr()?));
    info!("Info: servidor CoAP escuchando en {}/{}", protocol.local_addr(), protocol.path());

    let task = tokio::spawn(run_coap_server(protocol.clone(), socket, inbox));
    Ok((protocol, task))
}
