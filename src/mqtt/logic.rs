//! Adaptador MQTT.
//!
//! El barramento se conecta como cliente a un broker externo, se suscribe al
//! tópico de entrada y publica cada mensaje saliente en el tópico igual a su
//! destino. El event loop de `rumqttc` corre en una tarea propia que además
//! entrega los mensajes recibidos al worker de recepción.
//!
//! Esa tarea es la única que vacía la cola de requests del cliente, por lo que
//! nunca espera espacio en ella: el rechazo de un mensaje se publica con
//! `try_publish`.


use std::sync::Arc;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};
use crate::config::mqtt::{DISCONNECT_GRACE, KEEP_ALIVE, MAX_PACKET_SIZE, REQUEST_CAPACITY, RETRY_DELAY};
use crate::message::domain::Message;
use crate::protocol::domain::{BoxFuture, Protocol, TransportError};
use crate::system::domain::System;
use crate::worker::domain::{Inbound, ReceptionWorker};
use crate::worker::logic::admit;


pub struct MqttProtocol {
    client: AsyncClient,
    topic: String,
}


impl MqttProtocol {

    /// Crea el cliente sin conectarlo; la conexión ocurre al hacer `poll` del event loop.
    pub fn new(system: &System) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(&system.mqtt_client_id, &system.mqtt_host, system.mqtt_port);
        options
            .set_keep_alive(KEEP_ALIVE)
            .set_clean_session(true)
            .set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let protocol = Self { client, topic: system.mqtt_topic.clone() };
        (protocol, eventloop)
    }

    /// Decodifica un payload recibido y lo entrega al barramento.
    fn handle_payload(&self, payload: &[u8], inbox: &ReceptionWorker) {
        let text = String::from_utf8_lossy(payload);
        info!("Info: mensaje recibido vía MQTT: {}", text);

        let msg = match Message::from_json(&text) {
            Ok(msg) => msg,
            Err(e) => {
                error!("Error: mensaje MQTT inválido: {}", e);
                return;
            }
        };

        if let Inbound::Rejected(reply) = admit(inbox, msg) {
            if let Err(e) = self.publish_now(&reply) {
                error!("Error: no se pudo enviar ERRO_ENVIO a '{}': {}", reply.destination(), e);
            }
        }
    }

    /// Publica sin esperar espacio en la cola de requests; si está llena, falla.
    fn publish_now(&self, message: &Message) -> Result<(), TransportError> {
        let json = message.to_json()?;
        self.client
            .try_publish(message.destination(), QoS::AtLeastOnce, false, json.into_bytes())
            .map_err(|e| TransportError::Client(e.to_string()))
    }
}


impl Protocol for MqttProtocol {

    fn send<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let json = message.to_json()?;
            self.client
                .publish(message.destination(), QoS::AtLeastOnce, false, json.clone().into_bytes())
                .await
                .map_err(|e| TransportError::Client(e.to_string()))?;
            debug!("Debug: mensaje publicado en '{}': {}", message.destination(), json);
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.client
                .disconnect()
                .await
                .map_err(|e| TransportError::Client(e.to_string()))?;
            info!("Info: cliente MQTT desconectado");
            Ok(())
        })
    }
}


#[instrument(name = "mqtt_receiver", skip_all)]
async fn run_mqtt_receiver(protocol: Arc<MqttProtocol>,
                           mut eventloop: EventLoop,
                           inbox: ReceptionWorker) {

    let stop = inbox.stop_signal();
    let mut disconnected = false;

    loop {
        let event = tokio::select! {
            _ = stop.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Info: cliente MQTT conectado al broker");
                // Con clean session la suscripción se pierde en cada reconexión.
                if let Err(e) = protocol.client.try_subscribe(protocol.topic.as_str(), QoS::AtLeastOnce) {
                    error!("Error: no se pudo suscribir a '{}': {}", protocol.topic, e);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                protocol.handle_payload(&publish.payload, &inbox);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("Debug: DISCONNECT enviado al broker");
                disconnected = true;
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Warning: conexión MQTT perdida: {}", e);
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = sleep(RETRY_DELAY) => {}
                }
            }
        }
    }

    if !disconnected {
        flush_disconnect(&mut eventloop).await;
    }
    info!("Info: receptor MQTT finalizado");
}


/// Sigue atendiendo el event loop hasta que sale el DISCONNECT pedido por
/// `disconnect`, como máximo durante `DISCONNECT_GRACE`.
async fn flush_disconnect(eventloop: &mut EventLoop) {
    let flushed = timeout(DISCONNECT_GRACE, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => return true,
                Ok(_) => {}
                Err(e) => {
                    debug!("Debug: event loop MQTT cerrado antes del DISCONNECT: {}", e);
                    return false;
                }
            }
        }
    })
    .await;

    match flushed {
        Ok(true) => debug!("Debug: DISCONNECT enviado al broker"),
        Ok(false) => {}
        Err(_) => warn!("Warning: DISCONNECT no enviado en {:?}, cerrando la conexión", DISCONNECT_GRACE),
    }
}


/// Crea el adaptador MQTT y lanza su tarea de recepción.
pub fn start_mqtt(system: &System, inbox: ReceptionWorker) -> (Arc<MqttProtocol>, JoinHandle<()>) {
    info!("Info: iniciando adaptador MQTT hacia {}:{}", system.mqtt_host, system.mqtt_port);

    let (protocol, eventloop) = MqttProtocol::new(system);
    let protocol = Arc::new(protocol);
    let task = tokio::spawn(run_mqtt_receiver(protocol.clone(), eventloop, inbox));
    (protocol, task)
}
