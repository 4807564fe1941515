//! Política de ruteo del barramento.
//!
//! # Algoritmo de `send_message`
//! 1. Si el origen no tiene preferencia, se registra con el protocolo por el que llegó.
//! 2. Se agrega `timestamp_bus_msg_enviada<sufijo>` según el papel del destino.
//! 3. Se envía por el protocolo preferido del destino o, si no tiene, por el de origen.
//! 4. Una falla de envío se registra y el mensaje se descarta (sin reintentos).


use std::sync::Arc;
use dashmap::mapref::entry::Entry;
use tracing::{error, info, instrument, warn};
use crate::bus::domain::Bus;
use crate::message::domain::{role_tag, stage, Message};
use crate::protocol::domain::Protocol;


impl Bus {

    #[instrument(
        name = "send_message",
        skip(self, msg, origin_protocol),
        fields(origin = %msg.origin(), destination = %msg.destination(), action = %msg.action())
    )]
    pub async fn send_message(&self, mut msg: Message, origin_protocol: &Arc<dyn Protocol>) {

        self.register_on_first_contact(msg.origin(), origin_protocol);

        msg.add_timestamp(&role_tag(stage::SENT, msg.destination()));

        let protocol = match self.preferred_protocol(msg.destination()) {
            Some(protocol) => protocol,
            None => {
                warn!("Warning: protocolo de destino no encontrado para '{}', enviando vía protocolo de origen '{}'",
                      msg.destination(), origin_protocol.name());
                origin_protocol.clone()
            }
        };

        match protocol.send(&msg).await {
            Ok(()) => info!("Info: mensaje enviado a '{}' vía '{}'", msg.destination(), protocol.name()),
            Err(e) => error!("Error: falla al enviar mensaje a '{}' vía '{}': {}",
                             msg.destination(), protocol.name(), e),
        }
    }

    fn register_on_first_contact(&self, origin: &str, protocol: &Arc<dyn Protocol>) {
        if let Entry::Vacant(vacant) = self.preferences.entry(origin.to_string()) {
            info!("Info: nuevo endpoint conectado '{}', protocolo '{}' registrado como preferencia",
                  origin, protocol.name());
            vacant.insert(protocol.clone());
        }
    }
}
