use serde_json::{Map, Value};
use tracing::warn;
use crate::config::bus::BUS_ID;
use crate::message::domain::{action, Message, METADATA_KEY};


/// Crea una respuesta del barramento hacia el origen de `request`.
///
/// El sub-documento `metadata` de la petición se copia sin cambios en el contenido
/// de la respuesta, si existe.
pub fn reply_to(request: &Message, reply_action: &str, mut content: Map<String, Value>) -> Message {
    if let Some(metadata) = request.content().get(METADATA_KEY) {
        content.insert(METADATA_KEY.to_string(), metadata.clone());
    }
    Message::new(reply_action, BUS_ID, request.origin(), content)
}


/// Contenido con un único campo de texto.
pub fn single_field(field: &str, value: impl Into<String>) -> Map<String, Value> {
    let mut content = Map::new();
    content.insert(field.to_string(), Value::String(value.into()));
    content
}


/// Detecta un `ENVIAR_MENSAGEM` sin destino antes de encolarlo.
///
/// Devuelve la respuesta `ERRO_ENVIO` que el adaptador debe enviar directamente
/// al origen; el mensaje original no entra en la cola.
pub fn reject_missing_destination(msg: &Message) -> Option<Message> {
    if msg.action() != action::ENVIAR_MENSAGEM || !msg.destination().is_empty() {
        return None;
    }

    warn!("Warning: mensaje de '{}' sin destino, respondiendo ERRO_ENVIO", msg.origin());
    let content = single_field("resultado", "Erro no envio: Destino não informado.");
    Some(Message::new(action::ERRO_ENVIO, BUS_ID, msg.origin(), content))
}
