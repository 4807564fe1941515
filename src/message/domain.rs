//! Dominio de Mensajería.
//!
//! Este módulo define la unidad de comunicación que circula por el barramento, tanto
//! en el cable (JSON) como dentro del proceso. Un mensaje declara una acción, su
//! origen, su destino y un contenido semiestructurado que transporta los argumentos
//! de los comandos y un sub-documento `metadata` con timestamps.
//!


use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};


/// Clave del sub-documento de timestamps dentro de `conteudo`.
pub const METADATA_KEY: &str = "metadata";


/// Acciones conocidas por el barramento y etiquetas de respuesta.
pub mod action {
    pub const CADASTRAR_ENDPOINT: &str = "CADASTRAR_ENDPOINT";
    pub const REGISTRAR_SERVICO: &str = "REGISTRAR_SERVICO";
    pub const REMOVER_SERVICO: &str = "REMOVER_SERVICO";
    pub const BUSCAR_SERVICO: &str = "BUSCAR_SERVICO";
    pub const LISTAR_SERVICOS: &str = "LISTAR_SERVICOS";
    pub const ENVIAR_ARQUIVOS_BASE: &str = "ENVIAR_ARQUIVOS_BASE";
    pub const ENVIAR_MENSAGEM: &str = "ENVIAR_MENSAGEM";

    pub const CONFIRMACAO_CADASTRO: &str = "CONFIRMACAO_CADASTRO";
    pub const CONFIRMACAO_REGISTRO: &str = "CONFIRMACAO_REGISTRO";
    pub const CONFIRMACAO_REMOCAO: &str = "CONFIRMACAO_REMOCAO";
    pub const RESULTADO_BUSCA: &str = "RESULTADO_BUSCA";
    pub const RESULTADO_LISTAGEM: &str = "RESULTADO_LISTAGEM";
    pub const ARQUIVOS_BASE: &str = "ARQUIVOS_BASE";
    pub const ERRO_ENVIO: &str = "ERRO_ENVIO";
    pub const ERRO_CODIFICACAO: &str = "ERRO_CODIFICACAO";
    pub const ERRO_PROCESSAMENTO: &str = "ERRO_PROCESSAMENTO";
}


/// Etiquetas de timestamp agregadas en cada etapa del ciclo de vida.
pub mod stage {
    pub const RECEIVED: &str = "timestamp_bus_msg_recebida";
    pub const SENT: &str = "timestamp_bus_msg_enviada";
    pub const PROCESSING_START: &str = "timestamp_bus_processamento_inicio";
    pub const PROCESSING_END: &str = "timestamp_bus_processamento_fim";
}


/// Mensaje intercambiado entre endpoints y el barramento.
///
/// Los campos son inmutables una vez creado el mensaje; la única mutación
/// permitida es agregar timestamps con [`Message::add_timestamp`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(rename = "acao")]
    action: String,
    #[serde(rename = "origem", default)]
    origin: String,
    #[serde(rename = "destino", default)]
    destination: String,
    #[serde(rename = "conteudo", default)]
    content: Map<String, Value>,
}


impl Message {
    pub fn new(action: impl Into<String>,
               origin: impl Into<String>,
               destination: impl Into<String>,
               content: Map<String, Value>) -> Self {
        Self {
            action: action.into(),
            origin: origin.into(),
            destination: destination.into(),
            content,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn content(&self) -> &Map<String, Value> {
        &self.content
    }

    /// Devuelve el sub-documento `metadata`, si existe y es un objeto.
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.content.get(METADATA_KEY).and_then(Value::as_object)
    }

    /// Lee un campo de texto del contenido.
    pub fn content_str(&self, field: &str) -> Option<&str> {
        self.content.get(field).and_then(Value::as_str)
    }

    /// Agrega el timestamp actual (milisegundos UTC) bajo `tag` en `conteudo.metadata`.
    ///
    /// `metadata` es append-only: una etiqueta ya presente no se sobrescribe y un
    /// `metadata` que no sea objeto no se toca. Devuelve `true` si se agregó la entrada.
    pub fn add_timestamp(&mut self, tag: &str) -> bool {
        let now = Utc::now().timestamp_millis();

        let metadata = self.content
            .entry(METADATA_KEY)
            .or_insert_with(|| Value::Object(Map::new()));

        let Some(metadata) = metadata.as_object_mut() else {
            warn!("Warning: metadata de '{}' no es un objeto, timestamp '{}' descartado", self.origin, tag);
            return false;
        };

        if metadata.contains_key(tag) {
            debug!("Debug: timestamp '{}' ya presente, se conserva el original", tag);
            return false;
        }

        metadata.insert(tag.to_string(), Value::from(now));
        true
    }
}


/// Papel del endpoint, deducido del identificador por coincidencia de subcadena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
    Embedded,
}


impl Role {

    /// Primera coincidencia en orden fijo: `cliente`, `servidor`, `embarcado`.
    pub fn from_endpoint(endpoint: &str) -> Option<Role> {
        if endpoint.contains("cliente") {
            Some(Role::Client)
        } else if endpoint.contains("servidor") {
            Some(Role::Server)
        } else if endpoint.contains("embarcado") {
            Some(Role::Embedded)
        } else {
            None
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Role::Client => "_cliente",
            Role::Server => "_servidor",
            Role::Embedded => "_embarcado",
        }
    }
}


/// Construye la etiqueta `<stage><sufijo>` para el endpoint dado.
pub fn role_tag(stage: &str, endpoint: &str) -> String {
    let suffix = Role::from_endpoint(endpoint).map(Role::suffix).unwrap_or_default();
    format!("{stage}{suffix}")
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Message {
        let content = json!({
            "servico": "calc",
            "metadata": { "timestamp_envio_cliente": 1_700_000_000_000_i64 }
        });
        Message::new("BUSCAR_SERVICO", "cliente_1", "", content.as_object().cloned().unwrap())
    }

    #[test]
    fn json_round_trip_keeps_all_fields() {
        let msg = sample();
        let json = msg.to_json().unwrap();
        let back = Message::from_json(&json).unwrap();

        assert_eq!(back, msg);
        assert_eq!(back.metadata().unwrap()["timestamp_envio_cliente"], 1_700_000_000_000_i64);
    }

    #[test]
    fn wire_names_are_portuguese() {
        let value: Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(value["acao"], "BUSCAR_SERVICO");
        assert_eq!(value["origem"], "cliente_1");
        assert_eq!(value["destino"], "");
        assert_eq!(value["conteudo"]["servico"], "calc");
    }

    #[test]
    fn missing_optional_fields_default_to_empty() {
        let msg = Message::from_json(r#"{"acao":"LISTAR_SERVICOS","origem":"x"}"#).unwrap();
        assert_eq!(msg.destination(), "");
        assert!(msg.content().is_empty());
    }

    #[test]
    fn add_timestamp_appends_without_overwriting() {
        let mut msg = sample();
        assert!(msg.add_timestamp(stage::PROCESSING_START));
        let first = msg.metadata().unwrap()[stage::PROCESSING_START].clone();

        assert!(!msg.add_timestamp(stage::PROCESSING_START));
        assert_eq!(msg.metadata().unwrap()[stage::PROCESSING_START], first);
        assert!(msg.metadata().unwrap().contains_key("timestamp_envio_cliente"));
    }

    #[test]
    fn add_timestamp_creates_metadata_when_absent() {
        let mut msg = Message::new("X", "a", "b", Map::new());
        assert!(msg.metadata().is_none());
        assert!(msg.add_timestamp(stage::SENT));
        assert!(msg.metadata().unwrap()[stage::SENT].is_i64());
    }

    #[test]
    fn add_timestamp_leaves_non_object_metadata_alone() {
        let content = json!({ "metadata": "texto" }).as_object().cloned().unwrap();
        let mut msg = Message::new("X", "a", "b", content);
        assert!(!msg.add_timestamp(stage::SENT));
        assert_eq!(msg.content()["metadata"], "texto");
    }

    #[test]
    fn role_suffix_uses_first_match_in_fixed_order() {
        assert_eq!(role_tag(stage::SENT, "cliente_embarcado"), "timestamp_bus_msg_enviada_cliente");
        assert_eq!(role_tag(stage::SENT, "servidor_embarcado"), "timestamp_bus_msg_enviada_servidor");
        assert_eq!(role_tag(stage::RECEIVED, "sensor_embarcado_3"), "timestamp_bus_msg_recebida_embarcado");
        assert_eq!(role_tag(stage::RECEIVED, "192.168.0.8:5683/x"), "timestamp_bus_msg_recebida");
    }
}
