use std::path::PathBuf;
use std::sync::Arc;
use serde_json::Value;
use tracing::error;
use crate::bus::domain::Bus;
use crate::command::domain::{Command, CommandError, PackagingError};
use crate::command::files::{locate_base_files, zip_and_encode};
use crate::message::domain::{action, Message};
use crate::message::logic::{reply_to, single_field};
use crate::protocol::domain::Protocol;


impl Command {

    /// Ejecuta el comando contra el barramento y construye la respuesta.
    ///
    /// Siempre devuelve una respuesta dirigida al origen de `msg`; los errores
    /// internos se informan en el campo `erro` del contenido.
    pub async fn execute(&self, msg: &Message, bus: &Bus, protocol: &Arc<dyn Protocol>) -> Message {
        match self {
            Command::RegisterEndpoint { endpoint } => {
                bus.register_endpoint(endpoint, Some(protocol.clone()));
                reply_to(msg, action::CONFIRMACAO_CADASTRO,
                         single_field("resultado", "Endpoint registrado com sucesso."))
            }
            Command::RegisterService { name, bytecode } => {
                bus.registry().put(name, bytecode);
                reply_to(msg, action::CONFIRMACAO_REGISTRO,
                         single_field("resultado", format!("Serviço '{name}' registrado com sucesso.")))
            }
            Command::RemoveService { name } => {
                bus.registry().remove(name);
                reply_to(msg, action::CONFIRMACAO_REMOCAO,
                         single_field("resultado", format!("Serviço '{name}' removido com sucesso.")))
            }
            Command::SearchService { name } => {
                let content = match bus.registry().get(name) {
                    Some(bytecode) => {
                        let mut content = single_field("nome", name.as_str());
                        content.insert("bytecode".to_string(), Value::String(bytecode));
                        content
                    }
                    None => single_field("erro", format!("Serviço {name} não encontrado.")),
                };
                reply_to(msg, action::RESULTADO_BUSCA, content)
            }
            Command::ListServices => {
                reply_to(msg, action::RESULTADO_LISTAGEM, single_field("resultado", bus.registry().describe()))
            }
            Command::SendBaseFiles => send_base_files(msg, bus.base_files_dir().to_path_buf()).await,
        }
    }
}


async fn send_base_files(msg: &Message, root: PathBuf) -> Message {
    let packaged = tokio::task::spawn_blocking(move || {
        let files = locate_base_files(&root)?;
        zip_and_encode(&files)
    })
        .await
        .unwrap_or_else(|e| Err(PackagingError::Join(e.to_string())));

    packaging_reply(msg, packaged)
}


/// Traduce el resultado del empaquetado a la respuesta para el cliente.
///
/// Un archivo faltante es un `ERRO_ENVIO`; cualquier otra falla, `ERRO_CODIFICACAO`.
pub fn packaging_reply(msg: &Message, packaged: Result<String, PackagingError>) -> Message {
    match packaged {
        Ok(encoded) => reply_to(msg, action::ARQUIVOS_BASE, single_field("resposta", encoded)),
        Err(PackagingError::MissingFile(path)) => {
            error!("Error: archivo base '{}' no encontrado, envío abortado", path);
            reply_to(msg, action::ERRO_ENVIO, single_field(
                "erro", "Erro ao encontrar os arquivos de base. Verifique as configurações do barramento."))
        }
        Err(e) => {
            error!("Error: no se pudieron comprimir los archivos base: {}", e);
            reply_to(msg, action::ERRO_CODIFICACAO, single_field(
                "erro", "Erro ao compactar e codificar os arquivos. Verifique as configurações do Barramento."))
        }
    }
}


/// Respuesta genérica cuando un comando no se puede construir o ejecutar.
pub fn failure_reply(msg: &Message, err: &CommandError) -> Message {
    reply_to(msg, action::ERRO_PROCESSAMENTO, single_field("erro", err.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use crate::config::base_files::{MESSAGE_FILE, SERVICE_FILE};
    use crate::protocol::domain::testing::RecordingProtocol;
    use crate::registry::domain::ServiceRegistry;

    fn setup(base_dir: &std::path::Path) -> (Bus, Arc<dyn Protocol>) {
        let bus = Bus::new(Arc::new(ServiceRegistry::new()), base_dir);
        let protocol: Arc<dyn Protocol> = Arc::new(RecordingProtocol::named("mqtt"));
        (bus, protocol)
    }

    fn request(action: &str, content: Value) -> Message {
        Message::new(action, "cliente_a", "barramento", content.as_object().cloned().unwrap_or_default())
    }

    async fn run(bus: &Bus, protocol: &Arc<dyn Protocol>, msg: Message) -> Message {
        let command = Command::decode(&msg).unwrap().unwrap();
        command.execute(&msg, bus, protocol).await
    }

    #[tokio::test]
    async fn service_lifecycle_scenario() {
        let (bus, protocol) = setup(std::path::Path::new("resources/modelos"));

        let listing = run(&bus, &protocol, request("LISTAR_SERVICOS", json!({}))).await;
        assert_eq!(listing.action(), "RESULTADO_LISTAGEM");
        assert_eq!(listing.content_str("resultado"), Some("Nenhum serviço disponível."));

        let registered = run(&bus, &protocol,
                             request("REGISTRAR_SERVICO", json!({ "servico": "calc", "bytecode": "YmFzZTY0" }))).await;
        assert_eq!(registered.action(), "CONFIRMACAO_REGISTRO");

        let found = run(&bus, &protocol, request("BUSCAR_SERVICO", json!({ "servico": "calc" }))).await;
        assert_eq!(found.action(), "RESULTADO_BUSCA");
        assert_eq!(found.content_str("nome"), Some("calc"));
        assert_eq!(found.content_str("bytecode"), Some("YmFzZTY0"));
        assert!(!found.content().contains_key("erro"));

        let removed = run(&bus, &protocol, request("REMOVER_SERVICO", json!({ "servico": "calc" }))).await;
        assert_eq!(removed.action(), "CONFIRMACAO_REMOCAO");

        let missing = run(&bus, &protocol, request("BUSCAR_SERVICO", json!({ "servico": "calc" }))).await;
        assert_eq!(missing.content_str("erro"), Some("Serviço calc não encontrado."));
        assert_eq!(missing.content().len(), 1);
    }

    #[tokio::test]
    async fn removing_absent_service_twice_gives_same_reply() {
        let (bus, protocol) = setup(std::path::Path::new("resources/modelos"));

        let first = run(&bus, &protocol, request("REMOVER_SERVICO", json!({ "servico": "ghost" }))).await;
        let second = run(&bus, &protocol, request("REMOVER_SERVICO", json!({ "servico": "ghost" }))).await;

        assert_eq!(first, second);
        assert_eq!(first.content_str("resultado"), Some("Serviço 'ghost' removido com sucesso."));
    }

    #[tokio::test]
    async fn registering_twice_overwrites_payload() {
        let (bus, protocol) = setup(std::path::Path::new("resources/modelos"));

        run(&bus, &protocol, request("REGISTRAR_SERVICO", json!({ "servico": "calc", "bytecode": "v1" }))).await;
        run(&bus, &protocol, request("REGISTRAR_SERVICO", json!({ "servico": "calc", "bytecode": "v2" }))).await;

        assert_eq!(bus.registry().get("calc").as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn register_endpoint_uses_calling_protocol_and_keeps_metadata() {
        let (bus, protocol) = setup(std::path::Path::new("resources/modelos"));
        let msg = request("CADASTRAR_ENDPOINT", json!({ "metadata": { "timestamp_envio": 10 } }));

        let reply = run(&bus, &protocol, msg).await;

        assert_eq!(reply.action(), "CONFIRMACAO_CADASTRO");
        assert_eq!(reply.origin(), "barramento");
        assert_eq!(reply.destination(), "cliente_a");
        assert_eq!(reply.content()["metadata"], json!({ "timestamp_envio": 10 }));
        assert!(Arc::ptr_eq(&bus.preferred_protocol("cliente_a").unwrap(), &protocol));
    }

    #[tokio::test]
    async fn base_files_are_zipped_into_the_reply() {
        let dir = tempfile::tempdir().unwrap();
        for relative in [MESSAGE_FILE, SERVICE_FILE] {
            let path = dir.path().join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "{}").unwrap();
        }
        let (bus, protocol) = setup(dir.path());

        let reply = run(&bus, &protocol, request("ENVIAR_ARQUIVOS_BASE", json!({}))).await;

        assert_eq!(reply.action(), "ARQUIVOS_BASE");
        assert!(!reply.content_str("resposta").unwrap().is_empty());
    }

    #[tokio::test]
    async fn shipped_base_files_are_found() {
        let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("resources/modelos");
        let (bus, protocol) = setup(&root);

        let reply = run(&bus, &protocol, request("ENVIAR_ARQUIVOS_BASE", json!({}))).await;
        assert_eq!(reply.action(), "ARQUIVOS_BASE");
    }

    #[tokio::test]
    async fn missing_base_files_yield_send_error() {
        let dir = tempfile::tempdir().unwrap();
        let (bus, protocol) = setup(dir.path());

        let reply = run(&bus, &protocol, request("ENVIAR_ARQUIVOS_BASE", json!({}))).await;

        assert_eq!(reply.action(), "ERRO_ENVIO");
        assert!(reply.content().contains_key("erro"));
    }

    #[tokio::test]
    async fn directory_in_place_of_base_file_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(MESSAGE_FILE)).unwrap();
        let service = dir.path().join(SERVICE_FILE);
        std::fs::create_dir_all(service.parent().unwrap()).unwrap();
        std::fs::write(service, "{}").unwrap();
        let (bus, protocol) = setup(dir.path());

        let reply = run(&bus, &protocol, request("ENVIAR_ARQUIVOS_BASE", json!({}))).await;

        assert_eq!(reply.action(), "ERRO_ENVIO");
    }

    fn base_files_request() -> Message {
        request("ENVIAR_ARQUIVOS_BASE", json!({ "metadata": { "timestamp_envio": 7 } }))
    }

    #[test]
    fn packaging_failures_are_encoding_errors_with_metadata() {
        let msg = base_files_request();
        let failures = [
            PackagingError::Io(std::io::Error::other("disco")),
            PackagingError::Zip(zip::result::ZipError::FileNotFound),
            PackagingError::Join("cancelada".to_string()),
        ];

        for failure in failures {
            let cause = failure.to_string();
            let reply = packaging_reply(&msg, Err(failure));

            assert_eq!(reply.action(), "ERRO_CODIFICACAO", "{cause}");
            assert_eq!(reply.destination(), "cliente_a");
            assert!(reply.content_str("erro").is_some(), "{cause}");
            assert_eq!(reply.content()["metadata"], json!({ "timestamp_envio": 7 }));
        }
    }

    #[test]
    fn missing_file_is_a_send_error_with_metadata() {
        let msg = base_files_request();

        let reply = packaging_reply(&msg, Err(PackagingError::MissingFile("mensagem.schema.json".to_string())));

        assert_eq!(reply.action(), "ERRO_ENVIO");
        assert!(reply.content_str("erro").is_some());
        assert_eq!(reply.content()["metadata"], json!({ "timestamp_envio": 7 }));
    }

    #[test]
    fn packaged_files_go_in_resposta() {
        let reply = packaging_reply(&base_files_request(), Ok("UEsDBA==".to_string()));

        assert_eq!(reply.action(), "ARQUIVOS_BASE");
        assert_eq!(reply.content_str("resposta"), Some("UEsDBA=="));
    }

    fn schema_properties(relative: &str) -> Vec<String> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("resources/modelos").join(relative);
        let schema: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let mut keys: Vec<String> = schema["properties"].as_object().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[test]
    fn message_schema_describes_the_wire_format() {
        let wire: Value = serde_json::from_str(&request("LISTAR_SERVICOS", json!({})).to_json().unwrap()).unwrap();
        let mut fields: Vec<String> = wire.as_object().unwrap().keys().cloned().collect();
        fields.sort();

        assert_eq!(schema_properties(MESSAGE_FILE), fields);
    }

    #[tokio::test]
    async fn service_schema_describes_a_registered_service() {
        let (bus, protocol) = setup(std::path::Path::new("resources/modelos"));
        bus.registry().put("calc", "Y2FsYw==");

        let reply = run(&bus, &protocol, request("BUSCAR_SERVICO", json!({ "servico": "calc" }))).await;
        let mut fields: Vec<String> = reply.content().keys().cloned().collect();
        fields.sort();

        assert_eq!(schema_properties(SERVICE_FILE), fields);
    }

    #[test]
    fn failure_reply_carries_the_cause() {
        let msg = Message::new("REGISTRAR_SERVICO", "cliente_a", "", Map::new());
        let err = Command::decode(&msg).unwrap_err();

        let reply = failure_reply(&msg, &err);

        assert_eq!(reply.action(), "ERRO_PROCESSAMENTO");
        assert_eq!(reply.destination(), "cliente_a");
        assert!(reply.content_str("erro").unwrap().contains("servico"));
    }
}
