//! Comandos del barramento.
//!
//! Cada acción conocida se decodifica a una variante de [`Command`] validando los
//! campos requeridos del contenido. Una acción desconocida (incluida
//! `ENVIAR_MENSAGEM`) no es un comando: el mensaje se reenvía tal cual.


use thiserror::Error;
use crate::message::domain::{action, Message};


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Registra al origen del mensaje con el protocolo por el que llegó.
    RegisterEndpoint { endpoint: String },
    RegisterService { name: String, bytecode: String },
    RemoveService { name: String },
    SearchService { name: String },
    ListServices,
    SendBaseFiles,
}


impl Command {

    /// Resuelve el comando asociado a la acción del mensaje.
    ///
    /// # Retorno
    /// * `Ok(Some(cmd))`: acción conocida con sus campos válidos.
    /// * `Ok(None)`: acción no reconocida, el mensaje se reenvía.
    /// * `Err(_)`: acción conocida con un campo requerido ausente o que no es texto.
    pub fn decode(msg: &Message) -> Result<Option<Command>, CommandError> {
        let command = match msg.action() {
            action::CADASTRAR_ENDPOINT => Command::RegisterEndpoint {
                endpoint: msg.origin().to_string(),
            },
            action::REGISTRAR_SERVICO => Command::RegisterService {
                name: required(msg, "servico")?,
                bytecode: required(msg, "bytecode")?,
            },
            action::REMOVER_SERVICO => Command::RemoveService {
                name: required(msg, "servico")?,
            },
            action::BUSCAR_SERVICO => Command::SearchService {
                name: required(msg, "servico")?,
            },
            action::LISTAR_SERVICOS => Command::ListServices,
            action::ENVIAR_ARQUIVOS_BASE => Command::SendBaseFiles,
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}


fn required(msg: &Message, field: &'static str) -> Result<String, CommandError> {
    if let Some(text) = msg.content_str(field) {
        return Ok(text.to_string());
    }

    let action = msg.action().to_string();
    if msg.content().contains_key(field) {
        Err(CommandError::NotText { action, field })
    } else {
        Err(CommandError::MissingField { action, field })
    }
}


#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("campo '{field}' requerido por {action} no informado")]
    MissingField { action: String, field: &'static str },

    #[error("campo '{field}' de {action} debe ser texto")]
    NotText { action: String, field: &'static str },
}


/// Fallas al empaquetar los archivos base.
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("archivo base no encontrado: {0}")]
    MissingFile(String),

    #[error("error de I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("error al comprimir: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("tarea de empaquetado interrumpida: {0}")]
    Join(String),
}
