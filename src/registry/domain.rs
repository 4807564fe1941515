//! Inventario de servicios del barramento.
//!
//! Mapea nombre de servicio → payload opaco (bytecode en base64). Los workers de
//! procesamiento de todos los protocolos acceden en paralelo; `DashMap` garantiza
//! operaciones atómicas por clave.


use dashmap::DashMap;
use tracing::info;


#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, String>,
}


impl ServiceRegistry {
    pub fn new() -> Self {
        Self { services: DashMap::new() }
    }

    /// Registra o sobrescribe un servicio.
    pub fn put(&self, name: &str, bytecode: &str) {
        self.services.insert(name.to_string(), bytecode.to_string());
        info!("Info: servicio '{}' registrado", name);
    }

    /// Elimina un servicio. No hace nada si no existe.
    pub fn remove(&self, name: &str) {
        if self.services.remove(name).is_some() {
            info!("Info: servicio '{}' removido", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.services.get(name).map(|entry| entry.value().clone())
    }

    /// Nombres registrados, ordenados alfabéticamente.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Texto legible con el inventario, usado en la respuesta de `LISTAR_SERVICOS`.
    pub fn describe(&self) -> String {
        let names = self.list_names();
        if names.is_empty() {
            return "Nenhum serviço disponível.".to_string();
        }

        let lines: Vec<String> = names.iter().map(|name| format!("    - {name}")).collect();
        format!("Serviços disponíveis: \n{}", lines.join("\n"))
    }
}
