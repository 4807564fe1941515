//! Estado central del barramento.
//!
//! El `Bus` es dueño del inventario de servicios y de la tabla de preferencias
//! endpoint → protocolo. Se construye una vez al arrancar y se comparte con
//! `Arc` entre todos los workers de procesamiento.


use std::path::{Path, PathBuf};
use std::sync::Arc;
use dashmap::DashMap;
use tracing::{debug, error, info};
use uuid::Uuid;
use crate::protocol::domain::Protocol;
use crate::registry::domain::ServiceRegistry;


pub struct Bus {
    id: Uuid,
    registry: Arc<ServiceRegistry>,
    pub(super) preferences: DashMap<String, Arc<dyn Protocol>>,
    base_files_dir: PathBuf,
}


impl Bus {
    pub fn new(registry: Arc<ServiceRegistry>, base_files_dir: impl Into<PathBuf>) -> Self {
        let id = Uuid::new_v4();
        debug!("Debug: instancia del barramento creada con id {}", id);
        Self {
            id,
            registry,
            preferences: DashMap::new(),
            base_files_dir: base_files_dir.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Directorio raíz de los archivos base (`ENVIAR_ARQUIVOS_BASE`).
    pub fn base_files_dir(&self) -> &Path {
        &self.base_files_dir
    }

    /// Registra (o reemplaza) el protocolo preferido de un endpoint.
    ///
    /// Sin protocolo no hay cambio de estado: sólo se registra el error.
    pub fn register_endpoint(&self, endpoint: &str, protocol: Option<Arc<dyn Protocol>>) {
        let Some(protocol) = protocol else {
            error!("Error: intento de registrar el endpoint '{}' sin protocolo", endpoint);
            return;
        };

        info!("Info: endpoint '{}' registrado con el protocolo '{}'", endpoint, protocol.name());
        self.preferences.insert(endpoint.to_string(), protocol);
        debug!("Debug: barramento {} con {} endpoints registrados", self.id, self.preferences.len());
    }

    pub fn preferred_protocol(&self, endpoint: &str) -> Option<Arc<dyn Protocol>> {
        self.preferences.get(endpoint).map(|entry| entry.value().clone())
    }
}


impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("id", &self.id)
            .field("endpoints", &self.preferences.len())
            .field("base_files_dir", &self.base_files_dir)
            .finish()
    }
}
