//! Contexto de aplicación (estado compartido).
//!
//! Agrupa los recursos que comparten los adaptadores y sus workers: el `Bus`
//! (con su registro de servicios) y la configuración del proceso.


use std::sync::Arc;
use crate::bus::domain::Bus;
use crate::registry::domain::ServiceRegistry;
use crate::system::domain::System;


#[derive(Clone, Debug)]
pub struct AppContext {
    pub bus: Arc<Bus>,
    pub system: Arc<System>,
}


impl AppContext {
    pub fn new(system: System) -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        let bus = Arc::new(Bus::new(registry, system.base_files_dir.clone()));
        Self { bus, system: Arc::new(system) }
    }
}
