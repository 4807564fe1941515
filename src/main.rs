use std::sync::Arc;
use tracing::{error, info, warn};
use crate::coap::logic::start_coap;
use crate::context::domain::AppContext;
use crate::mqtt::logic::start_mqtt;
use crate::queue::domain::MessageQueue;
use crate::system::domain::{init_tracing, System};
use crate::worker::domain::ReceptionWorker;
use crate::worker::logic::start_controller;

mod bus;
mod coap;
mod command;
mod config;
mod context;
mod message;
mod mqtt;
mod protocol;
mod queue;
mod registry;
mod system;
mod worker;


#[tokio::main]
async fn main() {

    let system = match System::new() {
        Ok(system) => system,
        Err(e) => {
            // El logging todavía no está configurado.
            eprintln!("Error: configuración inválida: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&system);
    info!("Info: configuración del sistema cargada (entorno: {})", system.environment);

    let context = AppContext::new(system);
    let mut controllers = Vec::new();

    if context.system.mqtt_enabled {
        let inbox = ReceptionWorker::new(Arc::new(MessageQueue::new()));
        let (protocol, receive_task) = start_mqtt(&context.system, inbox.clone());
        controllers.push(start_controller(context.bus.clone(), protocol, inbox, receive_task));
    }

    if context.system.coap_enabled {
        let inbox = ReceptionWorker::new(Arc::new(MessageQueue::new()));
        match start_coap(&context.system, inbox.clone()).await {
            Ok((protocol, receive_task)) => {
                controllers.push(start_controller(context.bus.clone(), protocol, inbox, receive_task));
            }
            Err(e) => error!("Error: no se pudo iniciar el servidor CoAP en {}: {}", context.system.coap_bind, e),
        }
    }

    if controllers.is_empty() {
        warn!("Warning: ningún adaptador activo, finalizando");
        return;
    }

    info!("Info: barramento {} en ejecución con {} adaptador(es)", context.bus.id(), controllers.len());

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Error: no se pudo escuchar la señal de apagado: {}", e);
    }

    info!("Info: apagando barramento");
    for controller in controllers.iter_mut() {
        controller.stop_workers().await;
    }
    info!("Info: barramento detenido");
}
