//! Loops de los workers y ciclo de vida del controlador.
//!
//! # Flujo
//! 1. El adaptador decodifica un mensaje y llama a [`admit`].
//! 2. Un `ENVIAR_MENSAGEM` sin destino vuelve como [`Inbound::Rejected`] y el
//!    adaptador envía el `ERRO_ENVIO` fuera de su loop de recepción; el resto se
//!    marca con `timestamp_bus_msg_recebida<sufijo>` y se encola.
//! 3. El worker de procesamiento desencola y resuelve el [`Command`]:
//!    - comando: marca inicio, ejecuta, marca fin y envía la respuesta por el `Bus`;
//!    - acción desconocida: reenvía el mensaje tal cual;
//!    - campos inválidos: responde `ERRO_PROCESSAMENTO`.


use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};
use crate::bus::domain::Bus;
use crate::command::domain::Command;
use crate::command::logic::failure_reply;
use crate::config::bus::SHUTDOWN_TIMEOUT;
use crate::message::domain::{role_tag, stage, Message};
use crate::message::logic::reject_missing_destination;
use crate::protocol::domain::Protocol;
use super::domain::{BusController, Inbound, ProcessingWorker, ReceptionWorker};


impl ReceptionWorker {

    /// Marca el timestamp de recepción según el papel del origen y encola el mensaje.
    pub fn enqueue(&self, mut msg: Message) {
        if self.is_stopped() {
            warn!("Warning: worker de recepción detenido, mensaje de '{}' descartado", msg.origin());
            return;
        }
        msg.add_timestamp(&role_tag(stage::RECEIVED, msg.origin()));
        self.queue.push(msg);
        info!("Info: mensaje recibido y agregado a la cola");
    }
}


/// Punto de entrada de los adaptadores para cada mensaje decodificado.
///
/// No hace I/O: encola el mensaje o devuelve la respuesta de rechazo.
pub fn admit(inbox: &ReceptionWorker, msg: Message) -> Inbound {
    match reject_missing_destination(&msg) {
        Some(reply) => Inbound::Rejected(reply),
        None => {
            inbox.enqueue(msg);
            Inbound::Queued
        }
    }
}


impl ProcessingWorker {

    #[instrument(name = "processing_worker", skip(self), fields(protocol = %self.protocol.name()))]
    pub async fn run(self) {
        info!("Info: worker de procesamiento iniciado");

        while let Some(msg) = self.queue.pop().await {
            self.process(msg).await;
        }

        info!("Info: worker de procesamiento finalizado");
    }

    async fn process(&self, mut msg: Message) {
        match Command::decode(&msg) {
            Ok(Some(command)) => {
                msg.add_timestamp(stage::PROCESSING_START);
                let mut reply = command.execute(&msg, &self.bus, &self.protocol).await;
                reply.add_timestamp(stage::PROCESSING_END);
                self.bus.send_message(reply, &self.protocol).await;
                info!("Info: mensaje procesado y enviado");
            }
            Ok(None) => {
                info!("Info: reenviando mensaje de '{}' a '{}'", msg.origin(), msg.destination());
                self.bus.send_message(msg, &self.protocol).await;
            }
            Err(e) => {
                error!("Error: no se pudo construir el comando para '{}': {}", msg.origin(), e);
                let mut reply = failure_reply(&msg, &e);
                reply.add_timestamp(stage::PROCESSING_END);
                self.bus.send_message(reply, &self.protocol).await;
            }
        }
    }
}


impl BusController {

    /// Lanza el worker de procesamiento en una tarea propia.
    pub fn start_workers(&mut self) {
        let worker = ProcessingWorker::new(self.protocol.clone(),
                                           self.bus.clone(),
                                           self.reception.queue.clone());
        self.tasks.push(tokio::spawn(worker.run()));
        info!("Info: workers del protocolo '{}' iniciados", self.protocol.name());
    }

    /// Desconecta el adaptador, detiene ambos workers y espera sus tareas.
    ///
    /// La cola se cierra, por lo que un worker bloqueado en `pop` termina sin
    /// esperar un mensaje nuevo. Una tarea que no termina en `SHUTDOWN_TIMEOUT` se aborta.
    pub async fn stop_workers(&mut self) {
        if let Err(e) = self.protocol.disconnect().await {
            error!("Error: al desconectar '{}': {}", self.protocol.name(), e);
        }

        self.reception.stop();
        self.reception.queue.close();

        for mut task in self.tasks.drain(..) {
            if timeout(SHUTDOWN_TIMEOUT, &mut task).await.is_err() {
                warn!("Warning: tarea de '{}' no terminó a tiempo, abortando", self.protocol.name());
                task.abort();
            }
        }
        info!("Info: workers del protocolo '{}' detenidos", self.protocol.name());
    }
}


/// Crea el controlador de un adaptador y arranca sus workers.
pub fn start_controller(bus: Arc<Bus>,
                        protocol: Arc<dyn Protocol>,
                        reception: ReceptionWorker,
                        receive_task: JoinHandle<()>) -> BusController {

    let mut controller = BusController::new(bus, protocol, reception);
    controller.attach(receive_task);
    controller.start_workers();
    controller
}
