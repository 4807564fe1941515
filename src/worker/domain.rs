//! Workers por protocolo.
//!
//! Cada adaptador tiene un par de workers que comparten una [`MessageQueue`]:
//! * **Recepción** ([`ReceptionWorker`]): handle clonable que el adaptador usa
//!   desde su propia tarea de recepción para encolar mensajes. Su señal de parada
//!   corta el loop de recepción del adaptador.
//! * **Procesamiento** ([`ProcessingWorker`]): tarea que desencola, ejecuta el
//!   comando correspondiente (o reenvía) y entrega el resultado al [`Bus`].
//!
//! El [`BusController`] agrupa ambos y ofrece `start_workers` / `stop_workers`.


use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::bus::domain::Bus;
use crate::message::domain::Message;
use crate::protocol::domain::Protocol;
use crate::queue::domain::MessageQueue;


/// Resultado de entregar un mensaje entrante al barramento.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Queued,
    /// Descartado antes de la cola; el adaptador debe enviar este `ERRO_ENVIO`
    /// al origen sin bloquear su loop de recepción.
    Rejected(Message),
}


#[derive(Clone, Debug)]
pub struct ReceptionWorker {
    pub(super) queue: Arc<MessageQueue>,
    pub(super) stop: CancellationToken,
}


impl ReceptionWorker {
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        Self { queue, stop: CancellationToken::new() }
    }

    /// Señal que los loops de recepción de los adaptadores observan para terminar.
    pub fn stop_signal(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}


pub struct ProcessingWorker {
    pub(super) protocol: Arc<dyn Protocol>,
    pub(super) bus: Arc<Bus>,
    pub(super) queue: Arc<MessageQueue>,
}


impl ProcessingWorker {
    pub fn new(protocol: Arc<dyn Protocol>, bus: Arc<Bus>, queue: Arc<MessageQueue>) -> Self {
        Self { protocol, bus, queue }
    }
}


pub struct BusController {
    pub(super) protocol: Arc<dyn Protocol>,
    pub(super) bus: Arc<Bus>,
    pub(super) reception: ReceptionWorker,
    pub(super) tasks: Vec<JoinHandle<()>>,
}


impl BusController {
    pub fn new(bus: Arc<Bus>, protocol: Arc<dyn Protocol>, reception: ReceptionWorker) -> Self {
        Self { protocol, bus, reception, tasks: Vec::new() }
    }

    /// Agrega una tarea del adaptador (ej. loop de recepción) que se espera al parar.
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }
}
