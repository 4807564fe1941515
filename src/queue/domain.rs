//! Cola FIFO de mensajes compartida por el par de workers de un protocolo.
//!
//! Se apoya en un canal `mpsc` sin límite de capacidad: `push` nunca bloquea y
//! `pop` suspende la tarea hasta que haya un mensaje. El cierre se señaliza con un
//! `CancellationToken`, de modo que un consumidor bloqueado en `pop` despierta en
//! cuanto se llama a `close`, aunque no lleguen más mensajes.


use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use crate::message::domain::Message;


#[derive(Debug)]
pub struct MessageQueue {
    tx: mpsc::UnboundedSender<Message>,
    rx: Mutex<mpsc::UnboundedReceiver<Message>>,
    closed: CancellationToken,
}


impl MessageQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        Self {
            tx,
            rx: Mutex::new(rx),
            closed: CancellationToken::new(),
        }
    }

    /// Agrega un mensaje al final de la cola.
    ///
    /// Después de `close` el mensaje se descarta.
    pub fn push(&self, msg: Message) {
        if self.is_closed() {
            debug!("Debug: cola cerrada, mensaje de '{}' descartado", msg.origin());
            return;
        }
        if self.tx.send(msg).is_err() {
            error!("Error: no se pudo agregar el mensaje a la cola");
        }
    }

    /// Espera el siguiente mensaje en orden FIFO.
    ///
    /// Devuelve `None` una vez cerrada la cola, incluso si quedaban mensajes pendientes.
    /// Varios consumidores concurrentes se serializan sobre el receptor.
    pub async fn pop(&self) -> Option<Message> {
        let mut rx = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return None,
            rx = self.rx.lock() => rx,
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            msg = rx.recv() => msg,
        }
    }

    /// Cierra la cola y despierta a cualquier consumidor bloqueado en `pop`.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}


impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use serde_json::Map;
    use tokio::time::timeout;

    fn msg(n: usize) -> Message {
        Message::new("ENVIAR_MENSAGEM", format!("cliente_{n}"), "servidor", Map::new())
    }

    #[tokio::test]
    async fn pops_in_push_order() {
        let queue = MessageQueue::new();
        for n in 1..=3 {
            queue.push(msg(n));
        }

        for n in 1..=3 {
            let popped = queue.pop().await.unwrap();
            assert_eq!(popped.origin(), format!("cliente_{n}"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_producer_keeps_order_and_loses_nothing() {
        let queue = Arc::new(MessageQueue::new());
        let producer_queue = queue.clone();

        let producer = tokio::spawn(async move {
            for n in 0..500 {
                producer_queue.push(msg(n));
                if n % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });

        for n in 0..500 {
            let popped = timeout(Duration::from_secs(5), queue.pop()).await.unwrap().unwrap();
            assert_eq!(popped.origin(), format!("cliente_{n}"));
        }
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn pop_waits_until_a_message_arrives() {
        let queue = Arc::new(MessageQueue::new());
        let consumer_queue = queue.clone();
        let consumer = tokio::spawn(async move { consumer_queue.pop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.push(msg(7));
        let popped = timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert_eq!(popped.unwrap().origin(), "cliente_7");
    }

    #[tokio::test]
    async fn close_unblocks_a_waiting_consumer() {
        let queue = Arc::new(MessageQueue::new());
        let consumer_queue = queue.clone();
        let consumer = tokio::spawn(async move { consumer_queue.pop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let popped = timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert!(popped.is_none());
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn push_after_close_is_dropped() {
        let queue = MessageQueue::new();
        queue.close();
        queue.push(msg(1));
        assert!(queue.pop().await.is_none());
    }
}
