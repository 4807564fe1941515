pub mod bus {
    use tokio::time::Duration;

    /// Identificador fijo del barramento como remitente de respuestas.
    pub const BUS_ID: &str = "barramento";
    pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
}

pub mod mqtt {
    use tokio::time::Duration;

    pub const RETRY_DELAY: Duration = Duration::from_secs(5);
    pub const KEEP_ALIVE: Duration = Duration::from_secs(30);
    pub const REQUEST_CAPACITY: usize = 100;
    pub const MAX_PACKET_SIZE: usize = 1024 * 1024;
    /// Tiempo que el event loop sigue activo tras pedir la desconexión.
    pub const DISCONNECT_GRACE: Duration = Duration::from_secs(1);
}

pub mod coap {
    use tokio::time::Duration;

    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
    pub const MAX_DATAGRAM_SIZE: usize = 65_535;

    /// Parámetros de transmisión de mensajes confirmables (RFC 7252 §4.8).
    pub const ACK_TIMEOUT: Duration = Duration::from_secs(2);
    pub const MAX_RETRANSMIT: u32 = 4;
    pub const EXCHANGE_LIFETIME: Duration = Duration::from_secs(247);
}

pub mod base_files {
    pub const MESSAGE_FILE: &str = "mensagem/mensagem.schema.json";
    pub const SERVICE_FILE: &str = "servico/servico.schema.json";
}
