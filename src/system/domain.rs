//! Módulo de configuración central y gestión del entorno de ejecución.
//!
//! Este módulo actúa como la fuente única de verdad para la configuración del barramento.
//! Se encarga de leer las variables de entorno, establecer valores por defecto
//! y proveer las estructuras necesarias para iniciar los adaptadores (MQTT, CoAP) y el logging.
//!
//! # Funcionalidades Principales
//! * **Carga de Configuración:** Lee de `.env` en desarrollo y variables de sistema en producción.
//! * **Observabilidad:** Configura `tracing_subscriber` para logs estructurados o legibles.
//! * **Errores:** Define los errores de configuración del proceso.
//!


use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};


/// Representa la configuración global del sistema y el estado del entorno.
///
/// Ninguna variable es obligatoria: el barramento arranca con valores por defecto
/// pensados para un broker MQTT local y un servidor CoAP en el puerto estándar.
#[derive(Debug, Clone)]
pub struct System {
    /// Host del broker MQTT externo.
    /// Por defecto: `localhost`.
    pub mqtt_host: String,

    /// Puerto del broker MQTT.
    /// Por defecto: `1883`.
    pub mqtt_port: u16,

    /// Client id con el que el barramento se conecta al broker.
    /// Por defecto: `barramento_mqtt`.
    pub mqtt_client_id: String,

    /// Tópico en el que el barramento recibe mensajes.
    /// Por defecto: `topico/barramento`.
    pub mqtt_topic: String,

    /// Habilita el adaptador MQTT.
    pub mqtt_enabled: bool,

    /// Dirección local del servidor CoAP.
    /// Por defecto: `0.0.0.0:5683`.
    pub coap_bind: String,

    /// Path (sin `/` inicial) que acepta mensajes del barramento.
    /// Por defecto: `coap/barramento`.
    pub coap_path: String,

    /// Habilita el adaptador CoAP.
    pub coap_enabled: bool,

    /// Directorio con los archivos base enviados por `ENVIAR_ARQUIVOS_BASE`.
    /// Por defecto: `resources/modelos`.
    pub base_files_dir: PathBuf,

    /// Entorno de ejecución actual (`development`, `staging`, `production`).
    /// Afecta el formato de logs y la carga de archivos `.env`.
    pub environment: String,

    /// Nivel de detalle de los logs (ej. `info`, `debug`, `warn`).
    /// Se autoconfigura según el `environment` si no se especifica.
    pub rust_log: String,
}


impl System {

    /// Carga la configuración desde las variables de entorno.
    ///
    /// # Comportamiento
    /// * Si `ENVIRONMENT` es "development", intenta cargar un archivo `.env`.
    /// * Establece valores por defecto para todas las variables.
    ///
    /// # Errores
    /// * [`ConfigError::Invalid`] si una variable numérica o booleana no se puede interpretar.
    pub fn new() -> Result<Self, ConfigError> {

        let environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".into());

        if environment == "development" {
            dotenv::dotenv().ok();
        }

        let system = System {
            mqtt_host: env::var("MQTT_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),

            mqtt_port: parse_var("MQTT_PORT", 1883)?,

            mqtt_client_id: env::var("MQTT_CLIENT_ID")
                .unwrap_or_else(|_| "barramento_mqtt".to_string()),

            mqtt_topic: env::var("MQTT_TOPIC")
                .unwrap_or_else(|_| "topico/barramento".to_string()),

            mqtt_enabled: parse_var("MQTT_ENABLED", true)?,

            coap_bind: env::var("COAP_BIND")
                .unwrap_or_else(|_| "0.0.0.0:5683".to_string()),

            coap_path: env::var("COAP_PATH")
                .map(|path| path.trim_matches('/').to_string())
                .unwrap_or_else(|_| "coap/barramento".to_string()),

            coap_enabled: parse_var("COAP_ENABLED", true)?,

            base_files_dir: env::var("BASE_FILES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("resources/modelos")),

            rust_log: env::var("RUST_LOG")
                .unwrap_or_else(|_| default_log_level(&environment).to_string()),

            environment,
        };

        Ok(system)
    }
}


impl Default for System {
    fn default() -> Self {
        Self {
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_client_id: "barramento_mqtt".to_string(),
            mqtt_topic: "topico/barramento".to_string(),
            mqtt_enabled: true,
            coap_bind: "0.0.0.0:5683".to_string(),
            coap_path: "coap/barramento".to_string(),
            coap_enabled: true,
            base_files_dir: PathBuf::from("resources/modelos"),
            environment: "development".to_string(),
            rust_log: "debug".to_string(),
        }
    }
}


fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "development" => "debug",
        "staging" => "info",
        _ => "warn",
    }
}


fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}


/// Errores al cargar la configuración del proceso.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("variable {name} con valor inválido: '{value}'")]
    Invalid { name: &'static str, value: String },
}


/// Inicializa el sistema de trazabilidad y logs (Tracing).
///
/// Configura el formato de salida basándose en el entorno:
/// * **Production**: Salida JSON (para logs estructurados en la nube).
/// * **Development/Otros**: Salida "Pretty" (colores y formato legible).
///
/// # Argumentos
/// * `system`: Referencia a la configuración cargada para leer el nivel de log (`rust_log`).
pub fn init_tracing(system: &System) {

    let filter = EnvFilter::try_new(&system.rust_log)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt().with_env_filter(filter).with_target(false);

    if system.environment == "production" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_follows_environment() {
        assert_eq!(default_log_level("development"), "debug");
        assert_eq!(default_log_level("staging"), "info");
        assert_eq!(default_log_level("production"), "warn");
    }

    #[test]
    fn invalid_number_is_reported_with_variable_name() {
        // SAFETY: la variable sólo la usa este test.
        unsafe { env::set_var("BARRAMENTO_TEST_PORT", "abc") };
        let err = parse_var::<u16>("BARRAMENTO_TEST_PORT", 1).unwrap_err();
        assert!(err.to_string().contains("BARRAMENTO_TEST_PORT"));
        unsafe { env::remove_var("BARRAMENTO_TEST_PORT") };
    }

    #[test]
    fn missing_variable_uses_default() {
        let value = parse_var::<u16>("BARRAMENTO_TEST_UNSET_VAR", 5683).unwrap();
        assert_eq!(value, 5683);
    }

    #[test]
    fn loading_configuration_emits_no_events() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

        struct CountEvents(Arc<AtomicUsize>);

        impl<S: tracing::Subscriber> Layer<S> for CountEvents {
            fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let events = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(CountEvents(events.clone()));

        let _ = tracing::subscriber::with_default(subscriber, System::new);

        // Antes de init_tracing no hay subscriber que reciba estos eventos.
        assert_eq!(events.load(Ordering::SeqCst), 0);
    }
}
