//! # Logging
//! src/logging.rs
//!
//! Subscriber de `tracing` para el binario: formato de texto con hora local
//! y filtro por nivel. `RUST_LOG`, si está definida, tiene prioridad sobre
//! el nivel de la configuración.

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Filtro efectivo para un nivel por defecto
fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Instala el subscriber global
///
/// Si ya había uno instalado (por ejemplo, en tests) no hace nada.
pub fn init(level: &str) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_target(false)
        .with_line_number(true);

    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter(level))
        .try_init();
}
