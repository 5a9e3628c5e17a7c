//! # Estadísticas
//! src/metrics/mod.rs
//!
//! Contadores del servidor:
//! - Conexiones aceptadas y descartadas
//! - Respuestas por código de estado
//! - Latencias (p50, p95, p99)
//! - Bytes recibidos/enviados y uploads guardados

pub mod collector;

pub use collector::{ServerStats, StatsSnapshot};
