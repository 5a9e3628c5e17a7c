//! # Estadísticas del Servidor
//! src/metrics/collector.rs
//!
//! Contadores de conexiones, respuestas por código, bytes y uploads, más
//! latencias para percentiles. El loop del servidor es el único que escribe;
//! los clones sirven para leer desde afuera (tests, resumen al apagar).

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Máximo de latencias guardadas para calcular percentiles
const MAX_LATENCIES: usize = 10_000;

/// Estadísticas compartibles del servidor
#[derive(Clone)]
pub struct ServerStats {
    inner: Arc<Mutex<StatsData>>,
    start_time: Instant,
}

#[derive(Default)]
struct StatsData {
    /// Conexiones aceptadas
    accepted: u64,

    /// Conexiones descartadas sin respuesta
    dropped: u64,

    /// Respuestas por código de estado
    status_codes: BTreeMap<u16, u64>,

    /// Latencias accept → respuesta (en microsegundos)
    latencies: VecDeque<u64>,

    bytes_received: u64,
    bytes_sent: u64,

    /// Archivos guardados en el directorio de uploads
    uploads_stored: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatsData::default())),
            start_time: Instant::now(),
        }
    }

    fn data(&self) -> MutexGuard<'_, StatsData> {
        // Los contadores siguen siendo válidos aunque otro thread haya entrado en pánico
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_accept(&self) {
        self.data().accepted += 1;
    }

    /// Conexión cerrada sin enviar nada (vacía o idle)
    pub fn record_drop(&self) {
        self.data().dropped += 1;
    }

    pub fn record_upload(&self) {
        self.data().uploads_stored += 1;
    }

    /// Registra una respuesta enviada
    pub fn record_response(&self, status: u16, received: usize, sent: u64, latency: Duration) {
        let mut data = self.data();

        *data.status_codes.entry(status).or_insert(0) += 1;
        data.bytes_received += received as u64;
        data.bytes_sent += sent;

        // Si tenemos demasiadas latencias, eliminar las más antiguas
        if data.latencies.len() >= MAX_LATENCIES {
            data.latencies.pop_front();
        }
        data.latencies.push_back(latency.as_micros() as u64);
    }

    /// Obtiene un snapshot de las estadísticas
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut data = self.data();
        let (p50, p95, p99, avg) = calculate_percentiles(data.latencies.make_contiguous());

        StatsSnapshot {
            uptime: self.start_time.elapsed(),
            accepted: data.accepted,
            dropped: data.dropped,
            responses: data.status_codes.values().sum(),
            status_codes: data.status_codes.clone(),
            bytes_received: data.bytes_received,
            bytes_sent: data.bytes_sent,
            uploads_stored: data.uploads_stored,
            latency_p50_us: p50,
            latency_p95_us: p95,
            latency_p99_us: p99,
            latency_avg_us: avg,
        }
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Calcula percentiles de latencia: (p50, p95, p99, promedio)
fn calculate_percentiles(latencies: &[u64]) -> (u64, u64, u64, u64) {
    if latencies.is_empty() {
        return (0, 0, 0, 0);
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();

    let len = sorted.len();
    let p50 = sorted[len * 50 / 100];
    let p95 = sorted[len * 95 / 100];
    let p99 = sorted[len * 99 / 100];

    let sum: u64 = sorted.iter().sum();
    let avg = sum / len as u64;

    (p50, p95, p99, avg)
}

/// Snapshot de estadísticas (para uso externo)
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub uptime: Duration,
    pub accepted: u64,
    pub dropped: u64,
    pub responses: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub uploads_stored: u64,
    pub latency_p50_us: u64,
    pub latency_p95_us: u64,
    pub latency_p99_us: u64,
    pub latency_avg_us: u64,
}

impl StatsSnapshot {
    /// Respuestas enviadas con un código
    pub fn count(&self, status: u16) -> u64 {
        self.status_codes.get(&status).copied().unwrap_or(0)
    }

    /// Conexiones que todavía no terminaron (ni respuesta ni descarte)
    pub fn in_flight(&self) -> u64 {
        self.accepted.saturating_sub(self.responses + self.dropped)
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let codes = self
            .status_codes
            .iter()
            .map(|(code, count)| format!("{}={}", code, count))
            .collect::<Vec<_>>()
            .join(" ");

        write!(
            f,
            "uptime={}s accepted={} dropped={} responses={} [{}] uploads={} rx={}B tx={}B \
             latency_us(p50={} p95={} p99={} avg={})",
            self.uptime.as_secs(),
            self.accepted,
            self.dropped,
            self.responses,
            codes,
            self.uploads_stored,
            self.bytes_received,
            self.bytes_sent,
            self.latency_p50_us,
            self.latency_p95_us,
            self.latency_p99_us,
            self.latency_avg_us,
        )
    }
}
