//! # Acumulación de Requests
//! src/server/accumulator.rs
//!
//! Decide cuándo lo recibido en una conexión alcanza para parsearlo. Las
//! lecturas son no bloqueantes y el estado vive en la conexión, así que el
//! único punto donde el servidor se suspende es el `poll()` del
//! multiplexor. Hay dos plazos:
//!
//! - **Quiet timeout**: si ya llegó algo y pasa este tiempo sin bytes
//!   nuevos, se asume que el request está completo.
//! - **Hard timeout** (2 × quiet): desde que la conexión estuvo lista por
//!   primera vez; se corta aunque sigan llegando bytes.
//!
//! Además, si el espacio libre del buffer baja de `READ_CHUNK` el request
//! se clasifica como demasiado grande, sin importar los plazos.
//!
//! Una conexión que nunca manda nada se descarta tras el idle timeout.

use super::registry::Connection;
use std::io::{self, Read};
use std::time::{Duration, Instant};
use tracing::debug;

/// Tamaño de cada lectura del socket
pub const READ_CHUNK: usize = 4096;

/// Cómo terminó la acumulación de una conexión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Hay bytes; se parsea lo recibido
    Complete,

    /// Nunca llegó nada; se descarta sin responder
    EmptyDisconnect,

    /// El buffer se llenó; se responde 400
    Oversize,
}

/// Estado de la acumulación después de leer o revisar plazos
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Hay que seguir esperando
    Pending,

    /// La acumulación terminó
    Finished(Exit),
}

/// Plazos de acumulación
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    quiet: Duration,
    idle: Duration,
}

impl Timeouts {
    pub fn new(quiet: Duration, idle: Duration) -> Self {
        Self { quiet, idle }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Siempre el doble del quiet timeout
    pub fn hard(&self) -> Duration {
        self.quiet * 2
    }

    pub fn idle(&self) -> Duration {
        self.idle
    }
}

/// Lector por conexión con sus plazos
#[derive(Debug, Clone, Copy)]
pub struct Accumulator {
    timeouts: Timeouts,
}

impl Accumulator {
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Lee todo lo disponible en el socket sin bloquear
    ///
    /// Se llama cuando el multiplexor reporta la conexión como legible. El
    /// socket tiene que estar en modo no bloqueante.
    pub fn on_readable(&self, conn: &mut Connection, now: Instant) -> Progress {
        conn.start_reading(now);

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if conn.remaining() < READ_CHUNK {
                return Progress::Finished(Exit::Oversize);
            }

            match conn.stream_mut().read(&mut chunk) {
                Ok(0) => {
                    conn.mark_peer_closed();
                    break;
                }
                Ok(n) => {
                    conn.append(&chunk[..n], now);
                    debug!(peer = %conn.peer(), bytes = n, total = conn.filled(), "bytes recibidos");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(peer = %conn.peer(), error = %e, "error de lectura, se trata como cierre");
                    conn.mark_peer_closed();
                    break;
                }
            }
        }

        if conn.peer_closed() {
            // No va a llegar nada más
            return Progress::Finished(Self::finish_with_data(conn));
        }

        self.check_deadline(conn, now)
    }

    /// Revisa los plazos de una conexión sin leer
    pub fn check_deadline(&self, conn: &Connection, now: Instant) -> Progress {
        if conn.remaining() < READ_CHUNK {
            return Progress::Finished(Exit::Oversize);
        }

        let started = match conn.read_started() {
            Some(started) => started,
            None => {
                if now.saturating_duration_since(conn.accepted_at()) >= self.timeouts.idle() {
                    return Progress::Finished(Exit::EmptyDisconnect);
                }
                return Progress::Pending;
            }
        };

        if now.saturating_duration_since(started) >= self.timeouts.hard() {
            return Progress::Finished(Self::finish_with_data(conn));
        }

        if conn.filled() > 0
            && now.saturating_duration_since(conn.last_read()) >= self.timeouts.quiet()
        {
            return Progress::Finished(Exit::Complete);
        }

        Progress::Pending
    }

    /// Próximo instante en que `check_deadline` puede cambiar de resultado
    pub fn next_deadline(&self, conn: &Connection) -> Instant {
        match conn.read_started() {
            None => conn.accepted_at() + self.timeouts.idle(),
            Some(started) => {
                let hard = started + self.timeouts.hard();
                if conn.filled() > 0 {
                    hard.min(conn.last_read() + self.timeouts.quiet())
                } else {
                    hard
                }
            }
        }
    }

    fn finish_with_data(conn: &Connection) -> Exit {
        if conn.filled() > 0 {
            Exit::Complete
        } else {
            Exit::EmptyDisconnect
        }
    }
}
