//! # Señales de Apagado
//! src/server/signal.rs
//!
//! SIGINT y SIGTERM bajan una bandera global. El `poll()` del multiplexor
//! vuelve con EINTR y el loop del servidor ve la bandera antes de volver a
//! esperar.

use nix::errno::Errno;
use nix::sys::signal::{signal, SigHandler, Signal};
use std::ffi::c_int;
use std::sync::atomic::{AtomicBool, Ordering};

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn stop_running(_signal: c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

/// Instala los handlers de SIGINT y SIGTERM
///
/// Sólo el binario debe llamarla: los handlers son globales al proceso.
pub fn install() -> Result<(), Errno> {
    // stop_running sólo toca un atómico, es async-signal-safe
    unsafe { signal(Signal::SIGINT, SigHandler::Handler(stop_running)) }?;
    unsafe { signal(Signal::SIGTERM, SigHandler::Handler(stop_running)) }?;
    Ok(())
}

/// `false` una vez recibida una señal de apagado
pub fn is_running() -> bool {
    RUNNING.load(Ordering::Relaxed)
}
