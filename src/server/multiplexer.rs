//! # Multiplexor
//! src/server/multiplexer.rs
//!
//! Envoltura delgada sobre `poll(2)`: bloquea hasta que el socket de escucha
//! o alguna conexión registrada esté lista, o hasta que venza el timeout
//! pedido. Las conexiones que acumulan se esperan para leer; las que envían
//! su respuesta, para escribir. La readiness es level-triggered: un socket
//! con datos sin leer vuelve a aparecer en la siguiente llamada.

use super::registry::{ConnectionHandle, Registry};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::net::TcpListener;
use std::os::fd::AsFd;
use std::time::Duration;
use thiserror::Error;

/// Falla del OS al multiplexar. Es fatal para el servidor.
#[derive(Debug, Error)]
#[error("poll() falló: {0}")]
pub struct MultiplexError(#[from] pub Errno);

/// Sockets listos después de una espera
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadinessSet {
    /// Hay conexiones pendientes de aceptar
    pub listener: bool,

    /// Conexiones legibles, en orden de registro
    pub readable: Vec<ConnectionHandle>,

    /// Conexiones en envío que aceptan más bytes
    pub writable: Vec<ConnectionHandle>,

    /// La espera fue interrumpida por una señal
    pub interrupted: bool,
}

impl ReadinessSet {
    /// Ningún socket está listo (timeout o señal)
    pub fn is_empty(&self) -> bool {
        !self.listener && self.readable.is_empty() && self.writable.is_empty()
    }
}

/// Espera a que haya algo para leer o escribir
///
/// `timeout = None` bloquea sin límite. Los timeouts se redondean hacia
/// arriba al milisegundo y se acotan a `u16::MAX` ms; el llamador vuelve a
/// esperar si todavía no venció nada.
pub fn wait(
    listener: &TcpListener,
    registry: &Registry,
    timeout: Option<Duration>,
) -> Result<ReadinessSet, MultiplexError> {
    let mut handles = Vec::with_capacity(registry.len());
    let mut fds = Vec::with_capacity(registry.len() + 1);

    fds.push(PollFd::new(listener.as_fd(), PollFlags::POLLIN));
    for (handle, conn) in registry.iter() {
        let interest = if conn.is_writing() {
            PollFlags::POLLOUT
        } else {
            PollFlags::POLLIN
        };
        handles.push((handle, conn.is_writing()));
        fds.push(PollFd::new(conn.stream().as_fd(), interest));
    }

    match poll(&mut fds, poll_timeout(timeout)) {
        Ok(_) => {}
        Err(Errno::EINTR) => {
            return Ok(ReadinessSet {
                interrupted: true,
                ..ReadinessSet::default()
            })
        }
        Err(e) => return Err(MultiplexError(e)),
    }

    // Cierre o error también cuentan: el read o el write lo reporta
    let events = PollFlags::POLLIN | PollFlags::POLLOUT | PollFlags::POLLHUP | PollFlags::POLLERR;
    let is_ready = |fd: &PollFd| fd.revents().map_or(false, |r| r.intersects(events));

    let mut ready = ReadinessSet {
        listener: is_ready(&fds[0]),
        ..ReadinessSet::default()
    };
    for ((handle, writing), fd) in handles.into_iter().zip(&fds[1..]) {
        if !is_ready(fd) {
            continue;
        }
        if writing {
            ready.writable.push(handle);
        } else {
            ready.readable.push(handle);
        }
    }

    Ok(ready)
}

fn poll_timeout(timeout: Option<Duration>) -> PollTimeout {
    match timeout {
        None => PollTimeout::NONE,
        Some(timeout) => {
            let millis = timeout.as_micros().div_ceil(1000).min(u16::MAX as u128);
            PollTimeout::from(millis as u16)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpStream;
    use std::time::Instant;

    fn listener() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").unwrap()
    }

    #[test]
    fn test_timeout_without_activity() {
        let listener = listener();
        let registry = Registry::new();

        let start = Instant::now();
        let ready = wait(&listener, &registry, Some(Duration::from_millis(30))).unwrap();

        assert!(ready.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_listener_ready_on_connect() {
        let listener = listener();
        let registry = Registry::new();
        let _client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        let ready = wait(&listener, &registry, Some(Duration::from_secs(2))).unwrap();
        assert!(ready.listener);
        assert!(ready.readable.is_empty());
    }

    #[test]
    fn test_only_readable_connections_reported() {
        let listener = listener();
        let mut registry = Registry::new();
        let addr = listener.local_addr().unwrap();

        let _quiet_client = TcpStream::connect(addr).unwrap();
        let (s1, p1) = listener.accept().unwrap();
        let mut busy_client = TcpStream::connect(addr).unwrap();
        let (s2, p2) = listener.accept().unwrap();

        let _quiet = registry.add(s1, p1, Instant::now());
        let busy = registry.add(s2, p2, Instant::now());

        busy_client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let ready = wait(&listener, &registry, Some(Duration::from_secs(2))).unwrap();

        assert!(!ready.listener);
        assert_eq!(ready.readable, vec![busy]);
        assert!(ready.writable.is_empty());
    }

    #[test]
    fn test_closed_peer_is_readable() {
        let listener = listener();
        let mut registry = Registry::new();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        let handle = registry.add(stream, peer, Instant::now());

        drop(client);

        let ready = wait(&listener, &registry, Some(Duration::from_secs(2))).unwrap();
        assert_eq!(ready.readable, vec![handle]);
    }

    #[test]
    fn test_writing_connection_reported_writable() {
        use crate::http::{Response, StatusCode};

        let listener = listener();
        let mut registry = Registry::new();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        let handle = registry.add(stream, peer, Instant::now());
        registry
            .get_mut(handle)
            .unwrap()
            .start_writing(Response::error(StatusCode::NotFound).into_outgoing(), Instant::now());

        // Bytes sin leer no la vuelven legible: ya no se espera POLLIN
        client.write_all(b"extra").unwrap();

        let ready = wait(&listener, &registry, Some(Duration::from_secs(2))).unwrap();
        assert!(ready.readable.is_empty());
        assert_eq!(ready.writable, vec![handle]);
    }

    #[test]
    fn test_poll_timeout_rounds_up() {
        assert_eq!(poll_timeout(None), PollTimeout::NONE);
        assert_eq!(poll_timeout(Some(Duration::from_micros(1))), PollTimeout::from(1u16));
        assert_eq!(poll_timeout(Some(Duration::from_micros(155_555))), PollTimeout::from(156u16));
        assert_eq!(poll_timeout(Some(Duration::from_secs(3600))), PollTimeout::from(u16::MAX));
    }
}
