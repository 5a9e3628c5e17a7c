//! # Servidor TCP Multiplexado
//! src/server/tcp.rs
//!
//! Un solo thread atiende a todos los clientes. Cada vuelta del loop:
//!
//! 1. Espera en `poll()` hasta que haya algo legible o escribible, o venza
//!    el plazo más cercano de alguna conexión
//! 2. Acepta todas las conexiones pendientes
//! 3. Lee de las conexiones legibles
//! 4. Escribe en las conexiones que están enviando su respuesta
//! 5. Revisa plazos y despacha las conexiones que terminaron
//!
//! Ningún socket de cliente bloquea: una respuesta que el cliente no lee
//! queda a mitad de envío hasta que venza su plazo de escritura. Cada
//! conexión recibe a lo sumo una respuesta y se cierra siempre.

use super::accumulator::{Accumulator, Exit, Progress, Timeouts};
use super::dispatcher::Dispatcher;
use super::multiplexer;
use super::registry::{Connection, ConnectionHandle, Registry};
use super::signal;
use crate::config::Config;
use crate::error::{ServerError, ServerResult};
use crate::http::{Response, StatusCode, UploadOutcome};
use crate::metrics::ServerStats;
use crate::router::Router;
use std::fs;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Servidor HTTP de un solo hilo
pub struct Server {
    listener: TcpListener,
    registry: Registry,
    accumulator: Accumulator,
    dispatcher: Dispatcher,
    stats: ServerStats,
}

impl Server {
    /// Valida la configuración, crea el directorio de uploads y abre el
    /// socket de escucha en modo no bloqueante
    pub fn bind(config: &Config) -> ServerResult<Self> {
        config.validate().map_err(ServerError::Config)?;

        fs::create_dir_all(&config.upload_dir)?;

        let address = config.address();
        let listener = TcpListener::bind(&address).map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;

        let timeouts = Timeouts::new(config.quiet_timeout(), config.idle_timeout());
        let dispatcher = Dispatcher::new(
            Router::new(&config.public_dir),
            &config.upload_dir,
            config.write_timeout(),
        );

        Ok(Self {
            listener,
            registry: Registry::new(),
            accumulator: Accumulator::new(timeouts),
            dispatcher,
            stats: ServerStats::new(),
        })
    }

    /// Dirección real de escucha (útil con puerto 0)
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle de lectura de las estadísticas
    pub fn stats(&self) -> ServerStats {
        self.stats.clone()
    }

    /// Loop principal. Sólo retorna con un error fatal o tras una señal de
    /// apagado.
    pub fn run(&mut self) -> ServerResult<()> {
        let address = self.local_addr()?;
        let timeouts = self.accumulator.timeouts();
        info!(
            %address,
            quiet_us = timeouts.quiet().as_micros() as u64,
            hard_us = timeouts.hard().as_micros() as u64,
            "servidor escuchando"
        );

        while signal::is_running() {
            let timeout = self.next_timeout(Instant::now());
            let ready = multiplexer::wait(&self.listener, &self.registry, timeout)?;

            if ready.interrupted {
                continue;
            }

            if ready.listener {
                self.accept_pending()?;
            }

            for handle in ready.readable {
                self.service(handle);
            }

            for handle in ready.writable {
                self.flush(handle, Instant::now());
            }

            self.sweep_deadlines(Instant::now());
        }

        let released = self.registry.clear();
        info!(released, stats = %self.stats.snapshot(), "servidor detenido");
        Ok(())
    }

    /// Tiempo hasta el plazo más cercano; `None` si no hay conexiones
    fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.registry
            .iter()
            .map(|(_, conn)| self.deadline(conn))
            .min()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Próximo plazo de una conexión según su fase
    fn deadline(&self, conn: &Connection) -> Instant {
        self.dispatcher
            .write_deadline(conn)
            .unwrap_or_else(|| self.accumulator.next_deadline(conn))
    }

    /// Acepta hasta que el listener no tenga más conexiones pendientes
    fn accept_pending(&mut self) -> ServerResult<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.stats.record_accept();

                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!(%peer, error = %e, "no se pudo configurar el socket");
                        self.stats.record_drop();
                        continue;
                    }

                    let handle = self.registry.add(stream, peer, Instant::now());
                    info!(%peer, %handle, live = self.registry.len(), "New connection");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                // El cliente se fue antes del accept, o llegó una señal
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    continue
                }
                Err(e) => return Err(ServerError::Accept(e)),
            }
        }
    }

    /// Lee de una conexión legible y la despacha si terminó
    fn service(&mut self, handle: ConnectionHandle) {
        let now = Instant::now();
        let Some(conn) = self.registry.get_mut(handle) else {
            return;
        };

        if let Progress::Finished(exit) = self.accumulator.on_readable(conn, now) {
            self.finish(handle, exit, now);
        }
    }

    /// Despacha las conexiones cuyos plazos vencieron y corta los envíos
    /// que dejaron de avanzar
    fn sweep_deadlines(&mut self, now: Instant) {
        let mut expired = Vec::new();
        let mut stalled = Vec::new();

        for (handle, conn) in self.registry.iter() {
            match self.dispatcher.write_deadline(conn) {
                Some(deadline) if deadline <= now => stalled.push(handle),
                Some(_) => {}
                None => {
                    if let Progress::Finished(exit) = self.accumulator.check_deadline(conn, now) {
                        expired.push((handle, exit));
                    }
                }
            }
        }

        for (handle, exit) in expired {
            self.finish(handle, exit, now);
        }

        for handle in stalled {
            self.close_sent(handle, Some(io::ErrorKind::TimedOut.into()));
        }
    }

    /// Lleva una conexión que terminó de acumular a su estado terminal, o a
    /// la fase de envío si corresponde una respuesta
    fn finish(&mut self, handle: ConnectionHandle, exit: Exit, now: Instant) {
        let response = match exit {
            Exit::EmptyDisconnect => {
                if let Some(conn) = self.registry.take(handle) {
                    info!(peer = %conn.peer(), "Unexpected disconnect");
                    self.stats.record_drop();
                    conn.close();
                }
                return;
            }
            Exit::Oversize => {
                let Some(conn) = self.registry.get(handle) else {
                    return;
                };
                warn!(peer = %conn.peer(), bytes = conn.filled(), "request demasiado grande");
                Response::error(StatusCode::BadRequest)
            }
            Exit::Complete => {
                let Some(conn) = self.registry.get(handle) else {
                    return;
                };
                let reply = self.dispatcher.respond(conn.received(), conn.peer());
                if let Some(UploadOutcome::Stored(_)) = reply.upload {
                    self.stats.record_upload();
                }
                reply.response
            }
        };

        if let Some(conn) = self.registry.get_mut(handle) {
            self.dispatcher.start(conn, response, now);
        }
        self.flush(handle, now);
    }

    /// Escribe lo que la conexión acepte; la cierra al terminar o fallar
    fn flush(&mut self, handle: ConnectionHandle, now: Instant) {
        let Some(conn) = self.registry.get_mut(handle) else {
            return;
        };

        match self.dispatcher.on_writable(conn, now) {
            Ok(false) => {}
            Ok(true) => self.close_sent(handle, None),
            Err(e) => self.close_sent(handle, Some(e)),
        }
    }

    /// Saca del registro una conexión que estaba enviando, la cierra y
    /// registra su respuesta
    fn close_sent(&mut self, handle: ConnectionHandle, error: Option<io::Error>) {
        let Some(conn) = self.registry.take(handle) else {
            return;
        };
        let Some(outgoing) = conn.outgoing() else {
            conn.close();
            return;
        };

        let peer = conn.peer();
        let status = outgoing.status();
        let sent = outgoing.written();

        match error {
            None => debug!(%peer, %status, bytes = sent, "respuesta enviada"),
            Some(e) => warn!(%peer, %status, bytes = sent, error = %e, "no se pudo enviar la respuesta"),
        }

        self.stats
            .record_response(status.as_u16(), conn.filled(), sent, conn.accepted_at().elapsed());
        conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use tempfile::TempDir;

    fn test_config(public: &TempDir) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            public_dir: public.path().to_path_buf(),
            upload_dir: public.path().join("upload"),
            quiet_timeout_us: 50_000,
            ..Config::default()
        }
    }

    #[test]
    fn test_bind_creates_upload_dir() {
        let public = TempDir::new().unwrap();
        let config = test_config(&public);

        let server = Server::bind(&config).unwrap();

        assert!(config.upload_dir.is_dir());
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_bind_rejects_invalid_config() {
        let public = TempDir::new().unwrap();
        let mut config = test_config(&public);
        config.quiet_timeout_us = 0;

        assert!(matches!(Server::bind(&config), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_bind_port_in_use() {
        let public = TempDir::new().unwrap();
        let first = Server::bind(&test_config(&public)).unwrap();

        let mut config = test_config(&public);
        config.port = first.local_addr().unwrap().port();

        assert!(matches!(Server::bind(&config), Err(ServerError::Bind { .. })));
    }

    #[test]
    fn test_next_timeout_empty_registry() {
        let public = TempDir::new().unwrap();
        let server = Server::bind(&test_config(&public)).unwrap();
        assert_eq!(server.next_timeout(Instant::now()), None);
    }

    #[test]
    fn test_one_cycle_by_hand() {
        let public = TempDir::new().unwrap();
        fs::write(public.path().join("index.html"), b"hola").unwrap();
        let mut server = Server::bind(&test_config(&public)).unwrap();
        let mut client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();

        // accept + lectura + quiet timeout, sin el loop completo
        let deadline = Instant::now() + Duration::from_secs(5);
        while server.stats().snapshot().responses == 0 && Instant::now() < deadline {
            let timeout = server.next_timeout(Instant::now()).or(Some(Duration::from_millis(50)));
            let ready = multiplexer::wait(&server.listener, &server.registry, timeout).unwrap();
            if ready.listener {
                server.accept_pending().unwrap();
            }
            for handle in ready.readable {
                server.service(handle);
            }
            for handle in ready.writable {
                server.flush(handle, Instant::now());
            }
            server.sweep_deadlines(Instant::now());
        }

        let mut response = Vec::new();
        client.read_to_end(&mut response).unwrap();
        assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with(b"hola"));
        assert!(server.registry.is_empty());

        let snapshot = server.stats().snapshot();
        assert_eq!(snapshot.accepted, 1);
        assert_eq!(snapshot.count(200), 1);
    }
}
