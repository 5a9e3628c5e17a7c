//! # Registro de Conexiones
//! src/server/registry.rs
//!
//! Arena de conexiones vivas indexada por handles estables. Un handle lleva
//! el índice del slot y su generación: cuando una conexión se elimina, la
//! generación del slot avanza y cualquier handle viejo deja de resolver.
//!
//! El registro no hace I/O de red; sólo es dueño de los sockets. Eliminar
//! una conexión la destruye y con ella se cierra su socket.
//!
//! Una conexión pasa por dos fases: primero acumula el request y, una vez
//! despachada, guarda la respuesta que falta enviar.

use crate::http::Outgoing;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Instant;

/// Capacidad máxima del buffer de un request
pub const MAX_REQUEST_SIZE: usize = 600_500;

/// Identificador estable de una conexión dentro del registro
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Una conexión aceptada y su buffer de acumulación
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,

    /// Bytes recibidos, en orden de llegada. Nunca supera `MAX_REQUEST_SIZE`.
    buffer: Vec<u8>,

    accepted_at: Instant,

    /// Primera vez que el socket estuvo listo para leer
    read_started: Option<Instant>,

    /// Última lectura que trajo bytes
    last_read: Instant,

    /// El cliente cerró su lado (read devolvió 0 o error)
    peer_closed: bool,

    /// Respuesta en envío; `None` mientras se acumula el request
    outgoing: Option<Outgoing>,

    /// Última escritura que avanzó
    last_write: Instant,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr, now: Instant) -> Self {
        Self {
            stream,
            peer,
            buffer: Vec::new(),
            accepted_at: now,
            read_started: None,
            last_read: now,
            peer_closed: false,
            outgoing: None,
            last_write: now,
        }
    }

    /// Socket del cliente
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Socket del cliente (mutable, para leer o escribir)
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Dirección del cliente
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Bytes recibidos hasta ahora
    pub fn received(&self) -> &[u8] {
        &self.buffer
    }

    /// Cantidad de bytes recibidos
    pub fn filled(&self) -> usize {
        self.buffer.len()
    }

    /// Espacio libre en el buffer
    pub fn remaining(&self) -> usize {
        MAX_REQUEST_SIZE - self.buffer.len()
    }

    pub fn accepted_at(&self) -> Instant {
        self.accepted_at
    }

    pub fn read_started(&self) -> Option<Instant> {
        self.read_started
    }

    pub fn last_read(&self) -> Instant {
        self.last_read
    }

    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Marca el inicio de la acumulación (sólo la primera vez)
    pub(crate) fn start_reading(&mut self, now: Instant) {
        if self.read_started.is_none() {
            self.read_started = Some(now);
            self.last_read = now;
        }
    }

    /// Agrega bytes recibidos. Retorna cuántos entraron.
    pub(crate) fn append(&mut self, bytes: &[u8], now: Instant) -> usize {
        let n = bytes.len().min(self.remaining());
        self.buffer.extend_from_slice(&bytes[..n]);
        if n > 0 {
            self.last_read = now;
        }
        n
    }

    pub(crate) fn mark_peer_closed(&mut self) {
        self.peer_closed = true;
    }

    /// La conexión ya tiene respuesta y está enviándola
    pub fn is_writing(&self) -> bool {
        self.outgoing.is_some()
    }

    pub fn outgoing(&self) -> Option<&Outgoing> {
        self.outgoing.as_ref()
    }

    pub fn last_write(&self) -> Instant {
        self.last_write
    }

    /// Pasa a la fase de envío
    pub(crate) fn start_writing(&mut self, outgoing: Outgoing, now: Instant) {
        self.outgoing = Some(outgoing);
        self.last_write = now;
    }

    /// Socket y respuesta pendiente, prestados a la vez
    pub(crate) fn writing_parts(&mut self) -> Option<(&mut TcpStream, &mut Outgoing)> {
        let outgoing = self.outgoing.as_mut()?;
        Some((&mut self.stream, outgoing))
    }

    pub(crate) fn mark_written(&mut self, now: Instant) {
        self.last_write = now;
    }

    /// Cierra el socket en ambos sentidos y destruye la conexión
    pub fn close(self) {
        // Puede fallar si el cliente ya se fue; el drop cierra el fd igual
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

struct Slot {
    generation: u32,
    connection: Option<Connection>,
}

/// Registro de conexiones vivas
#[derive(Default)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Registry {
    /// Crea un registro vacío
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra una conexión recién aceptada con su buffer vacío
    pub fn add(&mut self, stream: TcpStream, peer: SocketAddr, now: Instant) -> ConnectionHandle {
        let connection = Connection::new(stream, peer, now);
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.connection = Some(connection);
            return ConnectionHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            connection: Some(connection),
        });
        ConnectionHandle {
            index,
            generation: 0,
        }
    }

    /// Obtiene una conexión viva
    pub fn get(&self, handle: ConnectionHandle) -> Option<&Connection> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.connection.as_ref())
    }

    /// Obtiene una conexión viva (mutable)
    pub fn get_mut(&mut self, handle: ConnectionHandle) -> Option<&mut Connection> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.connection.as_mut())
    }

    /// Saca una conexión del registro sin cerrarla; el llamador pasa a ser
    /// su dueño. El handle queda inválido.
    pub fn take(&mut self, handle: ConnectionHandle) -> Option<Connection> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }

        let connection = slot.connection.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(connection)
    }

    /// Cierra el socket y destruye la conexión. Retorna `false` si el
    /// handle ya no era válido.
    pub fn remove(&mut self, handle: ConnectionHandle) -> bool {
        match self.take(handle) {
            Some(connection) => {
                connection.close();
                true
            }
            None => false,
        }
    }

    /// Handles de todas las conexiones vivas
    pub fn all(&self) -> impl Iterator<Item = ConnectionHandle> + '_ {
        self.iter().map(|(handle, _)| handle)
    }

    /// Conexiones vivas con su handle
    pub fn iter(&self) -> impl Iterator<Item = (ConnectionHandle, &Connection)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.connection.as_ref().map(|connection| {
                (
                    ConnectionHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    connection,
                )
            })
        })
    }

    /// Cierra todas las conexiones vivas
    pub fn clear(&mut self) -> usize {
        let handles: Vec<_> = self.all().collect();
        handles.into_iter().filter(|h| self.remove(*h)).count()
    }

    /// Cantidad de conexiones vivas
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    /// Par de sockets conectados: (lado servidor, lado cliente)
    fn socket_pair() -> (TcpStream, SocketAddr, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();
        (server, peer, client)
    }

    #[test]
    fn test_add_and_get() {
        let mut registry = Registry::new();
        let (stream, peer, _client) = socket_pair();

        let handle = registry.add(stream, peer, Instant::now());

        assert_eq!(registry.len(), 1);
        let conn = registry.get(handle).unwrap();
        assert_eq!(conn.peer(), peer);
        assert_eq!(conn.filled(), 0);
        assert!(conn.read_started().is_none());
    }

    #[test]
    fn test_remove_invalidates_handle() {
        let mut registry = Registry::new();
        let (stream, peer, _client) = socket_pair();
        let handle = registry.add(stream, peer, Instant::now());

        assert!(registry.remove(handle));
        assert!(registry.get(handle).is_none());
        assert!(!registry.remove(handle));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reused_slot_rejects_stale_handle() {
        let mut registry = Registry::new();
        let (s1, p1, _c1) = socket_pair();
        let (s2, p2, _c2) = socket_pair();

        let old = registry.add(s1, p1, Instant::now());
        registry.remove(old);
        let new = registry.add(s2, p2, Instant::now());

        assert_ne!(old, new);
        assert!(registry.get(old).is_none());
        assert_eq!(registry.get(new).unwrap().peer(), p2);
        assert_eq!(registry.slots.len(), 1);
    }

    #[test]
    fn test_remove_closes_socket() {
        let mut registry = Registry::new();
        let (stream, peer, mut client) = socket_pair();
        let handle = registry.add(stream, peer, Instant::now());

        registry.remove(handle);

        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_all_lists_live_handles() {
        let mut registry = Registry::new();
        let (s1, p1, _c1) = socket_pair();
        let (s2, p2, _c2) = socket_pair();
        let h1 = registry.add(s1, p1, Instant::now());
        let h2 = registry.add(s2, p2, Instant::now());
        registry.remove(h1);

        let all: Vec<_> = registry.all().collect();
        assert_eq!(all, vec![h2]);
    }

    #[test]
    fn test_append_respects_capacity() {
        let mut registry = Registry::new();
        let (stream, peer, _client) = socket_pair();
        let handle = registry.add(stream, peer, Instant::now());
        let conn = registry.get_mut(handle).unwrap();

        let big = vec![b'x'; MAX_REQUEST_SIZE + 10];
        assert_eq!(conn.append(&big, Instant::now()), MAX_REQUEST_SIZE);
        assert_eq!(conn.remaining(), 0);
        assert_eq!(conn.append(b"more", Instant::now()), 0);
    }

    #[test]
    fn test_start_writing_switches_phase() {
        use crate::http::{Response, StatusCode};

        let mut registry = Registry::new();
        let (stream, peer, _client) = socket_pair();
        let start = Instant::now();
        let handle = registry.add(stream, peer, start);
        let conn = registry.get_mut(handle).unwrap();
        assert!(!conn.is_writing());
        assert!(conn.writing_parts().is_none());

        let later = start + std::time::Duration::from_millis(5);
        conn.start_writing(Response::error(StatusCode::NotFound).into_outgoing(), later);

        assert!(conn.is_writing());
        assert_eq!(conn.last_write(), later);
        assert_eq!(conn.outgoing().unwrap().status(), StatusCode::NotFound);
    }

    #[test]
    fn test_clear_closes_everything() {
        let mut registry = Registry::new();
        let (s1, p1, _c1) = socket_pair();
        let (s2, p2, _c2) = socket_pair();
        registry.add(s1, p1, Instant::now());
        registry.add(s2, p2, Instant::now());

        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
    }
}
