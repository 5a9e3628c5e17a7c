//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! Servidor de un solo hilo que multiplexa todas las conexiones:
//! 1. `registry`: dueño de las conexiones vivas y sus buffers
//! 2. `multiplexer`: espera readiness con `poll()`
//! 3. `accumulator`: lecturas no bloqueantes bajo quiet/hard timeout
//! 4. `dispatcher`: parsea, procesa el upload y envía la respuesta sin bloquear
//! 5. `tcp`: el loop que une todo
//!
//! Cada conexión recibe a lo sumo una respuesta y después se cierra.

pub mod accumulator;
pub mod dispatcher;
pub mod multiplexer;
pub mod registry;
pub mod signal;
pub mod tcp;

// Re-exportar para facilitar el uso
pub use tcp::Server;
