//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración desde argumentos CLI y variables de entorno. Sin flags se
//! comporta como el daemon de puerto fijo: `0.0.0.0:8080`, archivos desde
//! `public/` y uploads en `public/upload/`. Correr el binario sin flags es el
//! comportamiento de referencia.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./http_upload_server --port 9000 \
//!   --public-dir ./www \
//!   --quiet-timeout-us 200000
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=9000 UPLOAD_DIR=/tmp/uploads ./http_upload_server
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Configuración del servidor de uploads
#[derive(Debug, Clone, Parser)]
#[command(name = "http_upload_server")]
#[command(about = "Servidor HTTP de un solo hilo con subida de archivos multipart")]
#[command(version)]
pub struct Config {
    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value = "8080", env = "HTTP_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "0.0.0.0", env = "HTTP_HOST")]
    pub host: String,

    /// Directorio desde el que se sirven archivos
    #[arg(long = "public-dir", default_value = "public", env = "PUBLIC_DIR")]
    pub public_dir: PathBuf,

    /// Directorio donde se guardan los uploads
    #[arg(long = "upload-dir", default_value = "public/upload", env = "UPLOAD_DIR")]
    pub upload_dir: PathBuf,

    // === Timeouts ===

    /// Silencio tolerado (en microsegundos) antes de parsear lo recibido.
    /// El hard timeout es siempre el doble.
    #[arg(long = "quiet-timeout-us", default_value = "155555", env = "QUIET_TIMEOUT_US")]
    pub quiet_timeout_us: u64,

    /// Tiempo máximo (ms) que una conexión puede quedar sin mandar nada
    #[arg(long = "idle-timeout-ms", default_value = "30000", env = "IDLE_TIMEOUT_MS")]
    pub idle_timeout_ms: u64,

    /// Tiempo máximo (ms) que el envío de una respuesta puede quedar sin
    /// avanzar antes de cortar la conexión
    #[arg(long = "write-timeout-ms", default_value = "5000", env = "WRITE_TIMEOUT_MS")]
    pub write_timeout_ms: u64,

    // === Logging ===

    /// Nivel de log (error, warn, info, debug, trace). RUST_LOG tiene prioridad.
    #[arg(long = "log-level", default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use http_upload_server::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "0.0.0.0:8080");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn quiet_timeout(&self) -> Duration {
        Duration::from_micros(self.quiet_timeout_us)
    }

    /// Siempre el doble del quiet timeout
    pub fn hard_timeout(&self) -> Duration {
        self.quiet_timeout() * 2
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.quiet_timeout_us == 0 {
            return Err("Quiet timeout must be > 0".to_string());
        }
        if self.idle_timeout_ms == 0 {
            return Err("Idle timeout must be > 0".to_string());
        }
        if self.write_timeout_ms == 0 {
            return Err("Write timeout must be > 0".to_string());
        }

        Ok(())
    }

    /// Imprime un resumen de la configuración
    pub fn print_summary(&self) {
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║            HTTP Upload Server Configuration                  ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!();
        println!("🌐 Network:");
        println!("   Address:      {}", self.address());
        println!();
        println!("📁 Files:");
        println!("   Public dir:   {}", self.public_dir.display());
        println!("   Upload dir:   {}", self.upload_dir.display());
        println!();
        println!("⏱️  Timeouts:");
        println!("   Quiet:        {} µs", self.quiet_timeout_us);
        println!("   Hard:         {} µs (2 × quiet)", self.hard_timeout().as_micros());
        println!("   Idle:         {} ms", self.idle_timeout_ms);
        println!("   Write:        {} ms", self.write_timeout_ms);
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            public_dir: PathBuf::from("public"),
            upload_dir: PathBuf::from("public/upload"),
            quiet_timeout_us: 155_555,
            idle_timeout_ms: 30_000,
            write_timeout_ms: 5_000,
            log_level: "info".to_string(),
        }
    }
}
