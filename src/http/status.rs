//! # Códigos de Estado HTTP
//! src/http/status.rs
//!
//! El servidor sólo produce cinco estados terminales:
//!
//! - **2xx**: 200 OK (archivo servido o `/cur_time`)
//! - **4xx**: 400, 404, 413
//! - **5xx**: 500 (colisión de nombre al subir un archivo)
//!
//! Las frases de razón son las que el servidor siempre ha enviado, no las
//! del RFC (por ejemplo `500 Server Error`).

/// Códigos de estado HTTP que puede emitir el servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// 200 OK - Recurso servido
    Ok = 200,

    /// 400 Bad Request - Request malformado, demasiado grande o path muy largo
    BadRequest = 400,

    /// 404 Not Found - Archivo inexistente o intento de `..`
    NotFound = 404,

    /// 413 Request Entity Too Large - El archivo subido excede el límite
    PayloadTooLarge = 413,

    /// 500 Server Error - El archivo subido ya existe (o no pudo escribirse)
    ServerError = 500,
}

impl StatusCode {
    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use http_upload_server::http::StatusCode;
    /// assert_eq!(StatusCode::PayloadTooLarge.as_u16(), 413);
    /// ```
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Retorna el texto de razón que acompaña al código en la status line
    ///
    /// # Ejemplo
    /// ```
    /// use http_upload_server::http::StatusCode;
    /// assert_eq!(StatusCode::ServerError.reason_phrase(), "Server Error");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::PayloadTooLarge => "Request Entity Too Large",
            StatusCode::ServerError => "Server Error",
        }
    }
}

impl std::fmt::Display for StatusCode {
    /// Formato: "413 Request Entity Too Large"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}
