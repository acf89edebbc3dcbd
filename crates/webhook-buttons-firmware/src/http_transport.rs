//! Outbound GET transport over the ESP-IDF HTTP client.

use std::fmt;
use std::time::Duration;

use embedded_svc::http::client::Client as HttpClient;
use embedded_svc::http::Method;
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
use esp_idf_svc::tls::X509;
use webhook_buttons::{nul_terminated_pem, GetRequest, HttpTransport, TlsTrust};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum TransportError {
    Connect(String),
    Request(String),
    UnsupportedTrust(&'static str),
    /// The configured PEM holds a NUL byte.
    BadCertificate,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Connect(msg) => write!(f, "connect failed: {}", msg),
            TransportError::Request(msg) => write!(f, "request failed: {}", msg),
            TransportError::UnsupportedTrust(kind) => {
                write!(f, "{} trust is not supported by this client", kind)
            }
            TransportError::BadCertificate => write!(f, "root CA contains a NUL byte"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Opens a fresh connection per request and drops it before returning.
///
/// Requests without a configured root CA verify against the bundled roots.
#[derive(Default)]
pub struct EspTransport;

impl EspTransport {
    pub fn new() -> Self {
        Self
    }
}

impl HttpTransport for EspTransport {
    type Error = TransportError;

    fn get(&mut self, request: &GetRequest<'_>) -> Result<u16, TransportError> {
        // Declared before the connection so it is dropped after it.
        let pem = match request.tls {
            Some(TlsTrust::RootCertificate(pem)) => {
                Some(nul_terminated_pem(pem).ok_or(TransportError::BadCertificate)?)
            }
            Some(TlsTrust::Fingerprint(_)) => {
                return Err(TransportError::UnsupportedTrust("fingerprint"))
            }
            None => None,
        };
        // SAFETY: the client configuration wants `'static`, but the
        // connection, client and response built below all drop before `pem`
        // at the end of this call, and `pem` is never mutated meanwhile.
        let server_certificate = pem.as_deref().map(|bytes| {
            let bytes: &'static [u8] =
                unsafe { std::slice::from_raw_parts(bytes.as_ptr(), bytes.len()) };
            X509::pem_until_nul(bytes)
        });
        let config = HttpConfiguration {
            timeout: Some(REQUEST_TIMEOUT),
            crt_bundle_attach: if server_certificate.is_none() {
                Some(esp_idf_svc::sys::esp_crt_bundle_attach)
            } else {
                None
            },
            server_certificate,
            ..Default::default()
        };
        let conn = EspHttpConnection::new(&config)
            .map_err(|e| TransportError::Connect(format!("{:?}", e)))?;
        let mut client = HttpClient::wrap(conn);

        let headers: Vec<(&str, &str)> = request
            .headers
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        let response = client
            .request(Method::Get, request.url, &headers)
            .map_err(|e| TransportError::Request(format!("{:?}", e)))?
            .submit()
            .map_err(|e| TransportError::Request(format!("{:?}", e)))?;
        Ok(response.status())
    }
}
