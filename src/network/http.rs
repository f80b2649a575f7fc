// HTTP client transport for release checks and firmware downloads

use core::time::Duration;
use embedded_svc::http::Method;
use esp_idf_svc::http::client::{Configuration as HttpConfig, EspHttpConnection, FollowRedirectsPolicy};
use esp_idf_svc::sys::{esp_crt_bundle_attach, EspError, ESP_ERR_HTTP_EAGAIN};
use update_core::{ByteSource, HttpResponse, HttpTransport, ReadOutcome, RequestOptions, TransportError};

use crate::system;

const USER_AGENT: &str = concat!("esp32-autoupdate/", env!("CARGO_PKG_VERSION"));

/// Per-read socket timeout. Kept well under the task watchdog; the download
/// loop decides how long a silent connection may stall.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a fresh TLS connection per request.
#[derive(Clone, Copy, Default)]
pub struct EspHttpTransport;

impl EspHttpTransport {
    pub fn new() -> Self {
        Self
    }
}

/// Response body backed by the open connection.
pub struct EspHttpBody {
    conn: EspHttpConnection,
}

fn dropped(e: EspError) -> TransportError {
    TransportError::Dropped(format!("{:?}", e))
}

fn connect_failed(e: EspError) -> TransportError {
    TransportError::Connect(format!("{:?}", e))
}

impl HttpTransport for EspHttpTransport {
    type Body = EspHttpBody;

    fn get(&mut self, url: &str, options: &RequestOptions<'_>) -> Result<HttpResponse<EspHttpBody>, TransportError> {
        let mut conn = EspHttpConnection::new(&HttpConfig {
            crt_bundle_attach: Some(esp_crt_bundle_attach),
            timeout: Some(READ_TIMEOUT),
            follow_redirects_policy: if options.follow_redirects {
                FollowRedirectsPolicy::FollowAll
            } else {
                FollowRedirectsPolicy::FollowNone
            },
            buffer_size: Some(4096),
            ..Default::default()
        })
        .map_err(connect_failed)?;

        let headers = [("Accept", options.accept), ("User-Agent", USER_AGENT)];
        conn.initiate_request(Method::Get, url, &headers).map_err(connect_failed)?;
        system::feed_watchdog();
        conn.initiate_response().map_err(connect_failed)?;
        system::feed_watchdog();

        let status = conn.status();
        let content_length = conn.header("Content-Length").map(str::to_string);
        log::debug!("GET {} -> {} (Content-Length: {:?})", url, status, content_length);

        Ok(HttpResponse {
            status,
            content_length,
            body: EspHttpBody { conn },
        })
    }
}

/// The client reports a socket read timeout as `-ESP_ERR_HTTP_EAGAIN`, and
/// some wrappers pass the positive code through.
fn is_read_timeout(code: i32) -> bool {
    code.checked_abs() == Some(ESP_ERR_HTTP_EAGAIN as i32)
}

impl ByteSource for EspHttpBody {
    fn poll_read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        system::feed_watchdog();
        match self.conn.read(buf) {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e) if is_read_timeout(e.code()) => Ok(ReadOutcome::Pending),
            Err(e) => Err(dropped(e)),
        }
    }
}
