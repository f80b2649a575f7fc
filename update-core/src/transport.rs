//! HTTP transport seam and the bounded read loop shared by the oracle and
//! the image download.
//!
//! Redirects, TLS and sockets live behind [`HttpTransport`]. Everything above
//! it only sees a final status, an optional length header and a byte source.

use log::debug;

use crate::clock::Clock;
use crate::config::DownloadPolicy;
use crate::error::{TransportError, UpdateError};

/// Result of one non-blocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were copied into the front of the buffer.
    Data(usize),
    /// Nothing available yet, connection still open.
    Pending,
    /// The peer closed the connection.
    Closed,
}

pub trait ByteSource {
    fn poll_read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError>;
}

impl<B: ByteSource + ?Sized> ByteSource for Box<B> {
    fn poll_read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        (**self).poll_read(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions<'a> {
    pub follow_redirects: bool,
    pub accept: &'a str,
}

impl RequestOptions<'static> {
    pub const JSON: Self = Self {
        follow_redirects: true,
        accept: "application/json",
    };

    pub const BINARY: Self = Self {
        follow_redirects: true,
        accept: "application/octet-stream",
    };
}

/// Final response after any redirect chain has been followed.
pub struct HttpResponse<B> {
    pub status: u16,
    /// Raw `Content-Length` header, if the server sent one.
    pub content_length: Option<String>,
    pub body: B,
}

impl<B> HttpResponse<B> {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait HttpTransport {
    type Body: ByteSource;

    fn get(
        &mut self,
        url: &str,
        options: &RequestOptions<'_>,
    ) -> Result<HttpResponse<Self::Body>, TransportError>;
}

/// Length announced by the server for a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredLength {
    Known(u64),
    /// No length header; the stream ends when the connection closes.
    Unknown,
}

impl DeclaredLength {
    pub fn from_header(header: Option<&str>) -> Result<Self, UpdateError> {
        let Some(raw) = header else {
            return Ok(DeclaredLength::Unknown);
        };
        let value = raw.trim();
        if value.is_empty() {
            return Ok(DeclaredLength::Unknown);
        }
        // i64 first so a negative header is reported instead of a parse error
        match value.parse::<i64>() {
            Ok(n) if n >= 0 => Ok(DeclaredLength::Known(n as u64)),
            _ => Err(UpdateError::InvalidLength(value.to_string())),
        }
    }

    pub fn known(self) -> Option<u64> {
        match self {
            DeclaredLength::Known(n) => Some(n),
            DeclaredLength::Unknown => None,
        }
    }
}

impl core::fmt::Display for DeclaredLength {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DeclaredLength::Known(n) => write!(f, "{} bytes", n),
            DeclaredLength::Unknown => f.write_str("unknown length"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// How a pump run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// The sink asked to stop after `total` bytes.
    Stopped(u64),
    /// The source closed after `total` bytes.
    Closed(u64),
}

/// Reads `source` in chunks of at most `policy.chunk_size` bytes and hands
/// each chunk to `sink` in arrival order.
///
/// While the source has nothing available the control thread yields for
/// `poll_delay_ms`. A stall longer than `stall_timeout_ms`, or a run longer
/// than `session_timeout_ms`, ends with [`UpdateError::Timeout`].
pub fn pump<B, C, F>(
    source: &mut B,
    clock: &C,
    policy: &DownloadPolicy,
    sink: F,
) -> Result<PumpEnd, UpdateError>
where
    B: ByteSource + ?Sized,
    C: Clock + ?Sized,
    F: FnMut(&[u8]) -> Result<Flow, UpdateError>,
{
    pump_bounded(source, clock, policy, None, sink)
}

/// Like [`pump`], but never reads past `limit` bytes in total. Each read is
/// shrunk to what the limit still allows, so where the stream ends up split
/// has no effect on which bytes the sink sees. Reaching the limit ends the
/// run with [`PumpEnd::Stopped`].
pub fn pump_bounded<B, C, F>(
    source: &mut B,
    clock: &C,
    policy: &DownloadPolicy,
    limit: Option<u64>,
    mut sink: F,
) -> Result<PumpEnd, UpdateError>
where
    B: ByteSource + ?Sized,
    C: Clock + ?Sized,
    F: FnMut(&[u8]) -> Result<Flow, UpdateError>,
{
    let mut buf = vec![0u8; policy.chunk_size.max(1)];
    let started = clock.now_ms();
    let mut last_data = started;
    let mut total: u64 = 0;

    loop {
        let want = match limit {
            Some(limit) => {
                let left = usize::try_from(limit.saturating_sub(total)).unwrap_or(usize::MAX);
                left.min(buf.len())
            }
            None => buf.len(),
        };
        if want == 0 {
            return Ok(PumpEnd::Stopped(total));
        }

        let now = clock.now_ms();
        let elapsed = now.saturating_sub(started);
        if elapsed >= policy.session_timeout_ms {
            return Err(UpdateError::Timeout { waited_ms: elapsed });
        }

        match source.poll_read(&mut buf[..want])? {
            ReadOutcome::Data(n) if n > 0 => {
                let n = n.min(want);
                total += n as u64;
                last_data = clock.now_ms();
                if sink(&buf[..n])? == Flow::Stop {
                    return Ok(PumpEnd::Stopped(total));
                }
            }
            ReadOutcome::Data(_) | ReadOutcome::Pending => {
                let idle = now.saturating_sub(last_data);
                if idle >= policy.stall_timeout_ms {
                    debug!("Stream stalled after {} bytes", total);
                    return Err(UpdateError::Timeout { waited_ms: idle });
                }
                clock.delay_ms(policy.poll_delay_ms);
            }
            ReadOutcome::Closed => return Ok(PumpEnd::Closed(total)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;

    struct StepClock {
        now: Cell<u64>,
    }

    impl Clock for StepClock {
        fn now_ms(&self) -> u64 {
            self.now.get()
        }

        fn delay_ms(&self, ms: u32) {
            self.now.set(self.now.get() + ms as u64);
        }
    }

    struct Script(VecDeque<Result<ReadOutcome, TransportError>>, Vec<u8>);

    impl ByteSource for Script {
        fn poll_read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
            match self.0.pop_front() {
                Some(Ok(ReadOutcome::Data(n))) => {
                    let n = n.min(buf.len()).min(self.1.len());
                    buf[..n].copy_from_slice(&self.1[..n]);
                    self.1.drain(..n);
                    Ok(ReadOutcome::Data(n))
                }
                Some(other) => other,
                None => Ok(ReadOutcome::Pending),
            }
        }
    }

    fn clock() -> StepClock {
        StepClock { now: Cell::new(0) }
    }

    #[test]
    fn declared_length_parses_header_forms() {
        assert_eq!(DeclaredLength::from_header(None), Ok(DeclaredLength::Unknown));
        assert_eq!(DeclaredLength::from_header(Some(" 1000 ")), Ok(DeclaredLength::Known(1000)));
        assert_eq!(DeclaredLength::from_header(Some("0")), Ok(DeclaredLength::Known(0)));
        assert_eq!(
            DeclaredLength::from_header(Some("-1")),
            Err(UpdateError::InvalidLength("-1".to_string()))
        );
        assert!(DeclaredLength::from_header(Some("lots")).is_err());
    }

    #[test]
    fn pump_delivers_chunks_in_order_and_reports_close() {
        let data: Vec<u8> = (0..=255).collect();
        let mut source = Script(
            VecDeque::from(vec![
                Ok(ReadOutcome::Data(200)),
                Ok(ReadOutcome::Pending),
                Ok(ReadOutcome::Data(128)),
                Ok(ReadOutcome::Closed),
            ]),
            data.clone(),
        );
        let policy = DownloadPolicy::default();
        let mut received = Vec::new();
        let mut sizes = Vec::new();

        let end = pump(&mut source, &clock(), &policy, |chunk| {
            sizes.push(chunk.len());
            received.extend_from_slice(chunk);
            Ok(Flow::Continue)
        })
        .unwrap();

        assert_eq!(end, PumpEnd::Closed(256));
        assert_eq!(received, data);
        // 200 bytes available still yields a 128-byte read
        assert_eq!(sizes, vec![128, 128]);
    }

    #[test]
    fn pump_times_out_on_a_silent_stream() {
        let mut source = Script(VecDeque::new(), Vec::new());
        let policy = DownloadPolicy {
            poll_delay_ms: 10,
            stall_timeout_ms: 100,
            ..DownloadPolicy::default()
        };

        let err = pump(&mut source, &clock(), &policy, |_| Ok(Flow::Continue)).unwrap_err();
        assert_eq!(err, UpdateError::Timeout { waited_ms: 100 });
    }

    #[test]
    fn pump_stops_when_the_sink_asks() {
        let mut source = Script(
            VecDeque::from(vec![Ok(ReadOutcome::Data(10)), Ok(ReadOutcome::Data(10))]),
            vec![7u8; 20],
        );
        let end = pump(&mut source, &clock(), &DownloadPolicy::default(), |_| Ok(Flow::Stop)).unwrap();
        assert_eq!(end, PumpEnd::Stopped(10));
    }

    #[test]
    fn pump_surfaces_dropped_connections() {
        let mut source = Script(
            VecDeque::from(vec![Err(TransportError::Dropped("reset by peer".into()))]),
            Vec::new(),
        );
        let err = pump(&mut source, &clock(), &DownloadPolicy::default(), |_| Ok(Flow::Continue))
            .unwrap_err();
        assert!(matches!(err, UpdateError::Network(TransportError::Dropped(_))));
    }

    #[test]
    fn bounded_pump_shrinks_reads_to_the_limit() {
        let data = vec![3u8; 300];
        let mut source = Script(
            VecDeque::from(vec![Ok(ReadOutcome::Data(128)), Ok(ReadOutcome::Data(128)), Ok(ReadOutcome::Data(44))]),
            data,
        );
        let mut sizes = Vec::new();

        let end = pump_bounded(&mut source, &clock(), &DownloadPolicy::default(), Some(200), |chunk| {
            sizes.push(chunk.len());
            Ok(Flow::Continue)
        })
        .unwrap();

        assert_eq!(end, PumpEnd::Stopped(200));
        assert_eq!(sizes, vec![128, 72]);
        // the excess is left unread
        assert_eq!(source.1.len(), 100);
    }
}
