//! # Line Bridge
//!
//! Drives the device link one line at a time. Each line is classified, fully
//! processed, and reported before the next read:
//!
//! - `TIME:` is answered with the host clock's epoch seconds, CRLF-terminated.
//! - A line starting with a configured frame prefix (`95`, `96`) is hex-decoded,
//!   decoded as MessagePack and, for key registrations, verified.
//! - Anything else is diagnostic text and is passed through unchanged.
//!
//! Every outcome except a time sync yields exactly one operator line. Codec
//! and schema failures are reported per line and never end the loop; end of
//! stream ends it cleanly.

use crate::config::LineBridgeConfig;
use crate::core::encoding::{decode_frame, DecodedFrame};
use crate::core::line_codec::{InboundLine, LineCodec};
use crate::error::{BridgeError, Result};
use crate::protocol::message::{Envelope, KeyRegistration, ProtocolVariant, SenderId};
use crate::protocol::verifier::{self, VerificationResult};
use crate::utils::clock::{Clock, HostClock};
use crate::utils::metrics::{Metrics, Timer};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

/// Prefix of a device time request
pub const TIME_REQUEST_PREFIX: &str = "TIME:";

/// What a line is, judged by its prefix alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    TimeRequest,
    Frame,
    Diagnostic,
}

/// Classify a line by prefix. Frame prefixes compare case-insensitively.
pub fn classify(line: &str, frame_prefixes: &[String]) -> LineKind {
    if line.starts_with(TIME_REQUEST_PREFIX) {
        return LineKind::TimeRequest;
    }
    let is_frame = frame_prefixes.iter().any(|prefix| {
        !prefix.is_empty()
            && line
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    });
    if is_frame {
        LineKind::Frame
    } else {
        LineKind::Diagnostic
    }
}

/// How a decoded frame was understood
#[derive(Debug)]
pub enum FrameKind {
    /// Key registration, with its verdict unless verification is disabled
    Registration {
        registration: Box<KeyRegistration>,
        verdict: Option<VerificationResult>,
    },
    /// Any other known envelope; its signature is not checked
    Message {
        variant: ProtocolVariant,
        sender: SenderId,
        payload_type: u64,
    },
    /// Decodable, but not a message shape this bridge knows
    Unrecognized(BridgeError),
}

/// Operator report for one frame line
#[derive(Debug)]
pub struct FrameReport {
    /// Raw hex as received, when echoing is enabled
    pub hex: Option<String>,
    /// Rendered decoded value
    pub decoded: String,
    pub kind: FrameKind,
}

impl FrameReport {
    pub fn verdict(&self) -> Option<&VerificationResult> {
        match &self.kind {
            FrameKind::Registration { verdict, .. } => verdict.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for FrameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(hex) = &self.hex {
            write!(f, "{hex} -> ")?;
        }
        write!(f, "{} | ", self.decoded)?;
        match &self.kind {
            FrameKind::Registration {
                registration,
                verdict,
            } => {
                write!(
                    f,
                    "key registration from {} ({}): ",
                    hex::encode(&registration.info.device_id),
                    registration.info.algorithm
                )?;
                match verdict {
                    Some(verdict) => write!(f, "{verdict}"),
                    None => f.write_str("not verified"),
                }
            }
            FrameKind::Message {
                variant,
                sender,
                payload_type,
            } => write!(
                f,
                "{variant} message type {payload_type:#04x} from {sender}: signature not verified"
            ),
            FrameKind::Unrecognized(error) => {
                write!(f, "unrecognized message [{}]: {error}", error.kind())
            }
        }
    }
}

/// Result of processing one inbound line
#[derive(Debug)]
pub enum LineOutcome {
    /// `TIME:` answered with these epoch seconds
    TimeSync { seconds: i64 },
    Frame(FrameReport),
    /// Frame line that could not be decoded
    Malformed { error: BridgeError },
    /// Line longer than the length limit, dropped before classification
    Overlong { discarded: usize },
    /// Text passed through verbatim
    Diagnostic(String),
}

impl LineOutcome {
    /// The line shown to the operator, if any
    pub fn operator_line(&self) -> Option<String> {
        match self {
            LineOutcome::TimeSync { .. } => None,
            LineOutcome::Frame(report) => Some(report.to_string()),
            LineOutcome::Malformed { error } => {
                Some(format!("malformed frame [{}]: {error}", error.kind()))
            }
            LineOutcome::Overlong { discarded } => Some(format!(
                "malformed line: {discarded} bytes dropped, longer than the line length limit"
            )),
            LineOutcome::Diagnostic(text) => Some(text.clone()),
        }
    }
}

/// Line-at-a-time bridge between a device link and the operator
pub struct LineBridge<C: Clock = HostClock> {
    config: LineBridgeConfig,
    clock: C,
    metrics: Metrics,
    read_timeout: Option<Duration>,
}

impl LineBridge<HostClock> {
    /// Bridge answering time requests from the host clock in the configured mode.
    pub fn new(config: LineBridgeConfig) -> Self {
        let clock = HostClock::new(config.clock);
        Self::with_clock(config, clock)
    }
}

impl<C: Clock> LineBridge<C> {
    pub fn with_clock(config: LineBridgeConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            metrics: Metrics::new(),
            read_timeout: None,
        }
    }

    /// Fail with `TransportTimeout` when no line arrives within `timeout`.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn config(&self) -> &LineBridgeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Process one line read from the transport.
    pub fn handle_inbound(&self, inbound: InboundLine) -> LineOutcome {
        match inbound {
            InboundLine::Text(line) => self.handle_line(&line),
            InboundLine::Overlong { discarded } => {
                self.metrics.line_received(discarded as u64);
                self.metrics.line_overlong();
                warn!(discarded, "Dropped overlong line");
                LineOutcome::Overlong { discarded }
            }
        }
    }

    /// Process one line of text, terminator already stripped.
    pub fn handle_line(&self, line: &str) -> LineOutcome {
        self.metrics.line_received(line.len() as u64);
        let kind = classify(line, &self.config.frame_prefixes);
        debug!(?kind, length = line.len(), "Line received");

        match kind {
            LineKind::TimeRequest => {
                let seconds = self.clock.now();
                self.metrics.time_request();
                info!(seconds, clock = %self.config.clock, "Answering time request");
                LineOutcome::TimeSync { seconds }
            }
            LineKind::Frame => match self.process_frame(line) {
                Ok(report) => LineOutcome::Frame(report),
                Err(error) => {
                    self.metrics.frame_malformed();
                    warn!(error = %error, "Malformed frame");
                    LineOutcome::Malformed { error }
                }
            },
            LineKind::Diagnostic => {
                self.metrics.diagnostic();
                LineOutcome::Diagnostic(line.to_string())
            }
        }
    }

    fn process_frame(&self, line: &str) -> Result<FrameReport> {
        let _timer = Timer::start("process_frame");
        let hex_text = line.trim();
        let raw = hex::decode(hex_text)
            .map_err(|e| BridgeError::MalformedEncoding(format!("invalid hex: {e}")))?;
        let frame = decode_frame(raw)?;
        self.metrics.frame_decoded();

        let kind = self.interpret_frame(&frame);
        Ok(FrameReport {
            hex: self.config.echo_raw_hex.then(|| hex_text.to_string()),
            decoded: frame.value.to_string(),
            kind,
        })
    }

    fn interpret_frame(&self, frame: &DecodedFrame) -> FrameKind {
        let envelope = match Envelope::parse(frame.value.clone()) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(error = %error, "Unrecognized frame");
                return FrameKind::Unrecognized(error);
            }
        };

        if !envelope.is_key_registration() {
            self.metrics.message_unverified();
            return FrameKind::Message {
                variant: envelope.variant,
                sender: envelope.sender,
                payload_type: envelope.payload_type,
            };
        }

        match KeyRegistration::try_from(envelope) {
            Ok(registration) => {
                let verdict = self
                    .config
                    .verify_registrations
                    .then(|| self.check_registration(&frame.raw, &registration));
                FrameKind::Registration {
                    registration: Box::new(registration),
                    verdict,
                }
            }
            Err(error) => {
                warn!(error = %error, "Key registration payload rejected");
                FrameKind::Unrecognized(error)
            }
        }
    }

    fn check_registration(&self, raw: &[u8], registration: &KeyRegistration) -> VerificationResult {
        let mut verdict = verifier::verify(raw, registration);
        if verdict.is_valid() && self.config.enforce_validity {
            verdict = verifier::check_validity(&registration.info, self.clock.now());
        }

        self.metrics.registration_checked(verdict.is_valid());
        match &verdict {
            VerificationResult::Valid => info!(
                device_id = %hex::encode(&registration.info.device_id),
                "Key registration verified"
            ),
            VerificationResult::Invalid(reason) => warn!(
                device_id = %hex::encode(&registration.info.device_id),
                reason = %reason,
                "Key registration rejected"
            ),
        }
        verdict
    }

    /// Run the bridge until the transport closes.
    ///
    /// Time replies go back over `transport`; operator lines go to `output`.
    /// End of stream returns `Ok(())`. A read timeout, a failed operator write,
    /// or a transport fault other than a disconnect is returned as an error.
    #[instrument(skip_all, fields(clock = %self.config.clock))]
    pub async fn run<T, W>(&self, transport: &mut Framed<T, LineCodec>, output: &mut W) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("Bridge session started");
        let result = loop {
            let inbound = match self.next_line(transport).await {
                Ok(inbound) => inbound,
                Err(BridgeError::TransportClosed) => {
                    info!("Transport closed");
                    break Ok(());
                }
                Err(e) => break Err(e),
            };

            let outcome = self.handle_inbound(inbound);

            if let LineOutcome::TimeSync { seconds } = &outcome {
                match transport.send(seconds.to_string()).await {
                    Ok(()) => {}
                    Err(BridgeError::Io(e)) if is_disconnect(&e) => {
                        info!("Transport closed while answering time request");
                        break Ok(());
                    }
                    Err(e) => break Err(e),
                }
            }

            if let Some(text) = outcome.operator_line() {
                if let Err(e) = write_operator_line(output, &text).await {
                    break Err(e);
                }
            }
        };

        self.metrics.log_metrics();
        result
    }

    async fn next_line<T>(&self, transport: &mut Framed<T, LineCodec>) -> Result<InboundLine>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let next = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, transport.next())
                .await
                .map_err(|_| BridgeError::TransportTimeout(limit))?,
            None => transport.next().await,
        };

        match next {
            Some(Ok(inbound)) => Ok(inbound),
            Some(Err(BridgeError::Io(e))) if is_disconnect(&e) => Err(BridgeError::TransportClosed),
            Some(Err(e)) => Err(e),
            None => Err(BridgeError::TransportClosed),
        }
    }
}

fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof
    )
}

async fn write_operator_line<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
