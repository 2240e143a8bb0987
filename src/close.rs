//! WebSocket close status codes and their consumer-facing names.
//!
//! Codes 1000 and 1001 are normal closures; everything else is mapped to
//! a fixed name and reported through the socket's error event.

/// WebSocket close status code per RFC 6455 Section 7.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    NormalClosure,
    /// Going away (1001). Endpoint is shutting down or navigating away.
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Unsupported data (1003).
    UnsupportedData,
    /// Reserved (1004).
    Reserved,
    /// No status received (1005).
    NoStatusRecvd,
    /// Abnormal closure (1006). Connection dropped without a close frame.
    AbnormalClosure,
    /// Invalid frame payload data (1007).
    InvalidFramePayloadData,
    /// Policy violation (1008).
    PolicyViolation,
    /// Message too big (1009).
    MessageTooBig,
    /// Missing extension (1010).
    MissingExtension,
    /// Internal error (1011).
    InternalError,
    /// Service restart (1012).
    ServiceRestart,
    /// Try again later (1013).
    TryAgainLater,
    /// Bad gateway (1014).
    BadGateway,
    /// TLS handshake failure (1015).
    TlsHandshake,
    /// Any code outside the fixed table.
    Unknown(u16),
}

impl CloseCode {
    /// Map a numeric close code through the fixed table.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::NormalClosure,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1004 => CloseCode::Reserved,
            1005 => CloseCode::NoStatusRecvd,
            1006 => CloseCode::AbnormalClosure,
            1007 => CloseCode::InvalidFramePayloadData,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MissingExtension,
            1011 => CloseCode::InternalError,
            1012 => CloseCode::ServiceRestart,
            1013 => CloseCode::TryAgainLater,
            1014 => CloseCode::BadGateway,
            1015 => CloseCode::TlsHandshake,
            other => CloseCode::Unknown(other),
        }
    }

    /// The numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::NormalClosure => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::Reserved => 1004,
            CloseCode::NoStatusRecvd => 1005,
            CloseCode::AbnormalClosure => 1006,
            CloseCode::InvalidFramePayloadData => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MissingExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::ServiceRestart => 1012,
            CloseCode::TryAgainLater => 1013,
            CloseCode::BadGateway => 1014,
            CloseCode::TlsHandshake => 1015,
            CloseCode::Unknown(code) => *code,
        }
    }

    /// The name reported on error events for this code.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            CloseCode::NormalClosure => "NORMAL_CLOSURE",
            CloseCode::GoingAway => "GOING_AWAY",
            CloseCode::ProtocolError => "PROTOCOL_ERROR",
            CloseCode::UnsupportedData => "UNSUPPORTED_DATA",
            CloseCode::Reserved => "RESERVED",
            CloseCode::NoStatusRecvd => "NO_STATUS_RECVD",
            CloseCode::AbnormalClosure => "ABNORMAL_CLOSURE",
            CloseCode::InvalidFramePayloadData => "INVALID_FRAME_PAYLOAD_DATA",
            CloseCode::PolicyViolation => "POLICY_VIOLATION",
            CloseCode::MessageTooBig => "MESSAGE_TOO_BIG",
            CloseCode::MissingExtension => "MISSING_EXTENSION",
            CloseCode::InternalError => "INTERNAL_ERROR",
            CloseCode::ServiceRestart => "SERVICE_RESTART",
            CloseCode::TryAgainLater => "TRY_AGAIN_LATER",
            CloseCode::BadGateway => "BAD_GATEWAY",
            CloseCode::TlsHandshake => "TLS_HANDSHAKE",
            CloseCode::Unknown(_) => "UNKNOWN_CODE",
        }
    }

    /// Whether this code represents a normal closure (1000 or 1001).
    ///
    /// Normal closures destroy the socket silently; all other codes are
    /// reported as errors first.
    #[must_use]
    pub const fn is_normal(&self) -> bool {
        matches!(self, CloseCode::NormalClosure | CloseCode::GoingAway)
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
