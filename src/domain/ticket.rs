use std::collections::HashMap;
use std::fmt;

/// Error codes the push service attaches to tickets and receipts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PushErrorCode {
    DeviceNotRegistered,
    InvalidCredentials,
    MessageTooBig,
    MessageRateExceeded,
    MismatchSenderId,
    Unknown(String),
}

impl PushErrorCode {
    #[must_use]
    pub fn parse(code: &str) -> Self {
        match code {
            "DeviceNotRegistered" => Self::DeviceNotRegistered,
            "InvalidCredentials" => Self::InvalidCredentials,
            "MessageTooBig" => Self::MessageTooBig,
            "MessageRateExceeded" => Self::MessageRateExceeded,
            "MismatchSenderId" => Self::MismatchSenderId,
            other => Self::Unknown(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::DeviceNotRegistered => "DeviceNotRegistered",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::MessageTooBig => "MessageTooBig",
            Self::MessageRateExceeded => "MessageRateExceeded",
            Self::MismatchSenderId => "MismatchSenderId",
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for PushErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider-reported failure for a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub code: Option<PushErrorCode>,
    pub message: String,
}

impl DeliveryFailure {
    #[must_use]
    pub fn new(code: Option<&str>, message: impl Into<String>) -> Self {
        Self { code: code.map(PushErrorCode::parse), message: message.into() }
    }

    #[must_use]
    pub fn code_label(&self) -> &str {
        self.code.as_ref().map_or("none", PushErrorCode::as_str)
    }
}

/// Synchronous acknowledgment of one submitted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ticket {
    /// Accepted; the final verdict arrives later as a receipt for `id`.
    Accepted { id: String },
    /// Rejected inline, no receipt will follow.
    Rejected(DeliveryFailure),
}

/// Delayed delivery verdict for an accepted ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receipt {
    Ok,
    Error(DeliveryFailure),
}

/// Ticket id -> originating endpoint token, built while dispatching one call.
///
/// Receipts are keyed by ticket id only, so this map is the sole link back to
/// the endpoint that a receipt verdict applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketMap {
    entries: HashMap<String, String>,
}

impl TicketMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ticket_id: String, token: String) {
        self.entries.insert(ticket_id, token);
    }

    #[must_use]
    pub fn endpoint_for(&self, ticket_id: &str) -> Option<&str> {
        self.entries.get(ticket_id).map(String::as_str)
    }

    #[must_use]
    pub fn ticket_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn extend(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
