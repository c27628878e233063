/// Failure classification for inbound message processing.
///
/// The variant decides what happens to the message at the broker:
/// - `InvalidMessage`: redelivery cannot succeed (unknown event type, schema violation,
///   unprocessable content). The message is rejected and discarded.
/// - `Transient`: redelivery might succeed later (downstream outage, unexpected bug).
///   The message is requeued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// Permanent failure. The message is discarded without redelivery.
    InvalidMessage { reason: String },

    /// Transient failure. The message goes back to the queue.
    Transient { reason: String },
}

/// The only piece of state that crosses from the router back to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Permanent,
    Transient,
}

impl ProcessingError {
    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            reason: reason.into(),
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::InvalidMessage { reason } => reason,
            Self::Transient { reason } => reason,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidMessage { .. } => FailureKind::Permanent,
            Self::Transient { .. } => FailureKind::Transient,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind() == FailureKind::Permanent
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }

    pub fn error_type(&self) -> &'static str {
        self.kind().as_str()
    }
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Transient => "transient",
        }
    }
}

impl std::fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMessage { reason } => write!(f, "Invalid message: {}", reason),
            Self::Transient { reason } => write!(f, "Transient error: {}", reason),
        }
    }
}

impl std::error::Error for ProcessingError {}

impl From<serde_json::Error> for ProcessingError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_message(format!("Unable to decode event: {}", err))
    }
}
