#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The broker task has exited; its command channel is closed.
    #[error("broker stopped")]
    Stopped,

    /// The broker dropped a reply before answering.
    #[error("broker dropped reply for {0}")]
    ReplyDropped(&'static str),
}

impl BrokerError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::ReplyDropped(_) => "reply_dropped",
        }
    }
}
