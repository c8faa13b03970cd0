pub mod broker;
pub mod decisions;
pub mod errors;
pub mod events;
pub mod log;
pub mod notify;
pub mod pending;
pub mod sessions;

pub use broker::{Broker, BrokerConfig, BrokerHandle};
pub use decisions::{
    ContinueMarker, Decision, DecisionOutcome, ResponseAction, ResponseOutcome, UserResponse,
    TIMEOUT_REASON,
};
pub use errors::BrokerError;
pub use events::{Event, EventKind, NewEvent};
pub use log::EventLog;
pub use notify::{Notification, Snapshot, Stats};
pub use pending::{PendingSlots, Settled, Ticket};
pub use sessions::{Session, SessionChange, SessionRegistry};
