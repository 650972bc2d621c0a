//! Bidirectional chat surface: connection registry and the per-connection question loop.

mod connections;
mod endpoint;

pub use connections::{
    ConnectOutcome, ConnectionId, ConnectionManager, Delivery, GREETING, Outbound,
};
pub use endpoint::{
    NO_DOCUMENT_MESSAGE, handle_message, model_failure_message, transport_failure_message,
    websocket_handler,
};
