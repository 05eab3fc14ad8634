//! Real-time gateway: a room-scoped broadcast dispatcher plus the
//! per-connection WebSocket loop that feeds it.

pub mod connection;
pub mod dispatcher;

pub use dispatcher::Dispatcher;
