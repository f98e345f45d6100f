//! Server module - TCP acceptor, session registry and per-connection relays

pub mod connection;
mod listener;
mod registry;
mod relay;
mod session;

pub use connection::{Conduit, DeliveryError, Payload};
pub use listener::{RelayServer, ServerError};
pub use registry::{DeliveryReport, RegistryError, SessionRegistry};
pub use relay::{run_relay, RelayContext};
pub use session::{EvictionSignal, Recipient, Session, SessionId};
