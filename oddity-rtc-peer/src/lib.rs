pub mod app;
pub mod engine;
pub mod error;
pub mod events;
pub mod media;
pub mod peer;
pub mod renderer;
pub mod runtime;
pub mod session;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use events::{EventStream, Notification, SessionEvent, Subscriber, SubscriberRef};
pub use peer::{Peer, SessionHandle};
pub use renderer::{BindingSnapshot, RendererBinding, Slot};
pub use session::{ConnectionId, Role, SessionState};
