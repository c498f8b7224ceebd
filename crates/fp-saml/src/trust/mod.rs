//! Peer trust: who sent a message, what they are bound to, and whether the
//! message is still fresh.

mod registry;
mod resolver;
mod timing;

pub use registry::{Certificates, Endpoint, EntityRegistry, InMemoryEntityRegistry, RemoteEntity};
pub use resolver::TrustResolver;
pub use timing::{TimingValidator, DEFAULT_MAX_AGE_SECONDS};
