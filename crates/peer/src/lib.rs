//! haven-peer – Peer-Verbindungen fuer Nachrichten und Video
//!
//! ## Architektur
//!
//! ```text
//! PeerConnectionRegistry (eine lebende Verbindung pro PeerId)
//!     |
//!     +-- PeerHandle        (Fassade pro Peer)
//!     |
//!     v
//! PeerConnection
//!     |  State Machine: New -> Connecting -> Connected <-> Disconnected
//!     |                 Failed, Closed
//!     |
//!     +-- Transport         (Plattform-Primitive, z.B. MemoryTransport)
//!     +-- SignalingSink     (Offer/Answer nach aussen)
//!     +-- ListenerSet       (on_message, on_remote_stream)
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod listener;
pub mod media;
pub mod memory;
pub mod message;
pub mod registry;
pub mod signaling;
pub mod state;
pub mod transport;

#[cfg(test)]
mod tests;

// Bequeme Re-Exporte
pub use config::{PeerConfig, RelayEndpoint};
pub use connection::PeerConnection;
pub use error::{PeerError, PeerResult};
pub use events::PeerEvent;
pub use listener::Subscription;
pub use media::{LocalStream, MediaSessionState, MediaTrack, RemoteStream, TrackKind};
pub use memory::{MemoryHandle, MemoryNetwork, MemoryTransportFactory};
pub use message::ChannelMessage;
pub use registry::{PeerConnectionRegistry, PeerHandle};
pub use signaling::{ChannelSignaling, SdpKind, SessionDescription, SignalingMessage, SignalingSink};
pub use state::PeerConnectionState;
pub use transport::{Transport, TransportEvent, TransportFactory, TransportState};
