//! Retro Network Library
//!
//! Peer-to-peer synchronization for the retro board.
//!
//! # Architecture
//!
//! - **Engine**: owns the board replica, authorizes local actions and
//!   applies inbound messages
//! - **Transport**: TCP channels carrying length-prefixed JSON messages
//! - **Node**: single task tying engine, transport and auto-save together
//!
//! # Usage
//!
//! ```ignore
//! let transport = Transport::new();
//! let listener = transport.listen(DEFAULT_PORT).await?;
//! let engine = SyncEngine::host("alice", PeerAddress::new(addr), 3);
//! let mut node = Node::spawn(engine, transport, Some(listener), store, settings, debounce);
//!
//! node.apply(LocalAction::AddCard { text: "Great sprint".into(), category: Category::Good }).await?;
//! while let Some(event) = node.next_event().await {
//!     match event {
//!         NodeEvent::Refresh(what) => { /* redraw */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod engine;
pub mod error;
mod frame;
pub mod invite;
pub mod node;
pub mod protocol;
pub mod transport;

pub use engine::{ChannelId, ChannelPhase, LocalAction, Refresh, SyncEngine};
pub use error::{Error, Result};
pub use invite::JoinLink;
pub use node::{BoardView, Node, NodeEvent, NodeHandle};
pub use protocol::Message;
pub use transport::{Connector, Listener, Transport, TransportEvent};

/// Default port for retro hosts
pub const DEFAULT_PORT: u16 = retro_core::config::DEFAULT_LISTEN_PORT;
