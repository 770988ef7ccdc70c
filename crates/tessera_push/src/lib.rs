//! # Tessera Push
//!
//! Keeps connected clients in sync with the data their pages show.
//!
//! ```text
//!  save/destroy ──▶ ChangeHub ──▶ ChangeBuffer (per client)
//!                                     │ push()
//!                                     ▼
//!                    find_dirty ──▶ rerender_node ──▶ swap ──▶ Publisher
//! ```
//!
//! - [`ClientSession`]: principal, push channel, rendered trees
//! - [`find_dirty`]: change snapshot against node dependencies
//! - [`Pusher`]: render and update cycles under the client's policies
//! - [`Publisher`]: crossbeam and tokio broadcast delivery

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod dirty;
pub mod error;
pub mod publisher;
pub mod pusher;
pub mod session;

pub use dirty::{find_dirty, find_dirty_below, is_dirty};
pub use error::{PublishError, PublishResult, PushError, PushResult};
pub use publisher::{BroadcastPublisher, ChannelPublisher, Envelope, Publisher};
pub use pusher::{AttachedView, PushStats, Pusher};
pub use session::ClientSession;
