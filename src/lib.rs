//! thread-relay - a chat bot that keeps one shared assistant thread
//!
//! Every inbound chat message is appended to a single long-lived assistant
//! thread. A cheap classifier decides whether the bot visibly answers;
//! messages it stays quiet on are still recorded, marked as ignored.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │   WhatsApp Cloud API  (webhook in, REST out)         │
//! └────────────────────┬─────────────────────────────────┘
//!                      │ mpsc
//! ┌────────────────────▼─────────────────────────────────┐
//! │   Dispatcher                                         │
//! │   intent → append → route (video | music | image)    │
//! └────────────────────┬─────────────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────────────┐
//! │   Assistants API thread  │  Spotify  │  transcripts  │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod assistant;
pub mod channels;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod integrations;
pub mod intent;
pub mod lifecycle;
pub mod links;
pub mod store;

pub use config::Config;
pub use daemon::Daemon;
pub use dispatch::{Dispatcher, IGNORE_MARKER, RoutingFlags, TypingDelay};
pub use error::{Error, Result};
