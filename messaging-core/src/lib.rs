//! Direct/group messaging core.
//!
//! Conversation and message lifecycle, delivery/read-receipt tracking,
//! ephemeral presence and typing state, full-text message search, and
//! retention sweeping. Transport framing, identity, durable storage and push
//! delivery are external collaborators: storage binds at the
//! [`repository`] traits, notification fan-out at the
//! [`events::EventSink`] trait.

pub mod config;
pub mod error;
pub mod events;
pub mod locks;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod services;
pub mod state;

pub use crate::config::CoreConfig;
pub use crate::error::{AppError, AppResult};
pub use crate::events::{ChannelEventSink, CoreEvent, EventSink, NullEventSink};
pub use crate::state::MessagingCore;
