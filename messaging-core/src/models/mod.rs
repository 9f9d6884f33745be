pub mod conversation;
pub mod message;
pub mod presence;
pub mod typing;

/// Opaque external identity. User records are owned by an identity
/// collaborator; the core only ever compares and stores these ids.
pub type UserId = String;

/// Reserved sender id for messages the core writes on its own behalf.
pub const SYSTEM_SENDER: &str = "system";
