//! Credential models minted by the broker.

pub mod code;
pub mod secret;
pub mod tenant;
pub mod user;
