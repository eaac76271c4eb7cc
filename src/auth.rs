//! Auth-domain identifiers, token secrets, and credential models.

pub mod id;
pub mod token;

pub use id::*;
pub use token::{code::*, secret::*, tenant::*, user::*};
