//! Domain models for mirrored mail entities

mod checkpoint;
mod contact;
mod email;

pub use checkpoint::Checkpoint;
pub use contact::{Company, Person};
pub use email::{Attachment, Email, EmailAddress, EmailBuilder, MessageId, ThreadId};
