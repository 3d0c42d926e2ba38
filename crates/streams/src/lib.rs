//! Abstract interface for issuing consumer-group commands against an
//! append-only stream log.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod commands;
mod entry;
mod error;
mod id;

pub use commands::{GroupCreation, ReadWait, StreamCommands};
pub use entry::{ConsumerId, Entry, PendingEntry};
pub use error::{ErrorKind, ParseError, StreamCommandsError};
pub use id::{Cursor, StreamId};
