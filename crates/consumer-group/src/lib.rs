//! Durable at-least-once reading of a stream through a consumer group.
//!
//! A [`GroupReader`] delivers each entry to exactly one consumer of the group
//! at a time. Entries stay pending until the caller completes their
//! [`Delivery`]; entries left pending by a consumer that stalls or crashes are
//! reclaimed by the others once idle for longer than the configured timeout.
//! Duplicates are possible and must be tolerated.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod constants;
mod delivery;
mod error;
mod options;
mod reader;
mod tail;

pub use delivery::{Completion, Delivery, DeliveryInfo, DeliveryOrigin};
pub use error::{Error, InvalidOptions};
pub use options::ReaderOptions;
pub use reader::{GroupReader, ReaderHandle};
pub use tail::StreamTail;
