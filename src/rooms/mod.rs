mod msg;
mod room;
pub(crate) mod ws;

pub use msg::{Message, MessageLog};
pub use room::{Directory, Room};
