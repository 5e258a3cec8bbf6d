//! Receiver orchestration: buffer, converter and sink wired together.

mod dead_letter;
mod receiver;

pub use dead_letter::{DeadLetterQueue, DEFAULT_DEAD_LETTER_CAPACITY};
pub use receiver::{Receiver, ReceiverOptions};
