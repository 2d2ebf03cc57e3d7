// Application messages and their wire codec

pub mod codec;
pub mod types;

pub use codec::{decode, encode, DecodeError, EncodeError, MAX_MESSAGE_SIZE};
pub use types::Message;
