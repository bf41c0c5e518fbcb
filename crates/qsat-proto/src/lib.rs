pub mod heartbeat;

pub use heartbeat::{decode, encode, ArmIntent, DecodeError, Message};
