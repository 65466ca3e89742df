extern crate self as spare_protocol;

mod block;
mod bytes;
mod coin;
mod error;
mod message;
mod pool_target;
mod proofs;
mod spend_bundle;
mod streamable;
mod weight_proof;

pub use block::*;
pub use bytes::*;
pub use coin::*;
pub use error::*;
pub use message::*;
pub use pool_target::*;
pub use proofs::*;
pub use spend_bundle::*;
pub use streamable::*;
pub use weight_proof::*;

pub use spare_derive::Streamable;
