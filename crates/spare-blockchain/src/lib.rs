mod blockchain;
mod coin_store;
mod error;
mod fork_choice;
mod spend_set;
mod store;
mod weight_proof;

pub use blockchain::*;
pub use coin_store::*;
pub use error::*;
pub use fork_choice::*;
pub use spend_set::*;
pub use store::*;
pub use weight_proof::*;
