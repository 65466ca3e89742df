mod error;
mod fee_rate;
mod mempool;
mod mempool_item;

pub use error::*;
pub use fee_rate::*;
pub use mempool::*;
pub use mempool_item::*;
