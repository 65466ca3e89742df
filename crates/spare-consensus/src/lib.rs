mod block_record;
mod block_rewards;
mod coin_view;
mod constants;
mod cost;
mod difficulty;
mod oracle;
mod pot_iterations;
mod signing;
mod validate_block;
mod validate_transaction;
mod validation_error;

pub use block_record::*;
pub use block_rewards::*;
pub use coin_view::*;
pub use constants::*;
pub use cost::*;
pub use difficulty::*;
pub use oracle::*;
pub use pot_iterations::*;
pub use signing::*;
pub use validate_block::*;
pub use validate_transaction::*;
pub use validation_error::*;
