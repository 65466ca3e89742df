mod block_tools;
mod key_pairs;
mod mock_oracle;
mod transaction;

pub use block_tools::*;
pub use key_pairs::*;
pub use mock_oracle::*;
pub use transaction::*;

/// A fixed local time, comfortably after any timestamp [`BlockTools`] produces.
pub const TEST_NOW: u64 = 2_000_000_000;
