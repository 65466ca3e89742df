mod config;
mod error;
mod logging;
mod node;
mod verifier;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use node::*;
pub use verifier::*;
