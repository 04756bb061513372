//! EntryPoint contract binding and the chain service the bundler's other
//! components talk to.

mod entry_point;
mod error;
pub mod gen;
#[cfg(feature = "test-utils")]
pub mod mock;
mod service;

pub use entry_point::EntryPoint;
pub use error::{decode_entry_point_revert, ChainError, EntryPointRevert};
pub use service::{ChainService, EthereumChain, GasFees, SimulationOutcome};
