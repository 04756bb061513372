//! The durable user operation pool: persistent store, in-memory projection,
//! admission validation and the uopool backend service.

mod error;
mod estimate;
mod mempool;
mod store;
mod uopool;
mod validate;

pub use error::{MempoolError, StoreError, UoPoolError, ValidationError};
pub use estimate::estimate_user_op_gas;
pub use mempool::{Mempool, PooledUserOperation};
pub use store::Store;
pub use uopool::UoPool;
pub use validate::UserOpValidator;
