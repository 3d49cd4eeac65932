//! Account lifecycle: status machine, aging, collector operations

pub mod service;
pub mod status;

pub use service::AccountService;
pub use status::{AccountStatus, AgingBucket};
