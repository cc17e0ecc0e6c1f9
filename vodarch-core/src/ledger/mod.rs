mod error;
mod models;
mod store;

pub use error::{LedgerError, LedgerResult};
pub use models::LedgerEntry;
pub use store::{SqliteLedgerStore, SqliteLedgerStoreBuilder};
