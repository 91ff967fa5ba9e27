pub mod models;
pub mod store;

pub use store::{Created, SellOrderStore, SqliteStore, TransactionStore};
