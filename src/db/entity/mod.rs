pub mod transaction;
pub mod transfer;
pub mod wallet;

pub use transaction::Entity as Transaction;
pub use transfer::Entity as Transfer;
pub use wallet::Entity as Wallet;
