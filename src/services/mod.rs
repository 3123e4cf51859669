pub mod auth;
pub mod rate;
pub mod transfer;
pub mod wallet;

pub use auth::AuthService;
pub use rate::{RateOracle, RateService};
pub use transfer::TransferService;
pub use wallet::WalletService;
