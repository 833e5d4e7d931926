pub mod amount;
pub mod config;
pub mod csv;
pub mod engine;
pub mod ledger;
pub mod model;

pub use amount::Amount;
pub use config::EngineConfig;
pub use engine::WalletEngine;
pub use ledger::Ledger;
pub use model::{AccountId, Command, OfferingId, PackageId, RequestId, TxnId};
