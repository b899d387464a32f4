pub mod message;
pub mod relayer;
pub mod signer;

pub use message::{Action, Fee, TxBuilder};
pub use relayer::{ActionClass, RelayMode, RelayResult, Relayer};
pub use signer::RelayerSigner;
