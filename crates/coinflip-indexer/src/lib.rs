pub mod events;
pub mod poll;
pub mod projection;
pub mod reconcile;

pub use poll::Indexer;
pub use projection::Projector;
pub use reconcile::{ReconcileOutcome, Reconciler};
