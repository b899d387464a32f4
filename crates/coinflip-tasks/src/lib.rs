pub mod accept_task;
pub mod cancel_task;
pub mod confirm;
pub mod create_task;

pub use accept_task::AcceptBetTask;
pub use cancel_task::CancelBetTask;
pub use confirm::{poll_confirmation, ConfirmOutcome, PollWindow};
pub use create_task::CreateBetTask;
