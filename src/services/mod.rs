pub mod pipeline;
pub mod reconciler;
pub mod settlement;
pub mod state_machine;
