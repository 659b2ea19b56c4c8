// Cell state machine for AI-column computation
//
// Every per-cell mutation is funneled through `cell_state_machine::transition`
// so run callbacks and manual edits share one rule table.

pub mod cell_state_machine;
pub mod errors;
pub mod events;
pub mod states;

pub use cell_state_machine::{determine_target_state, transition};
pub use errors::{StateMachineError, StateMachineResult};
pub use events::CellEvent;
pub use states::CellState;
