//! Widget controller state machine
//!
//! Pure transitions over an immutable model snapshot. The runtime feeds
//! events in and executes the effects that come out.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{TurnState, WidgetContext, WidgetModel};
pub use transition::{transition, TransitionError, TransitionResult};
