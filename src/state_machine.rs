//! Dialog state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! `transition` never performs I/O, it only returns the next state and the
//! effects the runtime must carry out.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::{Command, Decision, Event, MessageRef};
pub use state::{DialogContext, DialogState, Draft};
pub use transition::transition;
