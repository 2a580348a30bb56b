//! The dialogue layer: event normalization, menu construction, and the
//! transition table itself.

pub mod event;
pub mod machine;
pub mod menu;

pub use event::{Command, ControlToken, Event};
pub use machine::DialogueMachine;
