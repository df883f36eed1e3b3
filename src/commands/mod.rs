//! # Command channel.
//!
//! - [`Command`] decoded inbound command
//! - [`CommandHandler`], [`HandlerFn`], [`LogCommands`] service hook
//! - [`CommandIntake`], [`CommandSubscription`] receive loop and its drain handle

mod command;
mod handler;
mod intake;

pub use command::Command;
pub use handler::{CommandHandler, HandlerFn, HandlerRef, LogCommands};
pub use intake::{CommandIntake, CommandSubscription, IntakeParams};
