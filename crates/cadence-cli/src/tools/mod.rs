//! Built-in tools

mod command;
mod weather;

pub use command::{CommandPolicy, CommandTool, ConfirmMode, StdinApprover};
pub use weather::WeatherTool;
