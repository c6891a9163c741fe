pub mod assembler;
pub mod console;
pub mod controller;
pub mod history;
pub mod services;

pub use assembler::{CompletedTurn, TurnAssembler};
pub use console::{Command, Console, LineConfirm, TerminalView};
pub use controller::{ArcController, Controller, ControllerOptions, ControllerState, SubmitOutcome};
pub use history::Confirm;
