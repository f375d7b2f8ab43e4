pub mod command_executor;

pub use command_executor::{CommandOutput, CommandRunner, ExecutorError, ProcessRunner};
