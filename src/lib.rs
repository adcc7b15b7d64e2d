#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # runguard
//!
//! Single-instance, lockable command-line commands with built-in profiling.
//!
//! Each run of a [`Command`] under a [`CommandRunner`]:
//! - holds an exclusive lock named after the command (a second concurrent
//!   run prints a notice and exits successfully)
//! - is timed by a single-shot [`Profiler`] that also samples peak memory
//! - ends with a two-line summary written to the console and the log, even
//!   when the command fails
//!
//! ```
//! use runguard::lock::InMemoryLockProvider;
//! use runguard::output::BufferedOutput;
//! use runguard::{Command, CommandIo, CommandRunner, Result, EXIT_CODE_OK};
//!
//! struct Import;
//!
//! impl Command for Import {
//!     fn name(&self) -> &str {
//!         "app:import"
//!     }
//!
//!     fn execute(&mut self, io: &mut CommandIo<'_>) -> Result<i32> {
//!         io.info("Imported %d rows", &[42_i32.into()])?;
//!         Ok(EXIT_CODE_OK)
//!     }
//! }
//!
//! let mut runner = CommandRunner::new(InMemoryLockProvider::new(), BufferedOutput::new());
//! assert_eq!(runner.run(&mut Import).ok(), Some(EXIT_CODE_OK));
//! assert_eq!(runner.output().lines()[0], "<info>Imported 42 rows</info>");
//! ```

pub mod config;
mod error;
pub mod format;
pub mod lock;
pub mod logging;
pub mod memory;
pub mod output;
pub mod process;
pub mod profiler;
pub mod report_log;
pub mod runner;

pub use error::{Error, Result};
pub use profiler::Profiler;
pub use runner::{
    ALREADY_RUNNING_MESSAGE, Command, CommandIo, CommandRunner, EXIT_CODE_ERROR_GENERIC,
    EXIT_CODE_OK,
};
