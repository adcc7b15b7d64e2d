//! Built-in command bodies for the CLI

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use anyhow::anyhow;
use runguard::{Command, CommandIo, Result, EXIT_CODE_OK};
use std::thread;
use std::time::Duration;

/// Holds its lock for a fixed time. Handy for checking lock contention
/// from a second terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepCommand {
    name: String,
    millis: u64,
    fail: bool,
}

impl SleepCommand {
    pub fn new(name: impl Into<String>, millis: u64, fail: bool) -> Self {
        Self {
            name: name.into(),
            millis,
            fail,
        }
    }
}

impl Command for SleepCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, io: &mut CommandIo<'_>) -> Result<i32> {
        thread::sleep(Duration::from_millis(self.millis));
        io.info("Slept for %d ms", &[self.millis.into()])?;

        if self.fail {
            return Err(anyhow!("{} failed on request after {} ms", self.name, self.millis).into());
        }

        Ok(EXIT_CODE_OK)
    }
}
