use std::io::Write;
use std::fs::File;

/// A simple logger.
/// Messages go to stderr when the verbosity allows it, and always into
/// the log file when one is configured.
#[derive(Debug)]
pub struct Logger {
    verbosity: u32,
    log_file: Option<File>
}

impl Logger {
    /// Create a new logger.
    pub fn new(verbosity: u32, log_file: Option<File>) -> Self
    {
        Self {
            verbosity,
            log_file,
        }
    }

    /// Log a message, with a specified level.
    pub fn log(&mut self, level: u32, msg: &str)
    {
        if self.verbosity >= level {
            eprintln!("{}", msg);
        }

        self.to_file(msg);
    }

    /// Record one incident line.
    /// Incidents always reach the log file; stderr needs at least -v.
    pub fn error(&mut self, msg: &str)
    {
        if self.verbosity >= 1 {
            eprintln!("{}", msg);
        }

        self.to_file(msg);
    }

    fn to_file(&mut self, msg: &str)
    {
        if let Some(log_file) = &mut self.log_file {
            writeln!(log_file, "{}", msg).unwrap_or_else(|_| {
                eprintln!("error: couldn't write into the log file")
            });
        }
    }
}
