use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Result, UpdateError};
use crate::progress::ProgressSink;

/// Reply a running instance sends after accepting a message.
pub const ACK: &str = "ACK";

/// Messaging link to a running instance of the target application.
pub trait InstanceChannel {
    /// Deliver `message`. `Ok(true)` when a live instance acknowledged it,
    /// `Ok(false)` when nothing is listening.
    fn send_message(&self, message: &str) -> io::Result<bool>;

    /// Whether an instance still accepts connections.
    fn is_alive(&self) -> bool;
}

/// The one place the updater suspends while something else happens.
pub trait Waiter {
    /// Block until `done` returns true or `timeout` elapses. Returns whether
    /// `done` was observed.
    fn wait_until(&self, timeout: Duration, done: &mut dyn FnMut() -> bool) -> bool;
}

/// Bounded number of rounds for the quit handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max: u32,
    used: u32,
}

impl RetryBudget {
    pub fn new(max: u32) -> Self {
        Self { max, used: 0 }
    }

    /// Claim the next attempt, numbered from 1.
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.used >= self.max {
            return None;
        }
        self.used += 1;
        Some(self.used)
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }
}

/// Asks a running instance to quit and waits for it to go away.
pub struct InstanceTerminator<'a> {
    pub channel: &'a dyn InstanceChannel,
    pub waiter: &'a dyn Waiter,
    pub app_title: &'a str,
    pub quit_message: &'a str,
    pub timeout: Duration,
    pub attempts: u32,
}

impl InstanceTerminator<'_> {
    /// Returns the number of rounds it took to see the application stopped.
    pub fn terminate(&self, sink: &mut dyn ProgressSink) -> Result<u32> {
        let mut budget = RetryBudget::new(self.attempts);

        while let Some(attempt) = budget.next_attempt() {
            sink.line(&format!(
                "Check for running instances of {}, attempt {}.",
                self.app_title, attempt
            ));

            match self.channel.send_message(self.quit_message) {
                Ok(false) => {
                    sink.line("The main application is not running.");
                    return Ok(attempt);
                }
                Ok(true) => sink.line("The main application is running. Quitting it."),
                Err(e) => {
                    tracing::warn!(error = %e, "instance did not acknowledge quit request");
                    sink.line(&format!(
                        "The main application did not answer properly ({}).",
                        e
                    ));
                }
            }

            sink.line(&format!(
                "Waiting for {} ms for main application to finish.",
                self.timeout.as_millis()
            ));

            let channel = self.channel;
            if self
                .waiter
                .wait_until(self.timeout, &mut || !channel.is_alive())
            {
                sink.line("The main application has finished.");
                return Ok(attempt);
            }
        }

        Err(UpdateError::InstanceStillRunning {
            app: self.app_title.to_string(),
            attempts: budget.used(),
        })
    }
}

/// Sleeps in short slices, showing a spinner on the terminal.
pub struct PollingWaiter {
    slice: Duration,
    show_spinner: bool,
}

impl PollingWaiter {
    pub fn new(show_spinner: bool) -> Self {
        Self {
            slice: Duration::from_millis(100),
            show_spinner,
        }
    }

    fn spinner(&self, timeout: Duration) -> ProgressBar {
        if !self.show_spinner {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("waiting up to {} ms", timeout.as_millis()));
        pb
    }
}

impl Waiter for PollingWaiter {
    fn wait_until(&self, timeout: Duration, done: &mut dyn FnMut() -> bool) -> bool {
        let spinner = self.spinner(timeout);
        let deadline = Instant::now() + timeout;

        let observed = loop {
            if done() {
                break true;
            }
            let now = Instant::now();
            if now >= deadline {
                break false;
            }
            thread::sleep(self.slice.min(deadline - now));
            spinner.tick();
        };

        spinner.finish_and_clear();
        observed
    }
}

/// Talks to the instance over a Unix domain socket, or a named pipe on
/// Windows, addressed by the application's instance id.
pub struct LocalSocketChannel {
    address: PathBuf,
    timeout: Duration,
}

impl LocalSocketChannel {
    pub fn new(instance_id: &str) -> Self {
        Self::at(default_address(instance_id))
    }

    pub fn at(address: PathBuf) -> Self {
        Self {
            address,
            timeout: Duration::from_millis(1000),
        }
    }
}

#[cfg(unix)]
fn default_address(instance_id: &str) -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(format!("{}.sock", instance_id))
}

#[cfg(windows)]
fn default_address(instance_id: &str) -> PathBuf {
    PathBuf::from(format!(r"\\.\pipe\{}", instance_id))
}

fn nobody_listening(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
    )
}

/// Write one message line and expect one `ACK` line back.
fn exchange<S: Read + Write>(stream: &mut S, message: &str) -> io::Result<bool> {
    stream.write_all(message.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;

    let mut reply = String::new();
    BufReader::new(stream).read_line(&mut reply)?;

    if reply.trim() == ACK {
        Ok(true)
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected reply '{}'", reply.trim()),
        ))
    }
}

#[cfg(unix)]
impl InstanceChannel for LocalSocketChannel {
    fn send_message(&self, message: &str) -> io::Result<bool> {
        use std::os::unix::net::UnixStream;

        let mut stream = match UnixStream::connect(&self.address) {
            Ok(stream) => stream,
            Err(e) if nobody_listening(&e) => return Ok(false),
            Err(e) => return Err(e),
        };
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        tracing::debug!(socket = %self.address.display(), message, "sending to instance");
        exchange(&mut stream, message)
    }

    fn is_alive(&self) -> bool {
        std::os::unix::net::UnixStream::connect(&self.address).is_ok()
    }
}

#[cfg(windows)]
impl InstanceChannel for LocalSocketChannel {
    fn send_message(&self, message: &str) -> io::Result<bool> {
        let mut pipe = match std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.address)
        {
            Ok(pipe) => pipe,
            Err(e) if nobody_listening(&e) => return Ok(false),
            Err(e) => return Err(e),
        };

        tracing::debug!(pipe = %self.address.display(), message, "sending to instance");
        exchange(&mut pipe, message)
    }

    fn is_alive(&self) -> bool {
        std::fs::OpenOptions::new()
            .read(true)
            .open(&self.address)
            .is_ok()
    }
}
