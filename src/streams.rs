//! Suppression of the process's standard streams.
//!
//! The command strategy silences everything a command or kernel prints while
//! keeping a handle on the original streams for its own output:
//!
//! ```text
//!   fd 1 ──dup──► original stdout (File)      fd 1 ◄──dup2── /dev/null
//!   fd 2 ──dup──► original stderr (File)      fd 2 ◄──dup2── /dev/null
//! ```
//!
//! Only one [`SuppressedStreams`] may exist per redirector at a time. Dropping
//! it releases ownership; the descriptors stay pointed at `/dev/null`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::debug;

const NULL_DEVICE: &str = "/dev/null";

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Another suppression is in effect on the same descriptors.
    #[error("standard streams are already redirected")]
    AlreadyHeld,

    #[error("failed to redirect {stream}")]
    Redirect {
        stream: &'static str,
        #[source]
        source: io::Error,
    },
}

impl StreamError {
    fn redirect(stream: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Redirect { stream, source }
    }
}

/// Owner of a stdout/stderr descriptor pair.
#[derive(Debug, Clone)]
pub struct StreamRedirector {
    stdout: RawFd,
    stderr: RawFd,
    held: Arc<AtomicBool>,
}

static PROCESS: OnceLock<StreamRedirector> = OnceLock::new();

impl StreamRedirector {
    /// The redirector for this process's fd 1 and fd 2.
    pub fn process() -> Self {
        PROCESS
            .get_or_init(|| Self::for_descriptors(io::stdout().as_raw_fd(), io::stderr().as_raw_fd()))
            .clone()
    }

    /// A redirector over arbitrary descriptors. The caller keeps them open
    /// for as long as the redirector is used.
    pub fn for_descriptors(stdout: RawFd, stderr: RawFd) -> Self {
        Self {
            stdout,
            stderr,
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Points both descriptors at `/dev/null`, returning handles to what
    /// they pointed at before.
    pub fn suppress(&self) -> Result<SuppressedStreams, StreamError> {
        if self
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StreamError::AlreadyHeld);
        }

        match self.redirect() {
            Ok((stdout, stderr)) => {
                debug!(stdout = self.stdout, stderr = self.stderr, "Standard streams suppressed");
                Ok(SuppressedStreams {
                    stdout,
                    stderr,
                    held: Arc::clone(&self.held),
                })
            }
            Err(e) => {
                self.held.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn redirect(&self) -> Result<(File, File), StreamError> {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();

        let stdout = duplicate(self.stdout).map_err(StreamError::redirect("stdout"))?;
        let stderr = duplicate(self.stderr).map_err(StreamError::redirect("stderr"))?;

        let null = OpenOptions::new()
            .write(true)
            .open(NULL_DEVICE)
            .map_err(StreamError::redirect("stdout"))?;
        silence(
            null.as_raw_fd(),
            &[("stdout", self.stdout, &stdout), ("stderr", self.stderr, &stderr)],
        )?;

        Ok((stdout, stderr))
    }
}

/// Points every target at `null`. If one fails, the targets already
/// replaced are pointed back at their saved originals.
fn silence(null: RawFd, targets: &[(&'static str, RawFd, &File)]) -> Result<(), StreamError> {
    for (done, &(stream, target, _)) in targets.iter().enumerate() {
        if let Err(source) = replace(null, target) {
            for &(restored, fd, original) in &targets[..done] {
                if let Err(e) = replace(original.as_raw_fd(), fd) {
                    debug!("Unable to restore {}: {}", restored, e);
                }
            }
            return Err(StreamError::Redirect { stream, source });
        }
    }
    Ok(())
}

/// Handles to the streams in place before suppression.
#[derive(Debug)]
pub struct SuppressedStreams {
    stdout: File,
    stderr: File,
    held: Arc<AtomicBool>,
}

impl SuppressedStreams {
    pub fn stdout(&self) -> &File {
        &self.stdout
    }

    pub fn stderr(&self) -> &File {
        &self.stderr
    }
}

impl Drop for SuppressedStreams {
    fn drop(&mut self) {
        let _ = self.stdout.flush();
        let _ = self.stderr.flush();
        self.held.store(false, Ordering::Release);
    }
}

/// A private handle on this process's stderr, unaffected by later
/// suppression of fd 2.
pub fn host_stderr() -> io::Result<File> {
    io::stderr().as_fd().try_clone_to_owned().map(File::from)
}

fn duplicate(fd: RawFd) -> io::Result<File> {
    // SAFETY: dup only reads the descriptor number.
    let copy = unsafe { libc::dup(fd) };
    if copy < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `copy` is a fresh descriptor owned by nobody else.
    Ok(unsafe { File::from_raw_fd(copy) })
}

fn replace(source: RawFd, target: RawFd) -> io::Result<()> {
    // SAFETY: dup2 only reads the two descriptor numbers.
    if unsafe { libc::dup2(source, target) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
