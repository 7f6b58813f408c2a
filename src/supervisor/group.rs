//! Supervised thread groups.
//!
//! A [`SupervisedGroup`] owns every thread spawned through it. Threads
//! started by a member through [`SupervisedGroup::current`] (or the
//! [`spawn`](crate::supervisor::spawn) helpers) join the same group, so the
//! group covers everything the entry point transitively starts.
//!
//! Each member body runs under `catch_unwind`. A panic or an `Err` return is
//! handed to the group's failure handler, which keeps the first failure and
//! only logs the rest. Unwinding with [`ForcedTermination`] is not a failure.

use std::any::Any;
use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::boundary::ResourceSet;

thread_local! {
    static CURRENT: RefCell<Option<SupervisedGroup>> = const { RefCell::new(None) };
}

/// Panic payload marking a thread that was stopped on purpose.
///
/// Unwinding with this payload is never recorded as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForcedTermination;

/// Stops the current thread by unwinding with [`ForcedTermination`].
///
/// The panic hook is not invoked.
pub fn terminate_current_thread() -> ! {
    panic::resume_unwind(Box::new(ForcedTermination))
}

/// The first uncaught failure observed in a supervised group.
#[derive(Debug, thiserror::Error)]
pub enum CapturedFailure {
    #[error("thread `{thread}` panicked: {message}")]
    Panic { thread: String, message: String },

    #[error("thread `{thread}` failed")]
    Error {
        thread: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
}

impl CapturedFailure {
    /// Builds a failure from an error returned by a member body.
    pub fn from_error(thread: impl Into<String>, error: anyhow::Error) -> Self {
        Self::Error {
            thread: thread.into(),
            source: error.into(),
        }
    }

    /// Builds a failure from a panic payload.
    pub fn from_panic(thread: impl Into<String>, payload: &(dyn Any + Send)) -> Self {
        Self::Panic {
            thread: thread.into(),
            message: panic_message(payload),
        }
    }

    /// Name of the thread that failed.
    pub fn thread(&self) -> &str {
        match self {
            Self::Panic { thread, .. } | Self::Error { thread, .. } => thread,
        }
    }

    /// The panic message or the top-level error message.
    pub fn message(&self) -> String {
        match self {
            Self::Panic { message, .. } => message.clone(),
            Self::Error { source, .. } => source.to_string(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

struct Member {
    id: u64,
    name: String,
    background: bool,
    alive: bool,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Members {
    next_id: u64,
    entries: Vec<Member>,
}

/// A member still to be waited for, as seen by one drain pass.
pub(super) struct PendingMember {
    pub id: u64,
    pub name: String,
    pub handle: Option<JoinHandle<()>>,
}

struct GroupInner {
    name: String,
    boundary: ResourceSet,
    members: Mutex<Members>,
    member_exited: Condvar,
    failure: Mutex<Option<CapturedFailure>>,
}

/// A named concurrency domain with centralized failure capture.
///
/// Cloning is cheap; clones refer to the same group.
#[derive(Clone)]
pub struct SupervisedGroup {
    inner: Arc<GroupInner>,
}

impl fmt::Debug for SupervisedGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisedGroup")
            .field("name", &self.inner.name)
            .field("live_threads", &self.live_threads())
            .finish()
    }
}

impl SupervisedGroup {
    pub fn new(name: impl Into<String>, boundary: ResourceSet) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                name: name.into(),
                boundary,
                members: Mutex::new(Members::default()),
                member_exited: Condvar::new(),
                failure: Mutex::new(None),
            }),
        }
    }

    /// The group the calling thread belongs to, if any.
    pub fn current() -> Option<SupervisedGroup> {
        CURRENT.with(|current| current.borrow().clone())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The isolated boundary visible to members of this group.
    pub fn boundary(&self) -> &ResourceSet {
        &self.inner.boundary
    }

    /// True if both handles refer to the same group.
    pub fn same_group(&self, other: &SupervisedGroup) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Starts a foreground member. The drain waits for it.
    pub fn spawn<F>(&self, name: impl Into<String>, body: F) -> io::Result<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.spawn_member(name.into(), false, body)
    }

    /// Starts a background member. The drain does not wait for it.
    pub fn spawn_background<F>(&self, name: impl Into<String>, body: F) -> io::Result<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.spawn_member(name.into(), true, body)
    }

    fn spawn_member<F>(&self, name: String, background: bool, body: F) -> io::Result<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        // Registered before the thread exists so a concurrent drain pass
        // cannot miss it.
        let id = self.register(&name, background);
        let group = self.clone();
        let thread_name = name.clone();

        let spawned = thread::Builder::new().name(name).spawn(move || {
            let _exit = ExitGuard {
                inner: Arc::clone(&group.inner),
                id,
            };
            CURRENT.with(|current| *current.borrow_mut() = Some(group.clone()));

            match panic::catch_unwind(AssertUnwindSafe(body)) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    group.report_failure(CapturedFailure::from_error(&thread_name, error))
                }
                Err(payload) => group.report_panic(&thread_name, payload.as_ref()),
            }
        });

        match spawned {
            Ok(handle) => {
                let mut members = self.members();
                match members.entries.iter_mut().find(|m| m.id == id) {
                    Some(member) => member.handle = Some(handle),
                    // Already finished and pruned; nothing left to join.
                    None => drop(handle),
                }
                Ok(())
            }
            Err(e) => {
                self.members().entries.retain(|m| m.id != id);
                self.inner.member_exited.notify_all();
                Err(e)
            }
        }
    }

    fn register(&self, name: &str, background: bool) -> u64 {
        let mut members = self.members();
        let id = members.next_id;
        members.next_id += 1;
        members.entries.push(Member {
            id,
            name: name.to_string(),
            background,
            alive: true,
            handle: None,
        });
        debug!(group = %self.inner.name, thread = name, background, "Registered thread");
        id
    }

    /// Failure handler for panics unwinding out of a member.
    pub fn report_panic(&self, thread: &str, payload: &(dyn Any + Send)) {
        if payload.is::<ForcedTermination>() {
            debug!(group = %self.inner.name, thread, "Thread was forcefully terminated");
            return;
        }
        self.report_failure(CapturedFailure::from_panic(thread, payload));
    }

    /// Failure handler. Keeps the first failure; later ones are only logged.
    pub fn report_failure(&self, failure: CapturedFailure) {
        warn!(group = %self.inner.name, thread = failure.thread(), "{}", failure_chain(&failure));

        let mut slot = self
            .inner
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(failure);
        }
    }

    /// True once a failure has been captured.
    pub fn has_failure(&self) -> bool {
        self.inner
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Removes and returns the captured failure.
    pub fn take_failure(&self) -> Option<CapturedFailure> {
        self.inner
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Number of members (foreground and background) still running.
    pub fn live_threads(&self) -> usize {
        self.members().entries.iter().filter(|m| m.alive).count()
    }

    /// Number of foreground members still running.
    pub fn live_foreground_threads(&self) -> usize {
        self.members()
            .entries
            .iter()
            .filter(|m| m.alive && !m.background)
            .count()
    }

    fn members(&self) -> MutexGuard<'_, Members> {
        self.inner
            .members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Prunes finished members and takes the join handles of every
    /// foreground member that is alive or not yet joined.
    pub(super) fn pending_foreground(&self) -> Vec<PendingMember> {
        let mut members = self.members();
        members.entries.retain(|m| m.alive || m.handle.is_some());
        members
            .entries
            .iter_mut()
            .filter(|m| !m.background)
            .map(|m| PendingMember {
                id: m.id,
                name: m.name.clone(),
                handle: m.handle.take(),
            })
            .collect()
    }

    /// Blocks until member `id` has exited. Spurious wakeups are absorbed.
    pub(super) fn wait_until_finished(&self, id: u64) {
        let mut members = self.members();
        while members.entries.iter().any(|m| m.id == id && m.alive) {
            members = self
                .inner
                .member_exited
                .wait(members)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(super) fn is_alive(&self, id: u64) -> bool {
        self.members().entries.iter().any(|m| m.id == id && m.alive)
    }
}

/// Marks a member as exited, including when its body unwinds.
struct ExitGuard {
    inner: Arc<GroupInner>,
    id: u64,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut members = self
            .inner
            .members
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(member) = members.entries.iter_mut().find(|m| m.id == self.id) {
            member.alive = false;
        }
        drop(members);
        self.inner.member_exited.notify_all();
    }
}

fn failure_chain(failure: &CapturedFailure) -> String {
    let mut text = failure.to_string();
    let mut source = failure.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
