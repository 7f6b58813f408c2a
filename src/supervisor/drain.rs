//! Waiting for a supervised group to quiesce.

use tracing::{debug, warn};

use super::group::SupervisedGroup;

/// Blocks until no foreground member of a group is alive.
///
/// Each pass takes a snapshot of the foreground members that are still
/// running or not yet joined and waits for every one of them. Members
/// started while a pass is running are picked up by the next pass; the
/// drain returns only after a pass finds nothing to wait for. Background
/// members are never waited for.
///
/// There is no timeout.
pub struct ThreadDrain<'a> {
    group: &'a SupervisedGroup,
}

impl<'a> ThreadDrain<'a> {
    pub fn new(group: &'a SupervisedGroup) -> Self {
        Self { group }
    }

    pub fn wait(&self) {
        if SupervisedGroup::current().is_some_and(|current| current.same_group(self.group)) {
            warn!(
                group = self.group.name(),
                "Refusing to drain a group from one of its own threads"
            );
            return;
        }

        let mut passes = 0usize;
        loop {
            let pending = self.group.pending_foreground();
            if pending.is_empty() {
                break;
            }
            passes += 1;

            for member in pending {
                match member.handle {
                    Some(handle) => {
                        if handle.join().is_err() {
                            warn!("Thread {} terminated abnormally", member.name);
                        }
                    }
                    None => self.group.wait_until_finished(member.id),
                }

                if self.group.is_alive(member.id) {
                    warn!("Unable to stop thread {}", member.name);
                }
            }
        }

        debug!(group = self.group.name(), passes, "Supervised group drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::ResourceSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn group() -> SupervisedGroup {
        SupervisedGroup::new("drain", ResourceSet::default())
    }

    #[test]
    fn test_drain_empty_group_returns() {
        let group = group();
        ThreadDrain::new(&group).wait();
        assert_eq!(group.live_threads(), 0);
    }

    #[test]
    fn test_drain_waits_for_nested_foreground_threads() {
        let group = group();
        let finished = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&finished);
        group
            .spawn("root", move || {
                for depth in 0..3 {
                    let counter = Arc::clone(&counter);
                    let current = SupervisedGroup::current().expect("inside group");
                    current.spawn(format!("child-{depth}"), move || {
                        thread::sleep(Duration::from_millis(20));
                        let grandchild = Arc::clone(&counter);
                        SupervisedGroup::current()
                            .expect("inside group")
                            .spawn(format!("grandchild-{depth}"), move || {
                                thread::sleep(Duration::from_millis(20));
                                grandchild.fetch_add(1, Ordering::SeqCst);
                                Ok(())
                            })?;
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })?;
                }
                Ok(())
            })
            .unwrap();

        ThreadDrain::new(&group).wait();

        assert_eq!(finished.load(Ordering::SeqCst), 6);
        assert_eq!(group.live_foreground_threads(), 0);
    }

    #[test]
    fn test_drain_ignores_background_threads() {
        let group = group();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        group
            .spawn_background("daemon", move || {
                release_rx.recv().ok();
                done_tx.send(()).ok();
                Ok(())
            })
            .unwrap();
        group.spawn("worker", || Ok(())).unwrap();

        ThreadDrain::new(&group).wait();

        assert_eq!(group.live_threads(), 1);
        assert_eq!(group.live_foreground_threads(), 0);

        release_tx.send(()).unwrap();
        done_rx.recv().unwrap();
    }

    #[test]
    fn test_drain_covers_threads_started_after_first_pass() {
        let group = group();
        let late_done = Arc::new(AtomicUsize::new(0));

        let flag = Arc::clone(&late_done);
        group
            .spawn("main", move || {
                thread::sleep(Duration::from_millis(30));
                SupervisedGroup::current()
                    .expect("inside group")
                    .spawn("late", move || {
                        thread::sleep(Duration::from_millis(30));
                        flag.store(1, Ordering::SeqCst);
                        Ok(())
                    })?;
                Ok(())
            })
            .unwrap();

        ThreadDrain::new(&group).wait();

        assert_eq!(late_done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drain_after_failures_still_waits() {
        let group = group();
        let slow_done = Arc::new(AtomicUsize::new(0));

        let flag = Arc::clone(&slow_done);
        group
            .spawn("slow", move || {
                thread::sleep(Duration::from_millis(40));
                flag.store(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        group
            .spawn("failing", || panic!("early failure"))
            .unwrap();

        ThreadDrain::new(&group).wait();

        assert_eq!(slow_done.load(Ordering::SeqCst), 1);
        assert!(group.has_failure());
    }

    #[test]
    fn test_drain_from_member_does_not_deadlock() {
        let group = group();
        let (tx, rx) = mpsc::channel();

        group
            .spawn("self-drain", move || {
                let current = SupervisedGroup::current().expect("inside group");
                ThreadDrain::new(&current).wait();
                tx.send(()).ok();
                Ok(())
            })
            .unwrap();

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        ThreadDrain::new(&group).wait();
    }
}
