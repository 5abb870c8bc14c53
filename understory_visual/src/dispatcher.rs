// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Marshaling work onto the thread that owns a tree.
//!
//! Other threads never touch the tree directly. They post jobs through a
//! [`DispatcherHandle`]; the owner thread runs them with [`Tree::pump`],
//! typically once per frame before [`Tree::run_pass`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::tree::Tree;

/// Work posted to the owner thread.
pub type Job = Box<dyn FnOnce(&mut Tree) + Send>;

pub(crate) struct DispatcherQueue {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
}

impl DispatcherQueue {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }
}

/// A cloneable, thread-safe handle for posting work to a tree.
#[derive(Clone)]
pub struct DispatcherHandle {
    sender: Sender<Job>,
    owner: ThreadId,
}

impl fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("owner", &self.owner)
            .field("queued", &self.sender.len())
            .finish()
    }
}

impl DispatcherHandle {
    /// Queues a job for the owner thread.
    ///
    /// Returns `false` if the tree has been dropped.
    pub fn post(&self, job: impl FnOnce(&mut Tree) + Send + 'static) -> bool {
        self.sender.send(Box::new(job)).is_ok()
    }

    /// Returns `true` if called on the thread that owns the tree.
    #[must_use]
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Starts a repeating timer whose ticks run on the owner thread.
    ///
    /// Every `interval` a tick job is posted; `tick` runs when the owner
    /// thread pumps. At most one tick per timer is queued at a time: while a
    /// tick waits for the owner, later intervals are skipped. Ticks that are
    /// still queued when the timer is cancelled do nothing.
    pub fn start_timer(
        &self,
        interval: Duration,
        tick: impl FnMut(&mut Tree) + Send + 'static,
    ) -> Timer {
        let cancelled = Arc::new(AtomicBool::new(false));
        let queued = Arc::new(AtomicBool::new(false));
        let tick = Arc::new(Mutex::new(tick));
        let (stop, stopped) = crossbeam_channel::bounded::<()>(1);
        let handle = self.clone();
        let flag = cancelled.clone();
        let spawned = thread::Builder::new()
            .name("understory-timer".into())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    if queued.swap(true, Ordering::AcqRel) {
                        continue;
                    }
                    let tick = tick.clone();
                    let flag = flag.clone();
                    let queued = queued.clone();
                    let posted = handle.post(move |tree| {
                        queued.store(false, Ordering::Release);
                        if flag.load(Ordering::Acquire) {
                            return;
                        }
                        if let Ok(mut tick) = tick.lock() {
                            let tick = &mut *tick;
                            tick(tree);
                        }
                    });
                    if !posted {
                        break;
                    }
                }
            });
        let thread = match spawned {
            Ok(thread) => Some(thread),
            Err(err) => {
                tracing::error!(%err, "failed to spawn timer thread");
                None
            }
        };
        Timer {
            cancelled,
            stop: Some(stop),
            thread,
        }
    }
}

/// A repeating timer started with [`DispatcherHandle::start_timer`].
///
/// Dropping the timer cancels it.
pub struct Timer {
    cancelled: Arc<AtomicBool>,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Timer {
    /// Stops the timer and waits for its thread to exit.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    /// Returns `true` once the timer has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn shutdown(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(stop) = self.stop.take() {
            // Full only if a stop is already pending.
            let _ = stop.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                tracing::error!("timer thread panicked");
            }
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Tree {
    /// A handle for posting work to this tree from any thread.
    #[must_use]
    pub fn dispatcher(&self) -> DispatcherHandle {
        DispatcherHandle {
            sender: self.dispatcher.sender.clone(),
            owner: self.owner_thread,
        }
    }

    /// Returns `true` if called on the thread that owns the tree.
    #[must_use]
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner_thread
    }

    /// Runs `job` now if called on the owner thread, or queues it otherwise.
    ///
    /// Returns `true` if the job ran inline.
    pub fn run_or_post(&mut self, job: impl FnOnce(&mut Self) + Send + 'static) -> bool {
        if self.is_owner_thread() {
            job(self);
            true
        } else {
            self.dispatcher().post(job);
            false
        }
    }

    /// Runs the jobs that were queued when the pump started.
    ///
    /// Jobs posted while pumping, including by the jobs themselves, wait for
    /// the next call. Only the owner thread may pump; on other threads this
    /// logs a warning and runs nothing. Returns the number of jobs run.
    pub fn pump(&mut self) -> usize {
        if !self.is_owner_thread() {
            tracing::warn!("pump called from a thread that does not own the tree");
            return 0;
        }
        let queued = self.dispatcher.receiver.len();
        let mut ran = 0;
        while ran < queued {
            match self.dispatcher.receiver.try_recv() {
                Ok(job) => {
                    job(self);
                    ran += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        if ran > 0 {
            tracing::trace!(jobs = ran, "pumped dispatcher queue");
        }
        ran
    }

    /// Number of jobs waiting for [`Tree::pump`].
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.dispatcher.receiver.len()
    }
}
