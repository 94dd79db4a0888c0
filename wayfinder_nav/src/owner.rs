// Marshalling work onto the owning context.
//
// Architecture: one owning context (the host's tick thread) holds the world
// and is the only place `NavHost` methods run. Workers never see the host;
// they send boxed `FnOnce(&mut H)` jobs over an `mpsc` channel and, when they
// need an answer, wait on a one-shot reply channel with a timeout. The host
// drains the channel once per tick through `OwnerQueue::drain` (exposed as
// `Navigator::pump`).
//
// If the owning context stalls or shuts down, `call` returns
// `NavError::OwnerUnavailable` after the timeout instead of blocking the
// worker forever. A late reply is dropped on the floor: the one-shot
// receiver is gone and the send fails silently.
//
// `OwnerAccess` abstracts "run this on the owning context" so worker-side
// tier logic can also be driven directly against a `parking_lot::Mutex<H>` in
// single-threaded tests.

use crate::error::NavError;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

/// A unit of work for the owning context.
pub type OwnerJob<H> = Box<dyn FnOnce(&mut H) + Send>;

/// Sending half: cheap to clone, handed to workers.
pub struct OwnerLink<H> {
    tx: Sender<OwnerJob<H>>,
    timeout: Duration,
}

impl<H> Clone for OwnerLink<H> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            timeout: self.timeout,
        }
    }
}

impl<H: 'static> OwnerLink<H> {
    /// Queue a job without waiting for it.
    pub fn post<F>(&self, job: F) -> Result<(), NavError>
    where
        F: FnOnce(&mut H) + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| NavError::OwnerUnavailable)
    }

    /// Queue a job and wait up to `timeout` for its result.
    pub fn call_with_timeout<R, F>(&self, job: F, timeout: Duration) -> Result<R, NavError>
    where
        F: FnOnce(&mut H) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.post(move |host| {
            let _ = reply_tx.send(job(host));
        })?;
        reply_rx
            .recv_timeout(timeout)
            .map_err(|_| NavError::OwnerUnavailable)
    }
}

/// Receiving half, held by the owning context.
pub struct OwnerQueue<H> {
    rx: Receiver<OwnerJob<H>>,
    link: OwnerLink<H>,
}

impl<H: 'static> OwnerQueue<H> {
    pub fn new(timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            rx,
            link: OwnerLink { tx, timeout },
        }
    }

    pub fn link(&self) -> OwnerLink<H> {
        self.link.clone()
    }

    /// Run every job queued so far. Jobs queued by the jobs themselves run in
    /// the same drain. Returns the number of jobs run.
    pub fn drain(&self, host: &mut H) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job(host);
            ran += 1;
        }
        ran
    }
}

/// Run a closure with exclusive access to the host.
pub trait OwnerAccess<H> {
    fn run<R, F>(&self, job: F) -> Result<R, NavError>
    where
        F: FnOnce(&mut H) -> R + Send + 'static,
        R: Send + 'static;
}

impl<H: 'static> OwnerAccess<H> for OwnerLink<H> {
    fn run<R, F>(&self, job: F) -> Result<R, NavError>
    where
        F: FnOnce(&mut H) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.call_with_timeout(job, self.timeout)
    }
}

impl<H> OwnerAccess<H> for parking_lot::Mutex<H> {
    fn run<R, F>(&self, job: F) -> Result<R, NavError>
    where
        F: FnOnce(&mut H) -> R + Send + 'static,
        R: Send + 'static,
    {
        Ok(job(&mut self.lock()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn posted_jobs_run_on_drain() {
        let queue: OwnerQueue<Vec<u32>> = OwnerQueue::new(Duration::from_millis(100));
        let link = queue.link();
        link.post(|v| v.push(1)).unwrap();
        link.post(|v| v.push(2)).unwrap();
        let mut host = Vec::new();
        assert_eq!(queue.drain(&mut host), 2);
        assert_eq!(host, vec![1, 2]);
        assert_eq!(queue.drain(&mut host), 0);
    }

    #[test]
    fn call_returns_value_from_owning_thread() {
        let queue: OwnerQueue<u32> = OwnerQueue::new(Duration::from_secs(5));
        let link = queue.link();
        let worker = thread::spawn(move || link.run(|n| *n * 2));
        let mut host = 21;
        let mut result = None;
        for _ in 0..500 {
            queue.drain(&mut host);
            if worker.is_finished() {
                result = Some(worker.join().unwrap());
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(result.unwrap().unwrap(), 42);
    }

    #[test]
    fn call_times_out_without_drain() {
        let queue: OwnerQueue<u32> = OwnerQueue::new(Duration::from_millis(20));
        let link = queue.link();
        let err = link.run(|n| *n).unwrap_err();
        assert!(matches!(err, NavError::OwnerUnavailable));
        // The late job still runs harmlessly when the owner catches up.
        let mut host = 7;
        assert_eq!(queue.drain(&mut host), 1);
    }

    #[test]
    fn mutex_access_runs_inline() {
        let host = parking_lot::Mutex::new(5u32);
        let doubled = host
            .run(|n| {
                *n *= 2;
                *n
            })
            .unwrap();
        assert_eq!(doubled, 10);
        assert_eq!(*host.lock(), 10);
    }
}
