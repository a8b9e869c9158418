//! Connection Acceptor
//!
//! Drives the accept loop against the listening socket.
//!
//! ## Architecture
//! - Single accept loop on the calling thread
//! - Worker thread pool draining accepted handles from a channel
//! - The first accept failure stops the loop and is returned to the
//!   caller, who decides between rebuilding the listener and shutting
//!   down

use std::sync::Arc;
use std::thread;

use crossbeam::channel;

use crate::error::Result;
use crate::table::Handle;

use super::overlay::Overlay;

/// Accept-loop driver for a listening overlay
pub struct Acceptor {
    overlay: Arc<Overlay>,
    workers: usize,
}

impl Acceptor {
    /// Create an acceptor over a bound, listening overlay
    pub fn new(overlay: Arc<Overlay>, workers: usize) -> Self {
        Self {
            overlay,
            workers: workers.max(1),
        }
    }

    /// Accept a single connection
    pub fn accept_one(&self) -> Result<Handle> {
        self.overlay.accept()
    }

    /// Accept until the listener fails, dispatching each connection
    ///
    /// Blocks the calling thread. Every accepted handle is queued to
    /// the worker pool, which runs `handler` on it; the handler owns
    /// the connection from there, including releasing it. Returns the
    /// accept error that stopped the loop, after the workers have
    /// drained the queue and exited.
    pub fn serve<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(Arc<Overlay>, Handle) + Send + Sync + 'static,
    {
        let (tx, rx) = channel::unbounded::<Handle>();
        let handler = Arc::new(handler);

        let mut pool = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let rx = rx.clone();
            let overlay = Arc::clone(&self.overlay);
            let handler = Arc::clone(&handler);

            pool.push(thread::spawn(move || {
                tracing::trace!(worker = id, "worker started");
                while let Ok(handle) = rx.recv() {
                    handler(Arc::clone(&overlay), handle);
                }
                tracing::trace!(worker = id, "worker stopped");
            }));
        }
        drop(rx);

        let result = loop {
            match self.overlay.accept() {
                Ok(handle) => {
                    // Fails only if every worker is gone.
                    if tx.send(handle).is_err() {
                        tracing::warn!("no workers left, stopping accept loop");
                        break Ok(());
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept loop stopped");
                    break Err(e);
                }
            }
        };

        drop(tx);
        for worker in pool {
            let _ = worker.join();
        }

        result
    }
}
