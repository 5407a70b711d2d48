//! Background capture thread
//!
//! The sniffer owns the capture primitive for the duration of a run and
//! is the only writer of captured packets. Ownership of the accumulated
//! capture transfers to the caller atomically at [`Sniffer::stop`]
//! through an mpsc channel, so no lock is ever part of the public
//! contract.

use super::{CapturedPacket, PacketSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How long a single capture poll blocks before re-checking shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Back-off after a transient capture error so a persistent failure does
/// not spin the thread.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Continuously captures packets on its own thread for one run window.
pub struct Sniffer {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
    rx: Receiver<CapturedPacket>,
}

impl Sniffer {
    /// Launch the capture loop on a new thread.
    ///
    /// The source must already be open: failure to open the capture
    /// primitive is a fatal configuration error the caller reports
    /// before any probe is sent.
    pub fn start(mut source: Box<dyn PacketSource>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let stop_flag = Arc::clone(&shutdown);

        let handle = std::thread::spawn(move || loop {
            let draining = stop_flag.load(Ordering::Acquire);
            // After stop() is signalled, keep polling with a minimal
            // timeout until the source runs dry so nothing in flight at
            // the capture layer is dropped.
            let timeout = if draining {
                Duration::from_millis(1)
            } else {
                POLL_INTERVAL
            };
            match source.recv(timeout) {
                Ok(Some((bytes, from))) => {
                    let packet = CapturedPacket {
                        bytes,
                        from,
                        timestamp: Instant::now(),
                    };
                    if tx.send(packet).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    if draining {
                        break;
                    }
                }
                Err(e) => {
                    if draining {
                        break;
                    }
                    // Transient read errors are not fatal to the run.
                    crate::debug_print!(1, "transient capture error: {e:#}");
                    std::thread::sleep(ERROR_BACKOFF);
                }
            }
        });

        Self {
            handle,
            shutdown,
            rx,
        }
    }

    /// Signal the capture thread, join it, and hand over everything it
    /// captured, in arrival order. No further writes can occur once this
    /// returns.
    pub fn stop(self) -> Vec<CapturedPacket> {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.handle.join();
        self.rx.try_iter().collect()
    }
}
