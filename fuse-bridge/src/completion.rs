//! Single-fire completion of one request

use crate::driver::{NativeDriver, RequestHandle};
use crate::errno::Errno;
use crate::opcode::OpCode;
use crate::pinned::PinnedBuffers;
use crate::reply::Signal;
use crate::types::PinnedBuffer;

use std::sync::Arc;
use std::time::Duration;

use async_std::task;
use crossbeam_utils::atomic::AtomicCell;
use futures::future::{AbortHandle, Abortable};
use tracing::debug;

/// Whether a request has been answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompletionState {
    Pending,
    Fired,
}

/// Guards the one signal a request may produce
///
/// The application handler and the deadline timer race to complete the
/// request; the first transition from `Pending` to `Fired` wins and the
/// other completion is dropped.
pub(crate) struct PendingCompletion {
    handle: RequestHandle,
    op: OpCode,
    state: AtomicCell<CompletionState>,
    timer: AtomicCell<Option<AbortHandle>>,
    driver: Arc<dyn NativeDriver>,
    pinned: Arc<PinnedBuffers>,
}

impl PendingCompletion {
    /// Starts guarding `handle`
    pub(crate) fn new(
        handle: RequestHandle,
        op: OpCode,
        driver: Arc<dyn NativeDriver>,
        pinned: Arc<PinnedBuffers>,
    ) -> Arc<Self> {
        Arc::new(Self {
            handle,
            op,
            state: AtomicCell::new(CompletionState::Pending),
            timer: AtomicCell::new(None),
            driver,
            pinned,
        })
    }

    /// Arms the deadline timer
    ///
    /// When it elapses first the request completes with `ETIMEDOUT`, carrying
    /// the pinned buffer for buffer families.
    pub(crate) fn arm(self: &Arc<Self>, deadline: Duration) {
        let (abort, registration) = AbortHandle::new_pair();
        self.timer.store(Some(abort));

        let this = Arc::clone(self);
        let _ = task::spawn(Abortable::new(
            async move {
                task::sleep(deadline).await;
                let fired = this.complete(|pinned| {
                    Signal::failure(this.op.family(), Errno::ETIMEDOUT, pinned)
                });
                if fired {
                    debug!(handle = ?this.handle, op = this.op.name(), ?deadline, "timed out");
                }
            },
            registration,
        ));
    }

    /// Completes the request unless it already completed
    ///
    /// `build` receives the released pinned buffer, if one was pinned.
    /// Returns whether this call produced the signal.
    pub(crate) fn complete(&self, build: impl FnOnce(Option<PinnedBuffer>) -> Signal) -> bool {
        let won = self
            .state
            .compare_exchange(CompletionState::Pending, CompletionState::Fired)
            .is_ok();
        if !won {
            debug!(handle = ?self.handle, op = self.op.name(), "late completion dropped");
            return false;
        }

        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let pinned = self.pinned.release(self.handle);
        deliver(Arc::clone(&self.driver), self.handle, build(pinned));
        true
    }
}

/// Hands `signal` to the driver from a fresh task
///
/// The caller's stack, which may be a native upcall, unwinds before the
/// driver is re-entered.
pub(crate) fn deliver(driver: Arc<dyn NativeDriver>, handle: RequestHandle, signal: Signal) {
    let _ = task::spawn(async move {
        debug!(?handle, result = signal.result(), "signal");
        driver.signal(handle, signal);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::SignalFamily;

    use std::io;
    use std::path::Path;
    use std::sync::Mutex;

    use crate::driver::NativeMount;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(RequestHandle, Signal)>>);

    impl NativeDriver for Recorder {
        fn mount(&self, _: NativeMount) -> io::Result<()> {
            Ok(())
        }
        fn unmount(&self, _: &Path) -> io::Result<()> {
            Ok(())
        }
        fn signal(&self, handle: RequestHandle, signal: Signal) {
            self.0.lock().unwrap().push((handle, signal));
        }
    }

    fn signals(recorder: &Recorder) -> Vec<(RequestHandle, Signal)> {
        recorder.0.lock().unwrap().clone()
    }

    #[test]
    fn only_the_first_completion_fires() {
        task::block_on(async {
            let recorder = Arc::new(Recorder::default());
            let pinned = Arc::new(PinnedBuffers::new());
            let handle = RequestHandle::from_raw(7);
            let completion =
                PendingCompletion::new(handle, OpCode::Unlink, recorder.clone(), pinned);

            assert!(completion.complete(|_| Signal::path(Ok(0))));
            assert!(!completion.complete(|_| Signal::path(Err(Errno::EIO))));
            assert_eq!(completion.state.load(), CompletionState::Fired);

            task::sleep(Duration::from_millis(50)).await;
            assert_eq!(signals(&recorder), vec![(handle, Signal::path(Ok(0)))]);
        });
    }

    #[test]
    fn timeout_returns_the_pinned_buffer() {
        task::block_on(async {
            let recorder = Arc::new(Recorder::default());
            let pinned = Arc::new(PinnedBuffers::new());
            let handle = RequestHandle::from_raw(8);
            let buf = PinnedBuffer::zeroed(64);
            pinned.pin(handle, buf.clone());

            let completion =
                PendingCompletion::new(handle, OpCode::Read, recorder.clone(), pinned.clone());
            completion.arm(Duration::from_millis(10));

            task::sleep(Duration::from_millis(100)).await;
            assert!(!completion.complete(|_| Signal::data(Ok(3), PinnedBuffer::zeroed(0))));
            assert!(pinned.is_empty());

            let got = signals(&recorder);
            assert_eq!(got.len(), 1);
            let signal = &got[0].1;
            assert_eq!(signal.family(), SignalFamily::Buffer);
            assert_eq!(signal.result(), Errno::ETIMEDOUT.as_raw());
            assert!(signal.buffer().unwrap().ptr_eq(&buf));
        });
    }

    #[test]
    fn completion_disarms_the_timer() {
        task::block_on(async {
            let recorder = Arc::new(Recorder::default());
            let pinned = Arc::new(PinnedBuffers::new());
            let handle = RequestHandle::from_raw(9);
            let completion =
                PendingCompletion::new(handle, OpCode::Access, recorder.clone(), pinned);
            completion.arm(Duration::from_millis(20));
            assert!(completion.complete(|_| Signal::path(Ok(0))));

            task::sleep(Duration::from_millis(80)).await;
            let got = signals(&recorder);
            assert_eq!(got.len(), 1);
            assert_eq!(got[0].1.result(), 0);
        });
    }
}
