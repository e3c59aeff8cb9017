#![allow(dead_code)]

use fuse_bridge::{
    Dispatcher, MountHost, NativeDriver, NativeMount, OpCode, RawArgs, RequestHandle, Signal,
};

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use futures::channel::mpsc;
use futures::StreamExt;

pub fn setup_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Calls made to the mock collaborators, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Probe(PathBuf),
    ExternalUnmount(PathBuf),
    NativeMount { mount_point: PathBuf, options: String },
    NativeUnmount(PathBuf),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn events(log: &EventLog) -> Vec<Event> {
    log.lock().unwrap().clone()
}

/// A native driver that runs every request on its own thread
pub struct MockDriver {
    log: EventLog,
    signals: Mutex<mpsc::UnboundedSender<(RequestHandle, Signal)>>,
    dispatcher: Mutex<Option<Dispatcher>>,
    next_handle: AtomicU64,
    mount_error: Mutex<Option<io::ErrorKind>>,
    unmount_error: Mutex<Option<io::ErrorKind>>,
}

/// Signals received by a [`MockDriver`]
pub struct Signals(mpsc::UnboundedReceiver<(RequestHandle, Signal)>);

impl Signals {
    /// Waits for the next signal
    pub async fn next(&mut self) -> (RequestHandle, Signal) {
        async_std::future::timeout(Duration::from_secs(5), self.0.next())
            .await
            .expect("no signal within 5s")
            .expect("driver dropped")
    }

    /// Waits at most `within` for the next signal
    pub async fn next_within(&mut self, within: Duration) -> Option<(RequestHandle, Signal)> {
        async_std::future::timeout(within, self.0.next())
            .await
            .ok()
            .flatten()
    }

    /// Whether no signal is queued
    pub fn is_empty(&mut self) -> bool {
        self.0.try_next().is_err()
    }
}

pub fn mock(log: EventLog) -> (Arc<MockDriver>, Signals) {
    let (tx, rx) = mpsc::unbounded();
    let driver = MockDriver {
        log,
        signals: Mutex::new(tx),
        dispatcher: Mutex::new(None),
        next_handle: AtomicU64::new(1),
        mount_error: Mutex::new(None),
        unmount_error: Mutex::new(None),
    };
    (Arc::new(driver), Signals(rx))
}

impl MockDriver {
    pub fn fail_mount(&self, kind: io::ErrorKind) {
        *self.mount_error.lock().unwrap() = Some(kind);
    }

    pub fn fail_unmount(&self, kind: Option<io::ErrorKind>) {
        *self.unmount_error.lock().unwrap() = kind;
    }

    pub fn is_mounted(&self) -> bool {
        self.dispatcher.lock().unwrap().is_some()
    }

    /// Dispatches one request from a native thread, returning its handle
    pub fn request(&self, op: OpCode, args: RawArgs) -> RequestHandle {
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap()
            .clone()
            .expect("not mounted");
        let handle = RequestHandle::from_raw(self.next_handle.fetch_add(1, Ordering::SeqCst));
        thread::spawn(move || dispatcher.dispatch(handle, op.as_raw(), args))
            .join()
            .unwrap()
            .unwrap();
        handle
    }
}

impl NativeDriver for MockDriver {
    fn mount(&self, mount: NativeMount) -> io::Result<()> {
        self.log.lock().unwrap().push(Event::NativeMount {
            mount_point: mount.mount_point.clone(),
            options: mount.options.clone(),
        });
        if let Some(kind) = *self.mount_error.lock().unwrap() {
            return Err(io::Error::from(kind));
        }

        let dispatcher = mount.dispatcher;
        *self.dispatcher.lock().unwrap() = Some(dispatcher.clone());

        let handle = RequestHandle::from_raw(self.next_handle.fetch_add(1, Ordering::SeqCst));
        thread::spawn(move || dispatcher.dispatch(handle, OpCode::Init.as_raw(), RawArgs::new()))
            .join()
            .unwrap()
            .unwrap();
        Ok(())
    }

    fn unmount(&self, mount_point: &Path) -> io::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(Event::NativeUnmount(mount_point.to_owned()));
        if let Some(kind) = *self.unmount_error.lock().unwrap() {
            return Err(io::Error::from(kind));
        }
        *self.dispatcher.lock().unwrap() = None;
        Ok(())
    }

    fn signal(&self, handle: RequestHandle, signal: Signal) {
        // tests may drop the receiver early
        let _ = self
            .signals
            .lock()
            .unwrap()
            .unbounded_send((handle, signal));
    }
}

/// A mount host whose probe reports a configurable OS error
pub struct MockHost {
    log: EventLog,
    probe_errno: Option<i32>,
    unmount_error: Mutex<Option<io::ErrorKind>>,
}

impl MockHost {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            probe_errno: None,
            unmount_error: Mutex::new(None),
        }
    }

    /// A host whose mount point reports `errno` when probed
    pub fn stale(log: EventLog, errno: i32) -> Self {
        Self {
            probe_errno: Some(errno),
            ..Self::new(log)
        }
    }

    pub fn fail_unmount(&self, kind: Option<io::ErrorKind>) {
        *self.unmount_error.lock().unwrap() = kind;
    }
}

#[async_trait::async_trait]
impl MountHost for MockHost {
    async fn probe(&self, mount_point: &Path) -> io::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(Event::Probe(mount_point.to_owned()));
        match self.probe_errno {
            Some(code) => Err(io::Error::from_raw_os_error(code)),
            None => Ok(()),
        }
    }

    async fn unmount(&self, mount_point: &Path) -> io::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(Event::ExternalUnmount(mount_point.to_owned()));
        match *self.unmount_error.lock().unwrap() {
            Some(kind) => Err(io::Error::from(kind)),
            None => Ok(()),
        }
    }
}
