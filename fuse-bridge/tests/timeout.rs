mod common;

use common::{mock, setup_tracing, EventLog};

use fuse_bridge::ops::OpPath;
use fuse_bridge::{
    Dispatcher, Errno, FileSystem, OpCode, PinnedBuffer, RawArgs, RequestHandle, Stat,
    TimeoutPolicy,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_std::task;

/// answers `getattr` after `delay`
fn slow_fs(delay: Duration) -> FileSystem {
    FileSystem::new().getattr(move |_: OpPath| async move {
        task::sleep(delay).await;
        Ok(Stat::file(0o644))
    })
}

#[test]
fn timeout_wins_and_late_completion_is_dropped() {
    setup_tracing();
    task::block_on(async {
        let (driver, mut signals) = mock(EventLog::default());
        let dispatcher = Dispatcher::new(
            Arc::new(slow_fs(Duration::from_millis(150))),
            driver,
            TimeoutPolicy::from_millis(50),
        );

        let handle = RequestHandle::from_raw(1);
        let start = Instant::now();
        dispatcher
            .dispatch(handle, OpCode::GetAttr.as_raw(), RawArgs::new().path("/f"))
            .unwrap();

        let (got, signal) = signals
            .next_within(Duration::from_millis(100))
            .await
            .expect("no timeout signal within 100ms");
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(got, handle);
        assert_eq!(signal.result(), Errno::ETIMEDOUT.as_raw());

        // the handler completes at 150ms
        assert!(signals
            .next_within(Duration::from_millis(250))
            .await
            .is_none());
    });
}

#[test]
fn completion_wins_and_timer_is_dropped() {
    task::block_on(async {
        let (driver, mut signals) = mock(EventLog::default());
        let dispatcher = Dispatcher::new(
            Arc::new(slow_fs(Duration::from_millis(10))),
            driver,
            TimeoutPolicy::from_millis(50),
        );

        let handle = RequestHandle::from_raw(1);
        dispatcher
            .dispatch(handle, OpCode::GetAttr.as_raw(), RawArgs::new().path("/f"))
            .unwrap();

        let (got, signal) = signals.next().await;
        assert_eq!(got, handle);
        assert_eq!(signal.result(), 0);

        assert!(signals
            .next_within(Duration::from_millis(150))
            .await
            .is_none());
    });
}

#[test]
fn handler_that_never_completes() {
    task::block_on(async {
        let (driver, mut signals) = mock(EventLog::default());
        let fs = FileSystem::new().read(|_| futures::future::pending());
        let dispatcher = Dispatcher::new(Arc::new(fs), driver, TimeoutPolicy::from_millis(50));

        let buf = PinnedBuffer::zeroed(4096);
        let handle = RequestHandle::from_raw(9);
        dispatcher
            .dispatch(
                handle,
                OpCode::Read.as_raw(),
                RawArgs::new().path("/f").len(4096).buf(buf.clone()),
            )
            .unwrap();
        assert_eq!(dispatcher.in_flight(), 1);

        let (_, signal) = signals
            .next_within(Duration::from_millis(100))
            .await
            .expect("no timeout signal within 100ms");
        assert_eq!(signal.result(), Errno::ETIMEDOUT.as_raw());
        assert!(signal.buffer().unwrap().ptr_eq(&buf));
        assert_eq!(dispatcher.in_flight(), 0);
    });
}

#[test]
fn per_operation_deadlines() {
    task::block_on(async {
        let (driver, mut signals) = mock(EventLog::default());
        let policy = TimeoutPolicy::Disabled.with(OpCode::GetAttr, Some(Duration::from_millis(20)));
        let fs = slow_fs(Duration::from_millis(100)).readlink(|_| async {
            task::sleep(Duration::from_millis(60)).await;
            Ok("/target".to_owned())
        });
        let dispatcher = Dispatcher::new(Arc::new(fs), driver, policy);

        dispatcher
            .dispatch(
                RequestHandle::from_raw(1),
                OpCode::GetAttr.as_raw(),
                RawArgs::new().path("/f"),
            )
            .unwrap();
        dispatcher
            .dispatch(
                RequestHandle::from_raw(2),
                OpCode::ReadLink.as_raw(),
                RawArgs::new().path("/l"),
            )
            .unwrap();

        let (first, signal) = signals.next().await;
        assert_eq!(first, RequestHandle::from_raw(1));
        assert_eq!(signal.result(), Errno::ETIMEDOUT.as_raw());

        let (second, signal) = signals.next().await;
        assert_eq!(second, RequestHandle::from_raw(2));
        assert_eq!(signal.result(), 0);

        assert!(signals
            .next_within(Duration::from_millis(150))
            .await
            .is_none());
    });
}

#[test]
fn every_buffer_operation_times_out_with_its_buffer() {
    task::block_on(async {
        let (driver, mut signals) = mock(EventLog::default());
        let fs = FileSystem::new()
            .write(|_| futures::future::pending())
            .getxattr(|_| futures::future::pending())
            .listxattr(|_| futures::future::pending());
        let dispatcher = Dispatcher::new(Arc::new(fs), driver, TimeoutPolicy::from_millis(30));

        let requests = vec![
            (OpCode::Write, RawArgs::new().path("/f"), PinnedBuffer::from(b"data".to_vec())),
            (OpCode::GetXAttr, RawArgs::new().path("/f").name("user.a"), PinnedBuffer::zeroed(64)),
            (OpCode::ListXAttr, RawArgs::new().path("/f"), PinnedBuffer::zeroed(64)),
        ];
        for (raw, (op, args, buf)) in (1..).zip(requests.iter().cloned()) {
            dispatcher
                .dispatch(RequestHandle::from_raw(raw), op.as_raw(), args.buf(buf))
                .unwrap();
        }
        assert_eq!(dispatcher.in_flight(), 3);

        for _ in 0..requests.len() {
            let (handle, signal) = signals.next().await;
            #[allow(clippy::as_conversions)]
            let (op, _, buf) = &requests[handle.as_raw() as usize - 1];
            assert_eq!(signal.result(), Errno::ETIMEDOUT.as_raw(), "{:?}", op);
            assert_eq!(signal.family(), op.family());
            assert!(signal.buffer().unwrap().ptr_eq(buf), "{:?}", op);
        }
        assert_eq!(dispatcher.in_flight(), 0);
    });
}
