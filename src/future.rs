// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Runtime-agnostic [`Future`] helpers: cooperative yielding, sleeping,
//! timeouts and catching of handler failures.

use std::{
    any::Any,
    convert::Infallible,
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::mpsc::{self, RecvTimeoutError},
    task, thread,
    time::Duration,
};

use futures::{channel::oneshot, future::Then, FutureExt as _};
use pin_project::pin_project;

/// Wakes the current task and returns [`task::Poll::Pending`] once.
///
/// Workers yield between scenarios, so one long queue doesn't starve the
/// others polled on the same executor.
pub(crate) const fn yield_now() -> YieldNow {
    YieldNow(false)
}

/// [`Future`] returned by the [`yield_now()`] function.
#[derive(Clone, Copy, Debug)]
pub(crate) struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Self::Output> {
        if self.0 {
            task::Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            task::Poll::Pending
        }
    }
}

/// Return type of a [`FutureExt::then_yield()`] method.
type ThenYield<F, O> = Then<F, YieldThenReturn<O>, fn(O) -> YieldThenReturn<O>>;

/// Extensions of a [`Future`], used inside this crate.
pub(crate) trait FutureExt: Future + Sized {
    /// Yields after this [`Future`] is resolved allowing other [`Future`]s
    /// making progress.
    fn then_yield(self) -> ThenYield<Self, Self::Output> {
        self.then(YieldThenReturn::new)
    }
}

impl<T: Future> FutureExt for T {}

/// [`Future`] returning a [`task::Poll::Pending`] once, before returning a
/// contained value.
#[derive(Debug)]
#[pin_project]
pub(crate) struct YieldThenReturn<V> {
    /// Value to be returned.
    value: Option<V>,

    /// [`YieldNow`] [`Future`].
    r#yield: YieldNow,
}

impl<V> YieldThenReturn<V> {
    /// Creates a new [`YieldThenReturn`] [`Future`].
    const fn new(v: V) -> Self {
        Self { value: Some(v), r#yield: yield_now() }
    }
}

impl<V> Future for YieldThenReturn<V> {
    type Output = V;

    fn poll(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Self::Output> {
        let this = self.project();
        task::ready!(this.r#yield.poll_unpin(cx));
        this.value.take().map_or(task::Poll::Pending, task::Poll::Ready)
    }
}

/// Resolves once the given [`Duration`] elapses.
///
/// The waiting happens on a helper thread, so this works on any executor.
/// Dropping the returned [`Sleep`] early wakes that thread up, so it exits
/// right away instead of outliving the wait.
pub fn sleep(dur: Duration) -> Sleep {
    let (fire, fired) = oneshot::channel();
    let (cancel, cancelled) = mpsc::channel::<Infallible>();
    drop(thread::spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(dur) {
            _ = fire.send(());
        }
    }));
    Sleep { fired, _cancel: cancel }
}

/// [`Future`] returned by the [`sleep()`] function.
#[derive(Debug)]
pub struct Sleep {
    /// Resolves once the helper thread is done waiting.
    fired: oneshot::Receiver<()>,

    /// Never sends anything. Dropping it disconnects the helper thread's
    /// channel, cutting its wait short.
    _cancel: mpsc::Sender<Infallible>,
}

impl Future for Sleep {
    type Output = ();

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Self::Output> {
        self.fired.poll_unpin(cx).map(drop)
    }
}

/// Marker of a [`Timeout`] that elapsed before its [`Future`] resolved.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Elapsed(pub Duration);

/// Bounds the given `future` by `after`.
///
/// The wrapped [`Future`] is polled first, so one that is ready right at the
/// deadline still wins. On expiry the [`Future`] is dropped, which only
/// abandons it: work it has already handed off elsewhere keeps running.
pub fn timeout<F: Future>(after: Duration, future: F) -> Timeout<F> {
    Timeout { future, deadline: sleep(after), after }
}

/// [`Future`] returned by the [`timeout()`] function.
#[pin_project]
pub struct Timeout<F> {
    /// Bounded [`Future`].
    #[pin]
    future: F,

    /// Resolves when the bound elapses.
    deadline: Sleep,

    /// The bound itself.
    after: Duration,
}

impl<F> fmt::Debug for Timeout<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeout").field("after", &self.after).finish_non_exhaustive()
    }
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output, Elapsed>;

    fn poll(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Self::Output> {
        let this = self.project();
        if let task::Poll::Ready(out) = this.future.poll(cx) {
            return task::Poll::Ready(Ok(out));
        }
        this.deadline
            .poll_unpin(cx)
            .map(|()| Err(Elapsed(*this.after)))
    }
}

/// Awaits the given `future` with an optional bound.
pub(crate) async fn maybe_timeout<F: Future>(
    after: Option<Duration>,
    future: F,
) -> Result<F::Output, Elapsed> {
    match after {
        Some(after) => timeout(after, future).await,
        None => Ok(future.await),
    }
}

/// Runs a step or hook `future`, turning both a returned error and a panic
/// into a rendered message.
pub(crate) async fn catch_failure<F>(future: F) -> Result<(), String>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(panic) => Err(panic_message(&*panic)),
    }
}

/// Extracts a message out of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| (*s).to_owned()))
        .unwrap_or_else(|| "(Could not resolve panic payload)".to_owned())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use futures::{executor::block_on, future};

    use super::*;

    #[test]
    fn ready_future_beats_timeout() {
        let res = block_on(timeout(Duration::from_secs(10), future::ready(7)));
        assert_eq!(res, Ok(7));
    }

    #[test]
    fn pending_future_times_out() {
        let start = Instant::now();
        let res = block_on(timeout(
            Duration::from_millis(20),
            future::pending::<()>(),
        ));

        assert_eq!(res, Err(Elapsed(Duration::from_millis(20))));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn catches_errors_and_panics() {
        let err = block_on(catch_failure(async {
            Err(anyhow::anyhow!("no such button"))
        }));
        assert_eq!(err, Err("no such button".to_owned()));

        let panicked = block_on(catch_failure(async {
            if true {
                panic!("exploded");
            }
            Ok(())
        }));
        assert_eq!(panicked, Err("exploded".to_owned()));

        let owned = block_on(catch_failure(async {
            if true {
                panic!("{} exploded", 42);
            }
            Ok(())
        }));
        assert_eq!(owned, Err("42 exploded".to_owned()));
    }

    #[test]
    fn yields_once_before_returning() {
        let v = block_on(future::ready(3).then_yield());
        assert_eq!(v, 3);
    }
}
