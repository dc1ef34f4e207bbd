//! Close-completion signals
//!
//! Every overlay carries a registry of one-shot waiters settled exactly once
//! by its terminal close transition. `AfterClose` is one waiter; `Closing`
//! joins several (the return value of a broadcast close). A waiter whose
//! overlay is torn down without a terminal transition still resolves, so
//! callers never hang on an instance that no longer exists.

use futures::future::{join_all, JoinAll};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Future resolving once a single dialog instance has fully closed
#[derive(Debug)]
pub struct AfterClose {
    rx: Option<oneshot::Receiver<()>>,
}

impl AfterClose {
    pub(crate) fn new(rx: oneshot::Receiver<()>) -> Self {
        Self { rx: Some(rx) }
    }

    /// A signal for an instance that is already closed.
    pub(crate) fn ready() -> Self {
        Self { rx: None }
    }
}

impl Future for AfterClose {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx.as_mut() {
            // Resolve on the terminal signal and on a dropped sender alike.
            Some(rx) => Pin::new(rx).poll(cx).map(|_| ()),
            None => Poll::Ready(()),
        }
    }
}

/// Future resolving once every matched dialog instance has finished closing
#[derive(Debug)]
pub struct Closing {
    inner: JoinAll<AfterClose>,
}

impl Closing {
    pub(crate) fn join(waiters: Vec<AfterClose>) -> Self {
        Self {
            inner: join_all(waiters),
        }
    }

    /// A close that matched no instances; resolves immediately.
    pub(crate) fn idle() -> Self {
        Self::join(Vec::new())
    }
}

impl Future for Closing {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn test_ready_signal_resolves_immediately() {
        assert_eq!(AfterClose::ready().now_or_never(), Some(()));
    }

    #[test]
    fn test_signal_pends_until_sent() {
        let (tx, rx) = oneshot::channel();
        let mut signal = AfterClose::new(rx);
        assert!((&mut signal).now_or_never().is_none());

        tx.send(()).unwrap();
        assert_eq!(signal.now_or_never(), Some(()));
    }

    #[test]
    fn test_signal_resolves_when_sender_dropped() {
        let (tx, rx) = oneshot::channel::<()>();
        let signal = AfterClose::new(rx);
        drop(tx);
        assert_eq!(signal.now_or_never(), Some(()));
    }

    #[test]
    fn test_closing_waits_for_all() {
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        let mut closing = Closing::join(vec![AfterClose::new(rx_a), AfterClose::new(rx_b)]);

        assert!((&mut closing).now_or_never().is_none());
        tx_a.send(()).unwrap();
        assert!((&mut closing).now_or_never().is_none());
        tx_b.send(()).unwrap();
        assert_eq!(closing.now_or_never(), Some(()));
    }

    #[test]
    fn test_idle_closing_resolves_immediately() {
        assert_eq!(Closing::idle().now_or_never(), Some(()));
    }
}
