use std::io;
use std::time::Duration;

use futures::stream::{Fuse, Stream};
use futures::{Async, Future, Poll};
use tokio_timer::{Sleep, TimeoutError, Timer};

/// Error type for `PersistentStream`.
pub enum PersistentError {
    Disconnect,
    Timeout,
    IoError(io::Error),
}

impl<T> From<TimeoutError<T>> for PersistentError {
    fn from(error: TimeoutError<T>) -> PersistentError {
        match error {
            TimeoutError::Timer(_, _) => {
                panic!("bep_peer: Timer Error In Peer Stream, Timer Capacity Is Probably Too Small...")
            }
            TimeoutError::TimedOut(_) => PersistentError::Timeout,
        }
    }
}

/// Stream for persistent connections, where a value of None from the underlying
/// stream maps to an actual error, and calling poll multiple times will always
/// return such error.
pub struct PersistentStream<S> {
    stream: Fuse<S>,
}

impl<S> PersistentStream<S>
where
    S: Stream,
{
    /// Create a new `PersistentStream`.
    pub fn new(stream: S) -> PersistentStream<S> {
        PersistentStream {
            stream: stream.fuse(),
        }
    }
}

impl<S> Stream for PersistentStream<S>
where
    S: Stream<Error = io::Error>,
{
    type Item = S::Item;
    type Error = PersistentError;

    fn poll(&mut self) -> Poll<Option<Self::Item>, Self::Error> {
        self.stream
            .poll()
            .map_err(PersistentError::IoError)
            .and_then(|item| match item {
                Async::Ready(None) => Err(PersistentError::Disconnect),
                other => Ok(other),
            })
    }
}

//----------------------------------------------------------------------------//

/// Error type for `RecurringTimeoutStream`.
pub enum RecurringTimeoutError {
    /// None and any errors are mapped to this type...
    Disconnect,
    Timeout,
}

/// Stream similar to `tokio_timer::TimeoutStream`, but which doesn't
/// tear the underlying stream down when a single timeout occurs.
/// Instead it signals that the timeout elapsed before the stream
/// produced an item and keeps the stream polled, which is what a
/// keepalive needs: ping when the local side has been quiet, keep
/// going afterwards.
pub struct RecurringTimeoutStream<S> {
    dur: Duration,
    timer: Timer,
    sleep: Sleep,
    stream: S,
}

impl<S> RecurringTimeoutStream<S> {
    pub fn new(stream: S, timer: Timer, dur: Duration) -> RecurringTimeoutStream<S> {
        let sleep = timer.sleep(dur);

        RecurringTimeoutStream {
            dur,
            timer,
            sleep,
            stream,
        }
    }
}

impl<S> Stream for RecurringTimeoutStream<S>
where
    S: Stream,
{
    type Item = S::Item;
    type Error = RecurringTimeoutError;

    fn poll(&mut self) -> Poll<Option<S::Item>, RecurringTimeoutError> {
        // First, try polling the future
        match self.stream.poll() {
            Ok(Async::NotReady) => {}
            Ok(Async::Ready(Some(value))) => {
                // Reset the timeout
                self.sleep = self.timer.sleep(self.dur);

                return Ok(Async::Ready(Some(value)));
            }
            Ok(Async::Ready(None)) => return Ok(Async::Ready(None)),
            Err(_) => return Err(RecurringTimeoutError::Disconnect),
        }

        // Now check the timer
        match self.sleep.poll() {
            Ok(Async::NotReady) => Ok(Async::NotReady),
            Ok(Async::Ready(_)) => {
                // Reset the timeout
                self.sleep = self.timer.sleep(self.dur);

                Err(RecurringTimeoutError::Timeout)
            }
            Err(_) => {
                panic!("bep_peer: Timer Error In Session Stream, Timer Capacity Is Probably Too Small...")
            }
        }
    }
}
