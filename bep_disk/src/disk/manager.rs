use futures::sync::mpsc::{self, Receiver};
use futures::task;
use futures::{Async, AsyncSink, Poll, Sink, StartSend, Stream};
use futures_cpupool::CpuPool;

use crate::disk::builder::FsManagerBuilder;
use crate::disk::fs::FileSystem;
use crate::disk::tasks;
use crate::disk::tasks::context::FsManagerContext;
use crate::disk::{IFsMessage, OFsMessage};

/// `FsManager` object which serializes filesystem commands.
pub struct FsManager<F>
where
    F: FileSystem,
{
    sink: FsManagerSink<F>,
    stream: FsManagerStream,
}

impl<F> FsManager<F>
where
    F: FileSystem + Send + Sync + 'static,
{
    /// Create an `FsManager` from the given builder.
    pub fn from_builder(builder: FsManagerBuilder, fs: F) -> FsManager<F> {
        let (out_send, out_recv) = mpsc::channel(builder.stream_buffer_capacity());
        let context = FsManagerContext::new(
            out_send,
            fs,
            builder.handle_capacity(),
            builder.sink_buffer_capacity(),
        );

        // A single worker keeps commands in global enqueue order, so
        // two writes against one path can never race
        let pool = builder.into_worker_config().pool_size(1).create();

        FsManager {
            sink: FsManagerSink::new(pool, context),
            stream: FsManagerStream::new(out_recv),
        }
    }

    /// Break the `FsManager` into a sink and stream.
    ///
    /// The returned sink implements `Clone`.
    pub fn into_parts(self) -> (FsManagerSink<F>, FsManagerStream) {
        (self.sink, self.stream)
    }
}

impl<F> Sink for FsManager<F>
where
    F: FileSystem + Send + Sync + 'static,
    F::File: Send,
{
    type SinkItem = IFsMessage;
    type SinkError = ();

    fn start_send(&mut self, item: IFsMessage) -> StartSend<IFsMessage, ()> {
        self.sink.start_send(item)
    }

    fn poll_complete(&mut self) -> Poll<(), ()> {
        self.sink.poll_complete()
    }
}

impl<F> Stream for FsManager<F>
where
    F: FileSystem,
{
    type Item = OFsMessage;
    type Error = ();

    fn poll(&mut self) -> Poll<Option<OFsMessage>, ()> {
        self.stream.poll()
    }
}

//----------------------------------------------------------------------------//

/// Sink half of an `FsManager`.
pub struct FsManagerSink<F>
where
    F: FileSystem,
{
    pool: CpuPool,
    context: FsManagerContext<F>,
}

impl<F> Clone for FsManagerSink<F>
where
    F: FileSystem,
{
    fn clone(&self) -> FsManagerSink<F> {
        FsManagerSink {
            pool: self.pool.clone(),
            context: self.context.clone(),
        }
    }
}

impl<F> FsManagerSink<F>
where
    F: FileSystem,
{
    fn new(pool: CpuPool, context: FsManagerContext<F>) -> FsManagerSink<F> {
        FsManagerSink { pool, context }
    }

    /// Pending-work slots currently in use.
    pub fn pending_work(&self) -> usize {
        self.context.pending_work()
    }
}

impl<F> Sink for FsManagerSink<F>
where
    F: FileSystem + Send + Sync + 'static,
    F::File: Send,
{
    type SinkItem = IFsMessage;
    type SinkError = ();

    fn start_send(&mut self, item: IFsMessage) -> StartSend<IFsMessage, ()> {
        if self.context.try_submit_work(task::current()) {
            debug!("fs manager accepted command for token {}", item.token());
            tasks::execute_on_pool(item, &self.pool, self.context.clone());

            Ok(AsyncSink::Ready)
        } else {
            debug!("fs manager backpressured command for token {}", item.token());

            Ok(AsyncSink::NotReady(item))
        }
    }

    fn poll_complete(&mut self) -> Poll<(), ()> {
        Ok(Async::Ready(()))
    }
}

//----------------------------------------------------------------------------//

/// Stream half of an `FsManager`.
pub struct FsManagerStream {
    recv: Receiver<OFsMessage>,
}

impl FsManagerStream {
    fn new(recv: Receiver<OFsMessage>) -> FsManagerStream {
        FsManagerStream { recv }
    }
}

impl Stream for FsManagerStream {
    type Item = OFsMessage;
    type Error = ();

    fn poll(&mut self) -> Poll<Option<OFsMessage>, ()> {
        self.recv.poll()
    }
}
