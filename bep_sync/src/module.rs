//! Sink/Stream shell around the controller state machine.
//!
//! The shell owns a shared handle on the cluster (the model is only
//! ever touched from the loop thread) and turns the owner-facing
//! message enums into the usual sink-in, stream-out module shape.

use std::cell::RefCell;
use std::rc::Rc;

use bep_model::Cluster;
use futures::task::{self, Task};
use futures::{Async, AsyncSink, Poll, Sink, StartSend, Stream};

use crate::controller::{Controller, IControllerMessage, OControllerMessage};
use crate::error::SyncError;

/// Module wrapper multiplexing controller inputs and outputs.
pub struct ControllerModule {
    controller: Controller,
    cluster: Rc<RefCell<Cluster>>,
    blocked: Option<Task>,
}

impl ControllerModule {
    pub fn new(controller: Controller, cluster: Rc<RefCell<Cluster>>) -> ControllerModule {
        ControllerModule {
            controller,
            cluster,
            blocked: None,
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }
}

impl Sink for ControllerModule {
    type SinkItem = IControllerMessage;
    type SinkError = SyncError;

    fn start_send(&mut self, item: IControllerMessage) -> StartSend<IControllerMessage, SyncError> {
        {
            let mut cluster = self.cluster.borrow_mut();
            self.controller.handle(&mut cluster, item)?;
        }

        // New outputs may be waiting; wake the stream half
        if let Some(task) = self.blocked.take() {
            task.notify();
        }

        Ok(AsyncSink::Ready)
    }

    fn poll_complete(&mut self) -> Poll<(), SyncError> {
        Ok(Async::Ready(()))
    }
}

impl Stream for ControllerModule {
    type Item = OControllerMessage;
    type Error = SyncError;

    fn poll(&mut self) -> Poll<Option<OControllerMessage>, SyncError> {
        match self.controller.poll_output() {
            Some(message) => Ok(Async::Ready(Some(message))),
            None => {
                self.blocked = Some(task::current());

                Ok(Async::NotReady)
            }
        }
    }
}
