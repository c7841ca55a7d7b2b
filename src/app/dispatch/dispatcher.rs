//! Serial callback delivery
//!
//! All handler callbacks run on one dedicated OS thread, in the order events
//! were sent. Senders never block; the thread drains an unbounded channel.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

use crate::constants::dispatch;
use crate::errors::{WorkerError, WorkerResult};

use super::event::ResponseEvent;
use super::handler::ResponseHandler;

enum Message {
    Deliver {
        handler: Arc<dyn ResponseHandler>,
        event: ResponseEvent,
    },
    Barrier(oneshot::Sender<()>),
    Stop,
}

/// Cloneable sending side of the dispatcher
#[derive(Clone)]
pub struct EventSender {
    sender: mpsc::UnboundedSender<Message>,
}

impl EventSender {
    /// Queue `event` for `handler`; false once the dispatcher has stopped
    pub fn send(&self, handler: &Arc<dyn ResponseHandler>, event: ResponseEvent) -> bool {
        self.sender
            .send(Message::Deliver {
                handler: Arc::clone(handler),
                event,
            })
            .is_ok()
    }

    /// Resolve once every event sent before this call has been handled
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Message::Barrier(done)).is_ok() {
            // error means the dispatcher stopped, which also drains the queue
            let _ = wait.await;
        }
    }
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

/// Owner of the callback thread
pub struct CallbackDispatcher {
    sender: EventSender,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CallbackDispatcher {
    /// Start the callback thread
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Configuration` if the OS refuses to spawn the thread
    pub fn start() -> WorkerResult<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name(dispatch::THREAD_NAME.to_string())
            .spawn(move || run_dispatch_loop(receiver))
            .map_err(|e| WorkerError::Configuration(format!("cannot start callback thread: {e}")))?;

        debug!("Callback dispatcher started");
        Ok(Self {
            sender: EventSender { sender },
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Wait until everything queued so far has been delivered
    pub async fn flush(&self) {
        self.sender.flush().await
    }

    /// Deliver what is queued, then stop the thread
    ///
    /// Events sent afterwards are dropped. Blocks until the thread exits.
    pub fn stop(&self) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        let _ = self.sender.sender.send(Message::Stop);
        if thread.join().is_err() {
            error!("Callback thread terminated abnormally");
        }
        debug!("Callback dispatcher stopped");
    }
}

impl fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackDispatcher")
            .field("running", &self.thread.lock().is_some())
            .finish()
    }
}

impl Drop for CallbackDispatcher {
    fn drop(&mut self) {
        if self.thread.get_mut().is_some() {
            let _ = self.sender.sender.send(Message::Stop);
        }
    }
}

fn run_dispatch_loop(mut receiver: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = receiver.blocking_recv() {
        match message {
            Message::Deliver { handler, event } => {
                trace!("Delivering {} event", event.kind());
                let delivered =
                    panic::catch_unwind(AssertUnwindSafe(|| handler.on_event(&event)));
                if delivered.is_err() {
                    error!("Response handler panicked while handling {} event", event.kind());
                }
            }
            Message::Barrier(done) => {
                let _ = done.send(());
            }
            Message::Stop => break,
        }
    }
    receiver.close();
    // release anyone waiting on a barrier queued behind the stop
    while let Ok(message) = receiver.try_recv() {
        if let Message::Barrier(done) = message {
            let _ = done.send(());
        }
    }
}

#[derive(Debug, Default)]
struct SinkState {
    cancel_notified: bool,
    finished: bool,
}

/// Per-request gate in front of the dispatcher
///
/// Enforces the delivery rules for one request: `Cancelled` is sent at most
/// once and never after `Finished`, nothing is sent after `Cancelled`, and
/// `Finished` is sent at most once.
#[derive(Clone)]
pub struct RequestSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    handler: Arc<dyn ResponseHandler>,
    sender: EventSender,
    state: Mutex<SinkState>,
}

impl RequestSink {
    pub fn new(handler: Arc<dyn ResponseHandler>, sender: EventSender) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                handler,
                sender,
                state: Mutex::new(SinkState::default()),
            }),
        }
    }

    pub fn handler(&self) -> &Arc<dyn ResponseHandler> {
        &self.inner.handler
    }

    /// Send an event unless the delivery rules forbid it
    ///
    /// Returns whether the event was queued.
    pub fn send(&self, event: ResponseEvent) -> bool {
        let mut state = self.inner.state.lock();
        if state.cancel_notified {
            return false;
        }
        match event {
            ResponseEvent::Cancelled => {
                if state.finished {
                    return false;
                }
                state.cancel_notified = true;
            }
            ResponseEvent::Finished => {
                if state.finished {
                    return false;
                }
                state.finished = true;
            }
            _ if state.finished => return false,
            _ => {}
        }
        // sent under the lock so per-request order matches decision order
        self.inner.sender.send(&self.inner.handler, event)
    }

    /// One-shot cancel notification
    pub fn send_cancel(&self) -> bool {
        self.send(ResponseEvent::Cancelled)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().finished
    }

    pub fn is_cancel_notified(&self) -> bool {
        self.inner.state.lock().cancel_notified
    }

    /// True once the request has reached a terminal notification
    pub fn is_settled(&self) -> bool {
        let state = self.inner.state.lock();
        state.finished || state.cancel_notified
    }
}

impl fmt::Debug for RequestSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RequestSink")
            .field("cancel_notified", &state.cancel_notified)
            .field("finished", &state.finished)
            .finish()
    }
}
