//! The event loop: one thread owns the [`Stack`], everything else talks to
//! it through a [`LoopHandle`].
//!
//! Each UDP port gets a receive task feeding a channel; the loop wakes on a
//! received frame, a command from another thread, or the stack's next
//! timer, and after every wake sends whatever the stack queued for
//! transmission.

use crate::app::Application;
use crate::error::{IoError, StackError};
use crate::iocb::{IoController, Iocb};
use bacflow_core::comm::{LayerId, Stack};
use bacflow_core::Pdu;
use bacflow_datalink::{DataLink, UdpPort};
use std::collections::HashMap;
use std::future::Future;
use std::thread;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Command = Box<dyn FnOnce(&mut Stack) + Send>;

enum Message {
    Run(Command),
    Stop,
}

/// Thread-safe entry point into a running event loop.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    commands: mpsc::UnboundedSender<Message>,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run(_) => f.write_str("Run"),
            Self::Stop => f.write_str("Stop"),
        }
    }
}

/// Aborts `iocb` with `err` unless something finished it first.
fn abandon(iocb: &Iocb, err: IoError) {
    if let Err(already) = iocb.abort(err) {
        log::debug!("iocb {}: {already}", iocb.id());
    }
}

/// An IOCB on its way to the loop thread. Dropped undelivered, for
/// instance with a command the loop never ran, it aborts the IOCB.
struct InFlight(Option<Iocb>);

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(iocb) = self.0.take() {
            abandon(&iocb, IoError::Stopped);
        }
    }
}

impl LoopHandle {
    /// Runs `f` on the loop thread at its next wake.
    pub fn deferred(&self, f: impl FnOnce(&mut Stack) + Send + 'static) -> Result<(), StackError> {
        self.commands
            .send(Message::Run(Box::new(f)))
            .map_err(|_| StackError::Stopped)
    }

    /// Hands `iocb` to the application layer `app`. Never fails: a stopped
    /// loop aborts the IOCB with [`IoError::Stopped`], a wrong layer id with
    /// [`IoError::Unreachable`].
    pub fn request_io(&self, app: LayerId, iocb: Iocb) {
        let id = iocb.id();
        let mut carried = InFlight(Some(iocb));
        let sent = self.deferred(move |stack| {
            let Some(iocb) = carried.0.take() else {
                return;
            };
            let unhandled = iocb.clone();
            let handled = stack.with_layer::<Application, _>(app, move |application, io| {
                application.request_io(iocb, io)
            });
            if handled.is_none() {
                log::warn!("{app} is not an application layer");
                abandon(&unhandled, IoError::Unreachable);
            }
        });
        if let Err(err) = sent {
            log::debug!("iocb {id} not handed over: {err}");
        }
    }

    /// Runs `f` on the loop thread and blocks until it returns. Never call
    /// this from the loop thread itself.
    pub fn call<R: Send + 'static>(
        &self,
        f: impl FnOnce(&mut Stack) -> R + Send + 'static,
    ) -> Result<R, StackError> {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        self.deferred(move |stack| {
            if tx.send(f(stack)).is_err() {
                log::debug!("caller gave up before its call returned");
            }
        })?;
        rx.recv().map_err(|_| StackError::Stopped)
    }

    pub fn stop(&self) {
        if self.commands.send(Message::Stop).is_err() {
            log::debug!("event loop already stopped");
        }
    }
}

/// A stack plus the UDP ports under its bottom layers.
pub struct EventLoop {
    stack: Stack,
    ports: HashMap<LayerId, UdpPort>,
    commands: mpsc::UnboundedReceiver<Message>,
    handle: LoopHandle,
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("stack", &self.stack)
            .field("ports", &self.ports.len())
            .finish()
    }
}

impl EventLoop {
    pub fn new(stack: Stack) -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        Self {
            stack,
            ports: HashMap::new(),
            commands,
            handle: LoopHandle { commands: tx },
        }
    }

    /// Carries the frames of bottom layer `bottom` over `port`.
    pub fn attach(&mut self, bottom: LayerId, port: UdpPort) {
        self.ports.insert(bottom, port);
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn stack(&mut self) -> &mut Stack {
        &mut self.stack
    }

    /// Runs until [`LoopHandle::stop`] and gives the stack back.
    ///
    /// Commands queued behind the stop still run, then every layer is
    /// stopped; the application aborts its open IOCBs at that point.
    pub async fn run(mut self) -> Result<Stack, StackError> {
        let (frames_tx, mut frames) = mpsc::unbounded_channel::<(LayerId, Pdu)>();
        let receivers: Vec<JoinHandle<()>> = self
            .ports
            .iter()
            .map(|(bottom, port)| {
                let (bottom, port, frames_tx) = (*bottom, port.clone(), frames_tx.clone());
                tokio::spawn(async move {
                    loop {
                        match port.recv().await {
                            Ok(pdu) => {
                                if frames_tx.send((bottom, pdu)).is_err() {
                                    break;
                                }
                            }
                            Err(err) => log::warn!("receive on {bottom} failed: {err}"),
                        }
                    }
                })
            })
            .collect();
        drop(frames_tx);

        self.stack.advance(Instant::now());
        self.stack.start();
        loop {
            self.flush().await;
            let deadline = self.stack.next_deadline();
            tokio::select! {
                Some((bottom, pdu)) = frames.recv() => {
                    self.stack.advance(Instant::now());
                    self.stack.receive(bottom, pdu);
                }
                message = self.commands.recv() => match message {
                    Some(Message::Run(f)) => {
                        self.stack.advance(Instant::now());
                        f(&mut self.stack);
                    }
                    Some(Message::Stop) | None => break,
                },
                _ = wait_until(deadline) => self.stack.advance(Instant::now()),
            }
        }
        self.commands.close();
        while let Ok(message) = self.commands.try_recv() {
            if let Message::Run(f) = message {
                self.stack.advance(Instant::now());
                f(&mut self.stack);
            }
        }
        self.stack.advance(Instant::now());
        self.stack.stop();
        self.flush().await;
        for receiver in receivers {
            receiver.abort();
        }
        log::debug!("event loop stopped");
        Ok(self.stack)
    }

    async fn flush(&mut self) {
        for (bottom, pdu) in self.stack.take_transmits() {
            match self.ports.get(&bottom) {
                Some(port) => {
                    if let Err(err) = port.send(&pdu).await {
                        log::warn!("send to {} failed: {err}", pdu.destination);
                    }
                }
                None => log::warn!("no port under {bottom}, dropping frame to {}", pdu.destination),
            }
        }
        for (top, pdu) in self.stack.take_deliveries() {
            log::trace!("{top} delivered {} octets from {} to nobody", pdu.data.len(), pdu.source);
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, StackError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

/// Runs `event_loop` on the calling thread until it is stopped.
pub fn run_blocking(event_loop: EventLoop) -> Result<Stack, StackError> {
    runtime()?.block_on(event_loop.run())
}

/// Builds an event loop with `setup` on a new thread and runs it there.
///
/// The stack is not `Send`, so it is created on the thread that drives it;
/// the returned handle is the only way in.
pub fn spawn_thread<F, Fut>(setup: F) -> Result<(LoopHandle, thread::JoinHandle<Result<(), StackError>>), StackError>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<EventLoop, StackError>>,
{
    let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);
    let thread = thread::Builder::new()
        .name("bacflow-loop".into())
        .spawn(move || {
            runtime()?.block_on(async move {
                let event_loop = setup().await?;
                if ready_tx.send(event_loop.handle()).is_err() {
                    log::debug!("spawner went away before the loop started");
                }
                event_loop.run().await.map(|_| ())
            })
        })?;
    match ready_rx.recv() {
        Ok(handle) => Ok((handle, thread)),
        Err(_) => match thread.join() {
            Ok(Err(err)) => Err(err),
            _ => Err(StackError::Stopped),
        },
    }
}
