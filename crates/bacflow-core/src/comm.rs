//! Vertical layer composition.
//!
//! Layers never call each other directly. A layer reacts to `indication`
//! (a PDU from the layer above) and `confirmation` (a PDU from the layer
//! below) and records what it wants done in [`LayerIo`]: `request` sends a
//! PDU down, `response` sends one up, and timers are scheduled by token.
//! The [`Stack`] owns every layer, applies those effects in FIFO order and
//! so never re-enters a layer that is still running.

use crate::pdu::Pdu;
use crate::task::{TaskId, TaskManager};
use core::fmt;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(usize);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

pub trait AsAny: 'static {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub trait Layer: AsAny {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn start(&mut self, _io: &mut LayerIo) {}

    /// Last call before the stack is dropped.
    fn stop(&mut self, _io: &mut LayerIo) {}

    /// A PDU handed down by the layer above.
    fn indication(&mut self, pdu: Pdu, _io: &mut LayerIo) {
        log::debug!("{}: no indication handler, dropping {} octets", self.name(), pdu.data.len());
    }

    /// A PDU handed up by the lower layer bound at `port`.
    fn confirmation(&mut self, port: usize, pdu: Pdu, _io: &mut LayerIo) {
        log::debug!(
            "{}: no confirmation handler on port {port}, dropping {} octets",
            self.name(),
            pdu.data.len()
        );
    }

    fn on_timer(&mut self, token: u64, _io: &mut LayerIo) {
        log::debug!("{}: unhandled timer {token}", self.name());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Request {
        port: usize,
        pdu: Pdu,
    },
    Response(Pdu),
    Schedule {
        token: u64,
        at: Instant,
        interval: Option<Duration>,
    },
    Cancel(u64),
}

/// What a layer may do while it handles one event.
#[derive(Debug)]
pub struct LayerIo {
    now: Instant,
    effects: Vec<Effect>,
}

impl LayerIo {
    pub fn new(now: Instant) -> Self {
        Self {
            now,
            effects: Vec::new(),
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn request(&mut self, pdu: Pdu) {
        self.request_on(0, pdu);
    }

    pub fn request_on(&mut self, port: usize, pdu: Pdu) {
        self.effects.push(Effect::Request { port, pdu });
    }

    pub fn response(&mut self, pdu: Pdu) {
        self.effects.push(Effect::Response(pdu));
    }

    /// (Re)arms timer `token`; an earlier arming of the same token is replaced.
    pub fn schedule_at(&mut self, token: u64, at: Instant) {
        self.effects.push(Effect::Schedule {
            token,
            at,
            interval: None,
        });
    }

    pub fn schedule_after(&mut self, token: u64, delay: Duration) {
        self.schedule_at(token, self.now + delay);
    }

    pub fn schedule_recurring(&mut self, token: u64, first: Instant, interval: Duration) {
        self.effects.push(Effect::Schedule {
            token,
            at: first,
            interval: Some(interval),
        });
    }

    pub fn cancel(&mut self, token: u64) {
        self.effects.push(Effect::Cancel(token));
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn into_effects(self) -> Vec<Effect> {
        self.effects
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindError {
    UnknownLayer(LayerId),
    /// The lower layer already has an upper, or the upper's port is taken.
    AlreadyBound(LayerId),
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownLayer(id) => write!(f, "unknown {id}"),
            Self::AlreadyBound(id) => write!(f, "{id} is already bound"),
        }
    }
}

impl std::error::Error for BindError {}

struct Slot {
    layer: Box<dyn Layer>,
    upper: Option<(LayerId, usize)>,
    lower: Vec<Option<LayerId>>,
}

#[derive(Debug)]
enum Event {
    Indication { to: LayerId, pdu: Pdu },
    Confirmation { to: LayerId, port: usize, pdu: Pdu },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackTask {
    Timer { layer: LayerId, token: u64 },
    Deferred(u64),
}

type DeferredFn = Box<dyn FnOnce(&mut Stack)>;

/// Owns a set of bound layers and runs them against a clock.
///
/// Time only moves through [`Stack::advance`]; tests drive it with virtual
/// instants and the runtime drives it with the wall clock.
pub struct Stack {
    slots: Vec<Slot>,
    events: VecDeque<Event>,
    tasks: TaskManager<StackTask>,
    timers: HashMap<(LayerId, u64), TaskId>,
    deferred: HashMap<u64, DeferredFn>,
    next_deferred: u64,
    now: Instant,
    transmits: Vec<(LayerId, Pdu)>,
    deliveries: Vec<(LayerId, Pdu)>,
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.slots.iter().map(|slot| slot.layer.name()).collect();
        f.debug_struct("Stack")
            .field("layers", &names)
            .field("pending_events", &self.events.len())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl Stack {
    pub fn new(now: Instant) -> Self {
        Self {
            slots: Vec::new(),
            events: VecDeque::new(),
            tasks: TaskManager::new(),
            timers: HashMap::new(),
            deferred: HashMap::new(),
            next_deferred: 0,
            now,
            transmits: Vec::new(),
            deliveries: Vec::new(),
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn add<L: Layer>(&mut self, layer: L) -> LayerId {
        let id = LayerId(self.slots.len());
        self.slots.push(Slot {
            layer: Box::new(layer),
            upper: None,
            lower: Vec::new(),
        });
        id
    }

    /// Binds `ids[0]` over `ids[1]` over `ids[2]` and so on, each on port 0.
    pub fn bind(&mut self, ids: &[LayerId]) -> Result<(), BindError> {
        for pair in ids.windows(2) {
            self.bind_port(pair[0], 0, pair[1])?;
        }
        Ok(())
    }

    /// Binds `lower` under `upper` as the upper layer's `port`.
    pub fn bind_port(&mut self, upper: LayerId, port: usize, lower: LayerId) -> Result<(), BindError> {
        if self.slots.get(upper.0).is_none() {
            return Err(BindError::UnknownLayer(upper));
        }
        let lower_slot = self
            .slots
            .get_mut(lower.0)
            .ok_or(BindError::UnknownLayer(lower))?;
        if lower_slot.upper.is_some() {
            return Err(BindError::AlreadyBound(lower));
        }
        let upper_slot = &mut self.slots[upper.0];
        if upper_slot.lower.len() <= port {
            upper_slot.lower.resize(port + 1, None);
        }
        if upper_slot.lower[port].is_some() {
            return Err(BindError::AlreadyBound(upper));
        }
        upper_slot.lower[port] = Some(lower);
        self.slots[lower.0].upper = Some((upper, port));
        Ok(())
    }

    /// Runs every layer's `start` hook in the order the layers were added.
    pub fn start(&mut self) {
        for index in 0..self.slots.len() {
            self.call(LayerId(index), |layer, io| layer.start(io));
        }
        self.run_events();
    }

    /// Tells every layer the stack is going away and runs what they queue.
    pub fn stop(&mut self) {
        for index in 0..self.slots.len() {
            self.call(LayerId(index), |layer, io| layer.stop(io));
        }
        self.run_events();
    }

    /// Hands `pdu` to `top` as if an upper layer had requested it.
    pub fn request(&mut self, top: LayerId, pdu: Pdu) {
        self.events.push_back(Event::Indication { to: top, pdu });
        self.run_events();
    }

    /// Hands a received frame to the bottom layer `bottom`.
    pub fn receive(&mut self, bottom: LayerId, pdu: Pdu) {
        self.receive_on(bottom, 0, pdu);
    }

    pub fn receive_on(&mut self, bottom: LayerId, port: usize, pdu: Pdu) {
        self.events.push_back(Event::Confirmation {
            to: bottom,
            port,
            pdu,
        });
        self.run_events();
    }

    pub fn layer<L: Layer>(&self, id: LayerId) -> Option<&L> {
        let slot = self.slots.get(id.0)?;
        <dyn Layer as AsAny>::as_any(&*slot.layer).downcast_ref::<L>()
    }

    /// Runs `f` against layer `id` with a fresh [`LayerIo`], then applies
    /// whatever it asked for. `None` if the id or type does not match.
    pub fn with_layer<L: Layer, R>(
        &mut self,
        id: LayerId,
        f: impl FnOnce(&mut L, &mut LayerIo) -> R,
    ) -> Option<R> {
        let mut io = LayerIo::new(self.now);
        let slot = self.slots.get_mut(id.0)?;
        let layer = <dyn Layer as AsAny>::as_any_mut(&mut *slot.layer).downcast_mut::<L>()?;
        let result = f(layer, &mut io);
        self.apply(id, io.effects);
        self.run_events();
        Some(result)
    }

    /// Schedules `f` to run with the stack on the next dispatch pass.
    pub fn deferred(&mut self, f: impl FnOnce(&mut Stack) + 'static) {
        let key = self.next_deferred;
        self.next_deferred += 1;
        self.deferred.insert(key, Box::new(f));
        self.tasks.deferred(self.now, StackTask::Deferred(key));
    }

    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.tasks.next_deadline()
    }

    /// Moves the clock to `now` and runs every task due by then.
    pub fn advance(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
        while let Some(due) = self.tasks.get_next_task(self.now) {
            match due.task {
                StackTask::Timer { layer, token } => {
                    if self.timers.get(&(layer, token)) == Some(&due.id)
                        && !self.tasks.is_scheduled(due.id)
                    {
                        self.timers.remove(&(layer, token));
                    }
                    self.call(layer, |l, io| l.on_timer(token, io));
                }
                StackTask::Deferred(key) => {
                    if let Some(f) = self.deferred.remove(&key) {
                        f(self);
                    }
                }
            }
            self.run_events();
        }
    }

    /// PDUs requested by layers with nothing bound below them.
    pub fn take_transmits(&mut self) -> Vec<(LayerId, Pdu)> {
        std::mem::take(&mut self.transmits)
    }

    /// PDUs answered by layers with nothing bound above them.
    pub fn take_deliveries(&mut self) -> Vec<(LayerId, Pdu)> {
        std::mem::take(&mut self.deliveries)
    }

    pub fn timer_armed(&self, layer: LayerId, token: u64) -> Option<Instant> {
        let id = self.timers.get(&(layer, token))?;
        self.tasks.scheduled_time(*id)
    }

    fn call(&mut self, id: LayerId, f: impl FnOnce(&mut dyn Layer, &mut LayerIo)) {
        let mut io = LayerIo::new(self.now);
        let Some(slot) = self.slots.get_mut(id.0) else {
            log::warn!("event for unknown {id}");
            return;
        };
        f(&mut *slot.layer, &mut io);
        self.apply(id, io.effects);
    }

    fn apply(&mut self, id: LayerId, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Request { port, pdu } => {
                    let lower = self
                        .slots
                        .get(id.0)
                        .and_then(|slot| slot.lower.get(port).copied().flatten());
                    match lower {
                        Some(to) => self.events.push_back(Event::Indication { to, pdu }),
                        None => self.transmits.push((id, pdu)),
                    }
                }
                Effect::Response(pdu) => {
                    match self.slots.get(id.0).and_then(|slot| slot.upper) {
                        Some((to, port)) => {
                            self.events.push_back(Event::Confirmation { to, port, pdu })
                        }
                        None => self.deliveries.push((id, pdu)),
                    }
                }
                Effect::Schedule {
                    token,
                    at,
                    interval,
                } => {
                    if let Some(old) = self.timers.remove(&(id, token)) {
                        self.tasks.suspend_task(old);
                    }
                    let task = StackTask::Timer { layer: id, token };
                    let task_id = match interval {
                        Some(interval) => self.tasks.install_recurring(at, interval, task),
                        None => self.tasks.install_task(at, task),
                    };
                    self.timers.insert((id, token), task_id);
                }
                Effect::Cancel(token) => {
                    if let Some(old) = self.timers.remove(&(id, token)) {
                        self.tasks.suspend_task(old);
                    }
                }
            }
        }
    }

    fn run_events(&mut self) {
        while let Some(event) = self.events.pop_front() {
            match event {
                Event::Indication { to, pdu } => self.call(to, |l, io| l.indication(pdu, io)),
                Event::Confirmation { to, port, pdu } => {
                    self.call(to, |l, io| l.confirmation(port, pdu, io))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BindError, Layer, LayerIo, Stack};
    use crate::pdu::Pdu;
    use std::time::{Duration, Instant};

    /// Prepends its tag on the way down and strips it on the way up.
    struct Header {
        tag: u8,
        seen_up: usize,
    }

    impl Layer for Header {
        fn indication(&mut self, pdu: Pdu, io: &mut LayerIo) {
            let mut data = vec![self.tag];
            data.extend_from_slice(&pdu.data);
            io.request(pdu.forward(data));
        }

        fn confirmation(&mut self, _port: usize, pdu: Pdu, io: &mut LayerIo) {
            self.seen_up += 1;
            if pdu.data.first() == Some(&self.tag) {
                io.response(pdu.forward(pdu.data[1..].to_vec()));
            }
        }
    }

    struct Ticker {
        fired: Vec<Instant>,
    }

    impl Layer for Ticker {
        fn start(&mut self, io: &mut LayerIo) {
            io.schedule_recurring(1, io.now() + Duration::from_secs(1), Duration::from_secs(1));
            io.schedule_after(2, Duration::from_millis(1500));
        }

        fn on_timer(&mut self, token: u64, io: &mut LayerIo) {
            match token {
                1 => self.fired.push(io.now()),
                _ => io.cancel(1),
            }
        }
    }

    #[test]
    fn bound_layers_wrap_and_unwrap_in_order() {
        let mut stack = Stack::new(Instant::now());
        let a = stack.add(Header { tag: 0xA, seen_up: 0 });
        let b = stack.add(Header { tag: 0xB, seen_up: 0 });
        stack.bind(&[a, b]).unwrap();

        stack.request(a, Pdu::new(vec![1]));
        let sent = stack.take_transmits();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, b);
        assert_eq!(sent[0].1.data, vec![0xB, 0xA, 1]);

        stack.receive(b, Pdu::new(vec![0xB, 0xA, 7]));
        let up = stack.take_deliveries();
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].0, a);
        assert_eq!(up[0].1.data, vec![7]);
        assert_eq!(stack.layer::<Header>(a).map(|h| h.seen_up), Some(1));
    }

    #[test]
    fn double_binding_is_rejected() {
        let mut stack = Stack::new(Instant::now());
        let a = stack.add(Header { tag: 1, seen_up: 0 });
        let b = stack.add(Header { tag: 2, seen_up: 0 });
        let c = stack.add(Header { tag: 3, seen_up: 0 });
        stack.bind(&[a, c]).unwrap();
        assert_eq!(stack.bind(&[b, c]), Err(BindError::AlreadyBound(c)));
    }

    #[test]
    fn timers_fire_and_cancel() {
        let t0 = Instant::now();
        let mut stack = Stack::new(t0);
        let id = stack.add(Ticker { fired: Vec::new() });
        stack.start();

        stack.advance(t0 + Duration::from_secs(1));
        assert!(stack.timer_armed(id, 1).is_some());
        stack.advance(t0 + Duration::from_secs(5));
        let fired = &stack.layer::<Ticker>(id).unwrap().fired;
        assert_eq!(fired.len(), 1);
        assert_eq!(stack.timer_armed(id, 1), None);
        assert_eq!(stack.next_deadline(), None);
    }

    #[test]
    fn deferred_work_runs_on_next_pass() {
        let t0 = Instant::now();
        let mut stack = Stack::new(t0);
        let a = stack.add(Header { tag: 9, seen_up: 0 });
        stack.deferred(move |stack| stack.request(a, Pdu::new(vec![2])));
        assert!(stack.take_transmits().is_empty());
        stack.advance(t0);
        assert_eq!(stack.take_transmits()[0].1.data, vec![9, 2]);
    }

    #[test]
    fn with_layer_checks_type() {
        let mut stack = Stack::new(Instant::now());
        let a = stack.add(Header { tag: 1, seen_up: 0 });
        assert_eq!(stack.with_layer::<Ticker, _>(a, |_, _| ()), None);
        let tag = stack.with_layer::<Header, _>(a, |h, io| {
            io.request(Pdu::new(vec![]));
            h.tag
        });
        assert_eq!(tag, Some(1));
        assert_eq!(stack.take_transmits().len(), 1);
    }
}
