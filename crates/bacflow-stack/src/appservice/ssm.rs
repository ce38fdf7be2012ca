//! Segmentation state machines for confirmed transactions.
//!
//! [`Smap`] sits between the application service layer and the network
//! layer. Every confirmed request owns one state machine keyed by peer
//! address and invoke id: the client side when we asked, the server side
//! when the peer did. Timeouts are per transaction and driven by layer
//! timers.

use super::device_info::DeviceInfoCache;
use super::segment::{split, AckOutcome, Received, SegmentReceiver, SegmentSender, MAX_SEGMENT_COUNT};
use super::LOCAL_ABORT;
use crate::config::SmapConfig;
use bacflow_core::apdu::{AbortPdu, AbortReason, Apdu, ComplexAck, ConfirmedRequest, SegmentAck};
use bacflow_core::comm::{Layer, LayerIo};
use bacflow_core::types::{MaxSegments, Segmentation};
use bacflow_core::{Address, Pdu};
use std::collections::HashMap;
use std::time::Duration;

const CONFIRMED_HEADER: usize = 4;
const SEGMENTED_REQUEST_HEADER: usize = 6;
const COMPLEX_ACK_HEADER: usize = 3;
const SEGMENTED_ACK_HEADER: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsmState {
    /// Sending request segments, waiting on Segment-ACKs.
    SegmentedRequest,
    /// Request sent whole; waiting for the answer.
    AwaitConfirmation,
    /// Reassembling a segmented Complex-ACK.
    SegmentedConfirmation,
    /// Request handed up; waiting for the application to answer.
    AwaitResponse,
    /// Sending response segments, waiting on Segment-ACKs.
    SegmentedResponse,
}

type SsmKey = (Address, u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Done,
}

/// Addressing and timer shared by both sides of a transaction.
#[derive(Debug)]
struct Transaction {
    peer: Address,
    invoke_id: u8,
    priority: u8,
    token: u64,
    state: SsmState,
    retries: u8,
}

impl Transaction {
    fn arm(&self, io: &mut LayerIo, delay: Duration) {
        io.schedule_after(self.token, delay);
    }

    fn send(&self, io: &mut LayerIo, apdu: &Apdu) {
        let expecting_reply = matches!(apdu, Apdu::ConfirmedRequest(_));
        match apdu.to_vec() {
            Ok(data) => io.request(
                Pdu::new(data)
                    .with_destination(self.peer.clone())
                    .with_expecting_reply(expecting_reply)
                    .with_priority(self.priority),
            ),
            Err(err) => log::warn!("cannot encode {:?} for {}: {err}", apdu.apdu_type(), self.peer),
        }
    }

    fn deliver(&self, io: &mut LayerIo, apdu: &Apdu) {
        deliver(io, &self.peer, self.priority, apdu);
    }

    fn segment_ack(&self, io: &mut LayerIo, server: bool, negative_ack: bool, sequence: u8, window: u8) {
        self.send(
            io,
            &Apdu::SegmentAck(SegmentAck {
                negative_ack,
                server,
                invoke_id: self.invoke_id,
                sequence_number: sequence,
                actual_window_size: window,
            }),
        );
    }

    fn abort_peer(&self, io: &mut LayerIo, server: bool, reason: AbortReason) {
        log::debug!("aborting transaction {} with {}: {reason}", self.invoke_id, self.peer);
        self.send(
            io,
            &Apdu::Abort(AbortPdu {
                server,
                invoke_id: self.invoke_id,
                reason,
            }),
        );
    }

    fn abort_local(&self, io: &mut LayerIo, reason: AbortReason) {
        local_abort(io, &self.peer, self.invoke_id, self.priority, reason);
    }
}

fn deliver(io: &mut LayerIo, peer: &Address, priority: u8, apdu: &Apdu) {
    match apdu.to_vec() {
        Ok(data) => io.response(
            Pdu::new(data)
                .with_source(peer.clone())
                .with_priority(priority),
        ),
        Err(err) => log::warn!("cannot encode {:?} from {peer}: {err}", apdu.apdu_type()),
    }
}

/// An abort raised by this stack, handed up in place of the peer's answer.
fn local_abort(io: &mut LayerIo, peer: &Address, invoke_id: u8, priority: u8, reason: AbortReason) {
    let apdu = Apdu::Abort(AbortPdu {
        server: true,
        invoke_id,
        reason,
    });
    match apdu.to_vec() {
        Ok(data) => io.response(
            Pdu::new(data)
                .with_source(peer.clone())
                .with_priority(priority)
                .with_user_data(LOCAL_ABORT, reason.to_string()),
        ),
        Err(err) => log::warn!("cannot encode local abort: {err}"),
    }
}

#[derive(Debug)]
struct ClientSsm {
    tx: Transaction,
    /// Header of our request; the body lives in `sender` or `body`.
    request: ConfirmedRequest,
    body: Vec<u8>,
    sender: Option<SegmentSender>,
    receiver: Option<SegmentReceiver>,
    response: Option<ComplexAck>,
}

#[derive(Debug)]
struct ServerSsm {
    tx: Transaction,
    /// Header of the peer's request, carrying its limits.
    request: ConfirmedRequest,
    receiver: Option<SegmentReceiver>,
    response: Option<ComplexAck>,
    sender: Option<SegmentSender>,
}

/// Segmentation state machine access point.
#[derive(Debug)]
pub struct Smap {
    config: SmapConfig,
    devices: DeviceInfoCache,
    clients: HashMap<SsmKey, ClientSsm>,
    servers: HashMap<SsmKey, ServerSsm>,
    timers: HashMap<u64, (Role, SsmKey)>,
    next_token: u64,
}

impl Smap {
    pub fn new(config: SmapConfig, devices: DeviceInfoCache) -> Self {
        Self {
            config,
            devices,
            clients: HashMap::new(),
            servers: HashMap::new(),
            timers: HashMap::new(),
            next_token: 1,
        }
    }

    pub fn config(&self) -> &SmapConfig {
        &self.config
    }

    pub fn devices(&self) -> &DeviceInfoCache {
        &self.devices
    }

    /// State of our request `invoke_id` to `peer`, if still open.
    pub fn client_state(&self, peer: &Address, invoke_id: u8) -> Option<SsmState> {
        self.clients
            .get(&(peer.clone(), invoke_id))
            .map(|ssm| ssm.tx.state)
    }

    /// State of the peer's request `invoke_id`, if still open.
    pub fn server_state(&self, peer: &Address, invoke_id: u8) -> Option<SsmState> {
        self.servers
            .get(&(peer.clone(), invoke_id))
            .map(|ssm| ssm.tx.state)
    }

    pub fn open_transactions(&self) -> usize {
        self.clients.len() + self.servers.len()
    }

    fn transaction(&mut self, role: Role, key: &SsmKey, priority: u8, state: SsmState) -> Transaction {
        let token = self.next_token;
        self.next_token += 1;
        self.timers.insert(token, (role, key.clone()));
        Transaction {
            peer: key.0.clone(),
            invoke_id: key.1,
            priority,
            token,
            state,
            retries: 0,
        }
    }

    fn finish(&mut self, role: Role, key: &SsmKey, io: &mut LayerIo) {
        let token = match role {
            Role::Client => self.clients.remove(key).map(|ssm| ssm.tx.token),
            Role::Server => self.servers.remove(key).map(|ssm| ssm.tx.token),
        };
        if let Some(token) = token {
            io.cancel(token);
            self.timers.remove(&token);
        }
    }

    fn local_max_apdu(&self) -> usize {
        self.config.max_apdu_length_accepted.octets()
    }

    // --- client side ---

    fn client_request(&mut self, io: &mut LayerIo, peer: Address, priority: u8, mut request: ConfirmedRequest) {
        let key = (peer.clone(), request.invoke_id);
        if self.clients.contains_key(&key) {
            log::warn!("invoke id {} already in use with {peer}", request.invoke_id);
            local_abort(io, &peer, request.invoke_id, priority, AbortReason::Unspecified);
            return;
        }

        let local_max = self.local_max_apdu();
        let (peer_max, peer_segmentation, peer_segments) = match self.devices.get(&peer) {
            Some(info) => (info.max_apdu, info.segmentation, info.max_segments),
            None => (local_max, Segmentation::NoSegmentation, MaxSegments::Unspecified),
        };
        let apdu_max = peer_max.min(local_max);

        request.segmented = false;
        request.more_follows = false;
        request.sequence_number = 0;
        request.proposed_window_size = 1;
        request.segmented_response_accepted = self.config.segmentation_supported.can_receive();
        request.max_segments = self.config.max_segments_accepted;
        request.max_apdu = self.config.max_apdu_length_accepted;
        let body = std::mem::take(&mut request.data);

        if CONFIRMED_HEADER + body.len() <= apdu_max {
            let tx = self.transaction(Role::Client, &key, priority, SsmState::AwaitConfirmation);
            let mut ssm = ClientSsm {
                tx,
                request,
                body,
                sender: None,
                receiver: None,
                response: None,
            };
            send_whole_request(&mut ssm, io);
            ssm.tx.arm(io, self.config.apdu_timeout);
            self.clients.insert(key, ssm);
            return;
        }

        if !self.config.segmentation_supported.can_transmit() || !peer_segmentation.can_receive() {
            log::debug!("request {} to {peer} needs segmentation, unsupported", request.invoke_id);
            local_abort(io, &peer, request.invoke_id, priority, AbortReason::SegmentationNotSupported);
            return;
        }
        let segments = split(&body, apdu_max.saturating_sub(SEGMENTED_REQUEST_HEADER));
        let too_many = segments.len() > MAX_SEGMENT_COUNT
            || peer_segments.count().is_some_and(|limit| segments.len() > limit);
        if too_many {
            local_abort(io, &peer, request.invoke_id, priority, AbortReason::ApduTooLong);
            return;
        }

        let tx = self.transaction(Role::Client, &key, priority, SsmState::SegmentedRequest);
        let mut ssm = ClientSsm {
            tx,
            request,
            body: Vec::new(),
            sender: Some(SegmentSender::new(segments, self.config.proposed_window_size)),
            receiver: None,
            response: None,
        };
        send_request_window(&self.config, &mut ssm, io);
        ssm.tx.arm(io, self.config.segment_timeout);
        self.clients.insert(key, ssm);
    }

    fn client_confirmation(&mut self, io: &mut LayerIo, peer: Address, apdu: Apdu) {
        let Some(invoke_id) = apdu.invoke_id() else {
            return;
        };
        let key = (peer, invoke_id);
        let Some(ssm) = self.clients.get_mut(&key) else {
            log::debug!("no transaction {invoke_id} with {}, dropping {:?}", key.0, apdu.apdu_type());
            return;
        };
        let step = match apdu {
            Apdu::SegmentAck(ack) => client_segment_ack(&self.config, ssm, &ack, io),
            Apdu::ComplexAck(ack) if ack.segmented => client_segment(&self.config, ssm, ack, io),
            answer @ (Apdu::SimpleAck(_)
            | Apdu::ComplexAck(_)
            | Apdu::Error(_)
            | Apdu::Reject(_)
            | Apdu::Abort(_)) => {
                if ssm.tx.state == SsmState::SegmentedConfirmation && !matches!(answer, Apdu::Abort(_)) {
                    ssm.tx.abort_peer(io, false, AbortReason::InvalidApduInThisState);
                    ssm.tx.abort_local(io, AbortReason::InvalidApduInThisState);
                } else {
                    ssm.tx.deliver(io, &answer);
                }
                Step::Done
            }
            Apdu::ConfirmedRequest(_) | Apdu::UnconfirmedRequest(_) => Step::Continue,
        };
        if step == Step::Done {
            self.finish(Role::Client, &key, io);
        }
    }

    fn client_timeout(&mut self, key: &SsmKey, io: &mut LayerIo) {
        let Some(ssm) = self.clients.get_mut(key) else {
            return;
        };
        let retries = self.config.number_of_apdu_retries;
        let step = match ssm.tx.state {
            SsmState::AwaitConfirmation if ssm.tx.retries < retries => {
                ssm.tx.retries += 1;
                log::debug!(
                    "retrying request {} to {} ({}/{retries})",
                    ssm.tx.invoke_id,
                    ssm.tx.peer,
                    ssm.tx.retries
                );
                match ssm.sender.as_mut() {
                    Some(sender) => {
                        sender.restart();
                        ssm.tx.state = SsmState::SegmentedRequest;
                        send_request_window(&self.config, ssm, io);
                        ssm.tx.arm(io, self.config.segment_timeout);
                    }
                    None => {
                        send_whole_request(ssm, io);
                        ssm.tx.arm(io, self.config.apdu_timeout);
                    }
                }
                Step::Continue
            }
            SsmState::SegmentedRequest if ssm.tx.retries < retries => {
                ssm.tx.retries += 1;
                send_request_window(&self.config, ssm, io);
                ssm.tx.arm(io, self.config.segment_timeout);
                Step::Continue
            }
            SsmState::SegmentedRequest => {
                ssm.tx.abort_peer(io, false, AbortReason::TsmTimeout);
                ssm.tx.abort_local(io, AbortReason::TsmTimeout);
                Step::Done
            }
            _ => {
                log::debug!("request {} to {} timed out", ssm.tx.invoke_id, ssm.tx.peer);
                ssm.tx.abort_local(io, AbortReason::TsmTimeout);
                Step::Done
            }
        };
        if step == Step::Done {
            self.finish(Role::Client, key, io);
        }
    }

    // --- server side ---

    fn server_request(&mut self, io: &mut LayerIo, peer: Address, priority: u8, request: ConfirmedRequest) {
        let key = (peer.clone(), request.invoke_id);
        if let Some(ssm) = self.servers.get_mut(&key) {
            let step = match ssm.tx.state {
                SsmState::SegmentedRequest if request.segmented => server_segment(&self.config, ssm, request, io),
                _ => {
                    log::debug!("duplicate request {} from {peer} ignored", request.invoke_id);
                    Step::Continue
                }
            };
            if step == Step::Done {
                self.finish(Role::Server, &key, io);
            }
            return;
        }
        self.devices.update_max_segments(&peer, request.max_segments);

        if !request.segmented {
            let tx = self.transaction(Role::Server, &key, priority, SsmState::AwaitResponse);
            tx.deliver(io, &Apdu::ConfirmedRequest(request.clone()));
            tx.arm(io, self.config.application_timeout);
            self.servers.insert(
                key,
                ServerSsm {
                    tx,
                    request: ConfirmedRequest {
                        data: Vec::new(),
                        ..request
                    },
                    receiver: None,
                    response: None,
                    sender: None,
                },
            );
            return;
        }

        let reason = if request.sequence_number != 0 {
            Some(AbortReason::InvalidApduInThisState)
        } else if !self.config.segmentation_supported.can_receive() {
            Some(AbortReason::SegmentationNotSupported)
        } else {
            None
        };
        if let Some(reason) = reason {
            let tx = Transaction {
                peer,
                invoke_id: request.invoke_id,
                priority,
                token: 0,
                state: SsmState::SegmentedRequest,
                retries: 0,
            };
            tx.abort_peer(io, true, reason);
            return;
        }

        let receiver = SegmentReceiver::start(
            &request.data,
            request.proposed_window_size,
            self.config.proposed_window_size,
            self.config.max_segments_accepted.count(),
        );
        let tx = self.transaction(Role::Server, &key, priority, SsmState::SegmentedRequest);
        tx.segment_ack(io, true, false, 0, receiver.actual_window());
        let more_follows = request.more_follows;
        let mut ssm = ServerSsm {
            tx,
            request: ConfirmedRequest {
                data: Vec::new(),
                ..request
            },
            receiver: Some(receiver),
            response: None,
            sender: None,
        };
        if more_follows {
            ssm.tx.arm(io, self.config.segment_timeout);
        } else {
            request_complete(&self.config, &mut ssm, io);
        }
        self.servers.insert(key, ssm);
    }

    fn server_response(&mut self, io: &mut LayerIo, peer: Address, apdu: Apdu) {
        let Some(invoke_id) = apdu.invoke_id() else {
            return;
        };
        let key = (peer, invoke_id);
        let local_max = self.local_max_apdu();
        let Some(ssm) = self.servers.get_mut(&key) else {
            log::debug!("no open request {invoke_id} from {}, dropping response", key.0);
            return;
        };
        if ssm.tx.state != SsmState::AwaitResponse {
            log::debug!("response to {invoke_id} in state {:?} dropped", ssm.tx.state);
            return;
        }

        let step = match apdu {
            Apdu::ComplexAck(mut ack) => {
                let apdu_max = ssm.request.max_apdu.octets().min(local_max);
                if COMPLEX_ACK_HEADER + ack.data.len() <= apdu_max {
                    ssm.tx.send(io, &Apdu::ComplexAck(ack));
                    Step::Done
                } else if !ssm.request.segmented_response_accepted
                    || !self.config.segmentation_supported.can_transmit()
                {
                    ssm.tx.abort_peer(io, true, AbortReason::SegmentationNotSupported);
                    Step::Done
                } else {
                    let body = std::mem::take(&mut ack.data);
                    let segments = split(&body, apdu_max.saturating_sub(SEGMENTED_ACK_HEADER));
                    let too_many = segments.len() > MAX_SEGMENT_COUNT
                        || ssm
                            .request
                            .max_segments
                            .count()
                            .is_some_and(|limit| segments.len() > limit);
                    if too_many {
                        ssm.tx.abort_peer(io, true, AbortReason::BufferOverflow);
                        Step::Done
                    } else {
                        ssm.sender = Some(SegmentSender::new(segments, self.config.proposed_window_size));
                        ssm.response = Some(ack);
                        ssm.tx.state = SsmState::SegmentedResponse;
                        ssm.tx.retries = 0;
                        send_response_window(&self.config, ssm, io);
                        ssm.tx.arm(io, self.config.segment_timeout);
                        Step::Continue
                    }
                }
            }
            other => {
                ssm.tx.send(io, &other);
                Step::Done
            }
        };
        if step == Step::Done {
            self.finish(Role::Server, &key, io);
        }
    }

    fn server_confirmation(&mut self, io: &mut LayerIo, peer: Address, apdu: Apdu) {
        let Some(invoke_id) = apdu.invoke_id() else {
            return;
        };
        let key = (peer, invoke_id);
        let Some(ssm) = self.servers.get_mut(&key) else {
            return;
        };
        let step = match apdu {
            Apdu::SegmentAck(ack) if ssm.tx.state == SsmState::SegmentedResponse => {
                let outcome = ssm
                    .sender
                    .as_mut()
                    .map_or(AckOutcome::Ignored, |sender| sender.ack(ack.sequence_number, ack.actual_window_size));
                match outcome {
                    AckOutcome::Ignored => Step::Continue,
                    AckOutcome::SendWindow => {
                        ssm.tx.retries = 0;
                        send_response_window(&self.config, ssm, io);
                        ssm.tx.arm(io, self.config.segment_timeout);
                        Step::Continue
                    }
                    AckOutcome::Complete => Step::Done,
                }
            }
            Apdu::Abort(abort) => {
                log::debug!("{} aborted its request {invoke_id}: {}", key.0, abort.reason);
                Step::Done
            }
            _ => Step::Continue,
        };
        if step == Step::Done {
            self.finish(Role::Server, &key, io);
        }
    }

    fn server_timeout(&mut self, key: &SsmKey, io: &mut LayerIo) {
        let Some(ssm) = self.servers.get_mut(key) else {
            return;
        };
        let step = match ssm.tx.state {
            SsmState::AwaitResponse => {
                log::warn!("no answer to request {} from {} in time", ssm.tx.invoke_id, ssm.tx.peer);
                ssm.tx.abort_peer(io, true, AbortReason::ApplicationExceededReplyTime);
                Step::Done
            }
            SsmState::SegmentedResponse if ssm.tx.retries < self.config.number_of_apdu_retries => {
                ssm.tx.retries += 1;
                send_response_window(&self.config, ssm, io);
                ssm.tx.arm(io, self.config.segment_timeout);
                Step::Continue
            }
            SsmState::SegmentedResponse => {
                ssm.tx.abort_peer(io, true, AbortReason::TsmTimeout);
                Step::Done
            }
            _ => {
                log::debug!("segmented request {} from {} stalled", ssm.tx.invoke_id, ssm.tx.peer);
                Step::Done
            }
        };
        if step == Step::Done {
            self.finish(Role::Server, key, io);
        }
    }
}

fn send_whole_request(ssm: &mut ClientSsm, io: &mut LayerIo) {
    let request = ConfirmedRequest {
        data: ssm.body.clone(),
        ..ssm.request.clone()
    };
    ssm.tx.send(io, &Apdu::ConfirmedRequest(request));
}

fn send_request_window(config: &SmapConfig, ssm: &mut ClientSsm, io: &mut LayerIo) {
    let Some(sender) = ssm.sender.as_mut() else {
        return;
    };
    let last = sender.len().saturating_sub(1);
    for index in sender.window() {
        let request = ConfirmedRequest {
            segmented: true,
            more_follows: index < last,
            sequence_number: index as u8,
            proposed_window_size: config.proposed_window_size,
            data: sender.segment(index).to_vec(),
            ..ssm.request.clone()
        };
        ssm.tx.send(io, &Apdu::ConfirmedRequest(request));
    }
}

fn send_response_window(config: &SmapConfig, ssm: &mut ServerSsm, io: &mut LayerIo) {
    let (Some(sender), Some(header)) = (ssm.sender.as_mut(), ssm.response.as_ref()) else {
        return;
    };
    let last = sender.len().saturating_sub(1);
    for index in sender.window() {
        let ack = ComplexAck {
            segmented: true,
            more_follows: index < last,
            sequence_number: index as u8,
            proposed_window_size: config.proposed_window_size,
            data: sender.segment(index).to_vec(),
            ..header.clone()
        };
        ssm.tx.send(io, &Apdu::ComplexAck(ack));
    }
}

fn client_segment_ack(config: &SmapConfig, ssm: &mut ClientSsm, ack: &SegmentAck, io: &mut LayerIo) -> Step {
    if ssm.tx.state != SsmState::SegmentedRequest || !ack.server {
        return Step::Continue;
    }
    let Some(sender) = ssm.sender.as_mut() else {
        return Step::Continue;
    };
    match sender.ack(ack.sequence_number, ack.actual_window_size) {
        AckOutcome::Ignored => {}
        AckOutcome::SendWindow => {
            ssm.tx.retries = 0;
            send_request_window(config, ssm, io);
            ssm.tx.arm(io, config.segment_timeout);
        }
        AckOutcome::Complete => {
            ssm.tx.retries = 0;
            ssm.tx.state = SsmState::AwaitConfirmation;
            ssm.tx.arm(io, config.apdu_timeout);
        }
    }
    Step::Continue
}

fn client_segment(config: &SmapConfig, ssm: &mut ClientSsm, ack: ComplexAck, io: &mut LayerIo) -> Step {
    match ssm.tx.state {
        SsmState::AwaitConfirmation | SsmState::SegmentedRequest if ack.sequence_number == 0 => {
            if !config.segmentation_supported.can_receive() {
                ssm.tx.abort_peer(io, false, AbortReason::SegmentationNotSupported);
                ssm.tx.abort_local(io, AbortReason::SegmentationNotSupported);
                return Step::Done;
            }
            let receiver = SegmentReceiver::start(
                &ack.data,
                ack.proposed_window_size,
                config.proposed_window_size,
                config.max_segments_accepted.count(),
            );
            ssm.tx.segment_ack(io, false, false, 0, receiver.actual_window());
            ssm.receiver = Some(receiver);
            let more_follows = ack.more_follows;
            ssm.response = Some(ComplexAck {
                data: Vec::new(),
                ..ack
            });
            if !more_follows {
                return confirmation_complete(ssm, io);
            }
            ssm.tx.state = SsmState::SegmentedConfirmation;
            ssm.tx.arm(io, config.segment_timeout);
            Step::Continue
        }
        SsmState::SegmentedConfirmation => {
            let Some(receiver) = ssm.receiver.as_mut() else {
                return Step::Done;
            };
            let window = receiver.actual_window();
            match receiver.segment(ack.sequence_number, ack.more_follows, &ack.data) {
                Received::Pending => {
                    ssm.tx.arm(io, config.segment_timeout);
                    Step::Continue
                }
                Received::Ack(sequence) => {
                    ssm.tx.segment_ack(io, false, false, sequence, window);
                    ssm.tx.arm(io, config.segment_timeout);
                    Step::Continue
                }
                Received::Nak(sequence) => {
                    ssm.tx.segment_ack(io, false, true, sequence, window);
                    ssm.tx.arm(io, config.segment_timeout);
                    Step::Continue
                }
                Received::Complete(sequence) => {
                    ssm.tx.segment_ack(io, false, false, sequence, window);
                    confirmation_complete(ssm, io)
                }
                Received::Overflow => {
                    ssm.tx.abort_peer(io, false, AbortReason::BufferOverflow);
                    ssm.tx.abort_local(io, AbortReason::BufferOverflow);
                    Step::Done
                }
            }
        }
        _ => {
            ssm.tx.abort_peer(io, false, AbortReason::InvalidApduInThisState);
            ssm.tx.abort_local(io, AbortReason::InvalidApduInThisState);
            Step::Done
        }
    }
}

fn confirmation_complete(ssm: &mut ClientSsm, io: &mut LayerIo) -> Step {
    let (Some(receiver), Some(header)) = (ssm.receiver.take(), ssm.response.take()) else {
        return Step::Done;
    };
    let ack = ComplexAck {
        segmented: false,
        more_follows: false,
        sequence_number: 0,
        proposed_window_size: 1,
        data: receiver.into_data(),
        ..header
    };
    log::trace!("reassembled {} octet answer from {}", ack.data.len(), ssm.tx.peer);
    ssm.tx.deliver(io, &Apdu::ComplexAck(ack));
    Step::Done
}

fn server_segment(config: &SmapConfig, ssm: &mut ServerSsm, request: ConfirmedRequest, io: &mut LayerIo) -> Step {
    let Some(receiver) = ssm.receiver.as_mut() else {
        return Step::Continue;
    };
    let window = receiver.actual_window();
    match receiver.segment(request.sequence_number, request.more_follows, &request.data) {
        Received::Pending => {
            ssm.tx.arm(io, config.segment_timeout);
            Step::Continue
        }
        Received::Ack(sequence) => {
            ssm.tx.segment_ack(io, true, false, sequence, window);
            ssm.tx.arm(io, config.segment_timeout);
            Step::Continue
        }
        Received::Nak(sequence) => {
            ssm.tx.segment_ack(io, true, true, sequence, window);
            ssm.tx.arm(io, config.segment_timeout);
            Step::Continue
        }
        Received::Complete(sequence) => {
            ssm.tx.segment_ack(io, true, false, sequence, window);
            request_complete(config, ssm, io);
            Step::Continue
        }
        Received::Overflow => {
            ssm.tx.abort_peer(io, true, AbortReason::BufferOverflow);
            Step::Done
        }
    }
}

/// Hands the reassembled request up and waits for the application.
fn request_complete(config: &SmapConfig, ssm: &mut ServerSsm, io: &mut LayerIo) {
    let Some(receiver) = ssm.receiver.take() else {
        return;
    };
    let request = ConfirmedRequest {
        segmented: false,
        more_follows: false,
        sequence_number: 0,
        proposed_window_size: 1,
        data: receiver.into_data(),
        ..ssm.request.clone()
    };
    ssm.tx.deliver(io, &Apdu::ConfirmedRequest(request));
    ssm.tx.state = SsmState::AwaitResponse;
    ssm.tx.arm(io, config.application_timeout);
}

impl Layer for Smap {
    fn name(&self) -> &'static str {
        "smap"
    }

    fn indication(&mut self, pdu: Pdu, io: &mut LayerIo) {
        let apdu = match Apdu::decode(&pdu.data) {
            Ok(apdu) => apdu,
            Err(err) => {
                log::warn!("smap: cannot send undecodable APDU to {}: {err}", pdu.destination);
                return;
            }
        };
        let peer = pdu.destination.clone();
        match apdu {
            Apdu::UnconfirmedRequest(_) => io.request(pdu),
            Apdu::ConfirmedRequest(request) => {
                self.client_request(io, peer, pdu.network_priority, request)
            }
            Apdu::SegmentAck(_) => log::debug!("smap: segment-ack from above dropped"),
            response => self.server_response(io, peer, response),
        }
    }

    fn confirmation(&mut self, _port: usize, pdu: Pdu, io: &mut LayerIo) {
        let apdu = match Apdu::decode(&pdu.data) {
            Ok(apdu) => apdu,
            Err(err) => {
                log::debug!("smap: malformed APDU from {}: {err}", pdu.source);
                return;
            }
        };
        let peer = pdu.source.clone();
        match apdu {
            Apdu::UnconfirmedRequest(_) => io.response(pdu),
            Apdu::ConfirmedRequest(request) => {
                self.server_request(io, peer, pdu.network_priority, request)
            }
            apdu if apdu.from_server() => self.client_confirmation(io, peer, apdu),
            apdu => self.server_confirmation(io, peer, apdu),
        }
    }

    fn on_timer(&mut self, token: u64, io: &mut LayerIo) {
        let Some((role, key)) = self.timers.get(&token).cloned() else {
            return;
        };
        match role {
            Role::Client => self.client_timeout(&key, io),
            Role::Server => self.server_timeout(&key, io),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Smap, SsmState};
    use crate::appservice::{DeviceInfo, DeviceInfoCache, LOCAL_ABORT};
    use crate::config::SmapConfig;
    use bacflow_core::apdu::{AbortReason, Apdu, ComplexAck, ConfirmedRequest, SegmentAck, SimpleAck};
    use bacflow_core::comm::{LayerId, Stack};
    use bacflow_core::types::{MaxApdu, MaxSegments, ObjectId, ObjectType, Segmentation};
    use bacflow_core::{Address, Pdu};
    use std::time::{Duration, Instant};

    fn peer() -> Address {
        Address::local_station(vec![10, 0, 0, 2, 0xBA, 0xC0])
    }

    fn stack(config: SmapConfig, devices: DeviceInfoCache) -> (Stack, LayerId, Instant) {
        let t0 = Instant::now();
        let mut stack = Stack::new(t0);
        let smap = stack.add(Smap::new(config, devices));
        (stack, smap, t0)
    }

    fn request(stack: &mut Stack, smap: LayerId, invoke_id: u8, body: Vec<u8>) {
        let apdu = Apdu::ConfirmedRequest(ConfirmedRequest::new(invoke_id, 12, body));
        stack.request(
            smap,
            Pdu::new(apdu.to_vec().unwrap()).with_destination(peer()),
        );
    }

    fn sent(stack: &mut Stack) -> Vec<Apdu> {
        stack
            .take_transmits()
            .into_iter()
            .map(|(_, pdu)| Apdu::decode(&pdu.data).unwrap())
            .collect()
    }

    fn receive(stack: &mut Stack, smap: LayerId, apdu: Apdu) {
        stack.receive(smap, Pdu::new(apdu.to_vec().unwrap()).with_source(peer()));
    }

    #[test]
    fn retries_then_times_out_locally() {
        let config = SmapConfig::default()
            .with_retries(2)
            .with_apdu_timeout(Duration::from_secs(3));
        let (mut stack, smap, t0) = stack(config, DeviceInfoCache::new());
        request(&mut stack, smap, 7, vec![1, 2, 3]);
        assert_eq!(sent(&mut stack).len(), 1);

        stack.advance(t0 + Duration::from_millis(2999));
        assert!(sent(&mut stack).is_empty());
        stack.advance(t0 + Duration::from_secs(3));
        assert_eq!(sent(&mut stack).len(), 1);
        stack.advance(t0 + Duration::from_secs(6));
        assert_eq!(sent(&mut stack).len(), 1);
        assert!(stack.take_deliveries().is_empty());

        stack.advance(t0 + Duration::from_secs(9));
        assert!(sent(&mut stack).is_empty());
        let delivered = stack.take_deliveries();
        assert_eq!(delivered.len(), 1);
        let pdu = &delivered[0].1;
        assert!(pdu.user_data.contains_key(LOCAL_ABORT));
        match Apdu::decode(&pdu.data).unwrap() {
            Apdu::Abort(abort) => assert_eq!(abort.reason, AbortReason::TsmTimeout),
            other => panic!("unexpected {other:?}"),
        }
        let smap_layer = stack.layer::<Smap>(smap).unwrap();
        assert_eq!(smap_layer.open_transactions(), 0);
    }

    #[test]
    fn simple_ack_closes_the_transaction() {
        let (mut stack, smap, _) = stack(SmapConfig::default(), DeviceInfoCache::new());
        request(&mut stack, smap, 3, vec![0; 10]);
        sent(&mut stack);
        assert_eq!(
            stack.layer::<Smap>(smap).unwrap().client_state(&peer(), 3),
            Some(SsmState::AwaitConfirmation)
        );
        receive(
            &mut stack,
            smap,
            Apdu::SimpleAck(SimpleAck {
                invoke_id: 3,
                service_choice: 15,
            }),
        );
        let delivered = stack.take_deliveries();
        assert_eq!(delivered.len(), 1);
        assert!(!delivered[0].1.user_data.contains_key(LOCAL_ABORT));
        assert_eq!(stack.layer::<Smap>(smap).unwrap().client_state(&peer(), 3), None);

        // a late duplicate is dropped
        receive(
            &mut stack,
            smap,
            Apdu::SimpleAck(SimpleAck {
                invoke_id: 3,
                service_choice: 15,
            }),
        );
        assert!(stack.take_deliveries().is_empty());
    }

    #[test]
    fn unknown_peer_gets_no_segmented_request() {
        let config = SmapConfig::default().with_max_apdu(MaxApdu::UpTo50);
        let (mut stack, smap, _) = stack(config, DeviceInfoCache::new());
        request(&mut stack, smap, 1, vec![0; 100]);
        assert!(sent(&mut stack).is_empty());
        let delivered = stack.take_deliveries();
        match Apdu::decode(&delivered[0].1.data).unwrap() {
            Apdu::Abort(abort) => assert_eq!(abort.reason, AbortReason::SegmentationNotSupported),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn segmented_request_follows_the_peer_window() {
        let devices = DeviceInfoCache::new();
        devices.insert(DeviceInfo {
            device_id: ObjectId::new(ObjectType::Device, 20),
            address: peer(),
            max_apdu: 50,
            segmentation: Segmentation::SegmentedBoth,
            max_segments: MaxSegments::Unspecified,
            vendor_id: 0,
        });
        let config = SmapConfig::default().with_window_size(4);
        let (mut stack, smap, _) = stack(config, devices);
        // 44 octets per segment: 100 octets make 3 segments
        request(&mut stack, smap, 9, vec![0xAB; 100]);
        let first = sent(&mut stack);
        assert_eq!(first.len(), 1);
        match &first[0] {
            Apdu::ConfirmedRequest(req) => {
                assert!(req.segmented && req.more_follows);
                assert_eq!(req.sequence_number, 0);
                assert_eq!(req.data.len(), 44);
            }
            other => panic!("unexpected {other:?}"),
        }

        receive(
            &mut stack,
            smap,
            Apdu::SegmentAck(SegmentAck {
                negative_ack: false,
                server: true,
                invoke_id: 9,
                sequence_number: 0,
                actual_window_size: 4,
            }),
        );
        let rest = sent(&mut stack);
        assert_eq!(rest.len(), 2);
        match &rest[1] {
            Apdu::ConfirmedRequest(req) => {
                assert!(!req.more_follows);
                assert_eq!(req.sequence_number, 2);
                assert_eq!(req.data.len(), 12);
            }
            other => panic!("unexpected {other:?}"),
        }

        receive(
            &mut stack,
            smap,
            Apdu::SegmentAck(SegmentAck {
                negative_ack: false,
                server: true,
                invoke_id: 9,
                sequence_number: 2,
                actual_window_size: 4,
            }),
        );
        assert_eq!(
            stack.layer::<Smap>(smap).unwrap().client_state(&peer(), 9),
            Some(SsmState::AwaitConfirmation)
        );
    }

    #[test]
    fn segmented_answer_is_reassembled() {
        let config = SmapConfig::default().with_window_size(2);
        let (mut stack, smap, _) = stack(config, DeviceInfoCache::new());
        request(&mut stack, smap, 4, vec![1]);
        sent(&mut stack);

        let segment = |seq: u8, more: bool, data: Vec<u8>| {
            Apdu::ComplexAck(ComplexAck {
                segmented: true,
                more_follows: more,
                sequence_number: seq,
                proposed_window_size: 2,
                ..ComplexAck::new(4, 12, data)
            })
        };
        receive(&mut stack, smap, segment(0, true, vec![1, 2]));
        assert!(matches!(&sent(&mut stack)[..], [Apdu::SegmentAck(ack)] if ack.sequence_number == 0 && !ack.server));
        receive(&mut stack, smap, segment(1, true, vec![3, 4]));
        assert!(sent(&mut stack).is_empty());
        receive(&mut stack, smap, segment(2, false, vec![5]));
        assert!(matches!(&sent(&mut stack)[..], [Apdu::SegmentAck(ack)] if ack.sequence_number == 2));

        let delivered = stack.take_deliveries();
        match Apdu::decode(&delivered[0].1.data).unwrap() {
            Apdu::ComplexAck(ack) => {
                assert!(!ack.segmented);
                assert_eq!(ack.data, vec![1, 2, 3, 4, 5]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn server_aborts_when_the_application_is_silent() {
        let config = SmapConfig::default().with_application_timeout(Duration::from_secs(2));
        let (mut stack, smap, t0) = stack(config, DeviceInfoCache::new());
        receive(
            &mut stack,
            smap,
            Apdu::ConfirmedRequest(ConfirmedRequest::new(5, 12, vec![9])),
        );
        assert_eq!(stack.take_deliveries().len(), 1);
        // duplicate while the first is open
        receive(
            &mut stack,
            smap,
            Apdu::ConfirmedRequest(ConfirmedRequest::new(5, 12, vec![9])),
        );
        assert!(stack.take_deliveries().is_empty());

        stack.advance(t0 + Duration::from_secs(2));
        match &sent(&mut stack)[..] {
            [Apdu::Abort(abort)] => {
                assert!(abort.server);
                assert_eq!(abort.reason, AbortReason::ApplicationExceededReplyTime);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn oversized_answer_to_a_non_segmenting_client_aborts() {
        let (mut stack, smap, _) = stack(SmapConfig::default(), DeviceInfoCache::new());
        let mut req = ConfirmedRequest::new(6, 12, vec![1]);
        req.max_apdu = MaxApdu::UpTo50;
        req.segmented_response_accepted = false;
        receive(&mut stack, smap, Apdu::ConfirmedRequest(req));
        stack.take_deliveries();

        let ack = Apdu::ComplexAck(ComplexAck::new(6, 12, vec![0; 200]));
        stack.request(smap, Pdu::new(ack.to_vec().unwrap()).with_destination(peer()));
        match &sent(&mut stack)[..] {
            [Apdu::Abort(abort)] => assert_eq!(abort.reason, AbortReason::SegmentationNotSupported),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(stack.layer::<Smap>(smap).unwrap().server_state(&peer(), 6), None);
    }
}
