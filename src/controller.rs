//! Per-device connection management.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::channel::oneshot;
use futures::{StreamExt, select};
use log::{debug, info, warn};
use serde_json::{Value, json};

use crate::address::Address;
use crate::aggregator::StateAggregator;
use crate::config::ControllerConfig;
use crate::errors::Error;
use crate::history::{MessageHistory, MessageType};
use crate::observable::{Observable, Subscription};
use crate::packet::{IncomingPacket, Method, OutgoingPacket, ResultPacket};
use crate::runtime;
use crate::status::{ConnectionState, DeviceState};
use crate::transport::{self, SessionEvent, SessionHandle};
use crate::types::{HueSaturation, Kelvin, PowerMode};

type Result<T> = std::result::Result<T, Error>;

/// Controls a single light over its persistent TCP connection.
///
/// The connection is reference counted through [`attach`](Self::attach) and
/// [`detach`](Self::detach): the first attach opens it, and the last detach
/// closes it once the configured grace period passes without a new attach.
///
/// All state lives in one event loop task, so connection state changes are
/// observed in the order their causes happened. Creating a controller spawns
/// that task and therefore needs a running async runtime.
///
/// # Example
///
/// ```no_run
/// use yeelight_rs::{Address, ControllerConfig, DeviceController};
///
/// # async fn run() -> Result<(), yeelight_rs::Error> {
/// let controller = DeviceController::new(Address::new("192.168.1.20", 55443), ControllerConfig::default());
/// controller.attach();
/// controller.toggle().await?;
/// controller.detach();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DeviceController {
    address: Address,
    config: ControllerConfig,
    requests: UnboundedSender<Event>,
    connection_state: Arc<Observable<ConnectionState>>,
    device_state: Arc<Observable<DeviceState>>,
}

impl DeviceController {
    pub fn new(address: Address, config: ControllerConfig) -> Self {
        let (requests, requests_rx) = mpsc::unbounded();
        let (internal, internal_rx) = mpsc::unbounded();
        let connection_state = Arc::new(Observable::new(ConnectionState::default()));
        let device_state = Arc::new(Observable::new(DeviceState::default()));

        let event_loop = EventLoop {
            address: address.clone(),
            config: config.clone(),
            internal,
            connection_state: Arc::clone(&connection_state),
            device_state: Arc::clone(&device_state),
            history: MessageHistory::new(),
            interest: 0,
            detach_generation: 0,
            session: 0,
            active: None,
            closing: None,
            frames: None,
            prop_request: None,
            pending: HashMap::new(),
            aggregator: StateAggregator::new(),
        };
        runtime::spawn_detached(event_loop.run(requests_rx, internal_rx));

        DeviceController {
            address,
            config,
            requests,
            connection_state,
            device_state,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Register interest in the connection, opening it if nobody held it.
    pub fn attach(&self) {
        self.request(Event::Attach);
    }

    /// Release interest in the connection.
    pub fn detach(&self) {
        self.request(Event::Detach);
    }

    /// Drop any current connection and open a new one.
    pub fn connect(&self) {
        self.request(Event::Connect);
    }

    pub async fn toggle(&self) -> Result<()> {
        self.send_command(OutgoingPacket::toggle()).await
    }

    /// Switch to color mode with the given hue (0-359) and saturation (0-100).
    pub async fn set_color(&self, hue: u16, saturation: u8) -> Result<()> {
        let color =
            HueSaturation::create(hue, saturation).ok_or(Error::InvalidColor { hue, saturation })?;
        self.send_command(OutgoingPacket::set_hsv(color)).await
    }

    /// Switch to white mode with the given color temperature in Kelvin.
    pub async fn set_temperature(&self, kelvin: u16) -> Result<()> {
        let temperature = Kelvin::create(kelvin).ok_or(Error::InvalidTemperature(kelvin))?;
        self.send_command(OutgoingPacket::set_ct_abx(temperature)).await
    }

    pub async fn set_power(&self, power: PowerMode) -> Result<()> {
        self.send_command(OutgoingPacket::set_power(power)).await
    }

    /// Stream of connection states, starting with the current one.
    pub fn connection_state(&self) -> Subscription<ConnectionState> {
        self.connection_state.subscribe()
    }

    /// Stream of device states, starting with the current one.
    pub fn device_state(&self) -> Subscription<DeviceState> {
        self.device_state.subscribe()
    }

    pub fn current_connection_state(&self) -> ConnectionState {
        self.connection_state.get()
    }

    pub fn current_device_state(&self) -> DeviceState {
        self.device_state.get()
    }

    /// Wait until the device state is known on the current connection.
    pub async fn wait_for_state(&self, timeout: Duration) -> Result<DeviceState> {
        let mut states = self.device_state();
        let known = async move {
            while let Some(state) = states.next().await {
                if state.is_known() {
                    return Ok(state);
                }
            }
            Err(Error::ControllerClosed)
        };
        runtime::timeout(timeout, known)
            .await
            .map_err(|_| Error::StateTimeout(timeout))?
    }

    pub async fn history(&self) -> Result<MessageHistory> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .unbounded_send(Event::History(tx))
            .map_err(|_| Error::ControllerClosed)?;
        rx.await.map_err(|_| Error::ControllerClosed)
    }

    pub fn clear_history(&self) {
        self.request(Event::ClearHistory);
    }

    /// Returns diagnostics including connection, device state, and history.
    pub async fn diagnostics(&self) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .unbounded_send(Event::Diagnostics(tx))
            .map_err(|_| Error::ControllerClosed)?;
        rx.await.map_err(|_| Error::ControllerClosed)
    }

    /// Write a command and wait for the result carrying its id.
    ///
    /// Commands issued while disconnected are not written and fail with
    /// [`Error::CommandTimeout`].
    pub async fn send_command(&self, packet: OutgoingPacket) -> Result<()> {
        let (method, id) = (packet.method(), packet.id());
        let (reply, response) = oneshot::channel();
        self.requests
            .unbounded_send(Event::Command { packet, reply })
            .map_err(|_| Error::ControllerClosed)?;

        match runtime::timeout(self.config.command_timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(oneshot::Canceled)) => Err(Error::ControllerClosed),
            Err(_) => {
                debug!("{}: {method} ({id}) timed out", self.address);
                Err(Error::CommandTimeout { method, id })
            }
        }
    }

    fn request(&self, event: Event) {
        if self.requests.unbounded_send(event).is_err() {
            warn!("{}: controller event loop is gone", self.address);
        }
    }
}

#[derive(Debug)]
enum Event {
    Attach,
    Detach,
    Connect,
    DetachElapsed {
        generation: u64,
    },
    Command {
        packet: OutgoingPacket,
        reply: oneshot::Sender<Result<()>>,
    },
    Session {
        session: u64,
        event: SessionEvent,
    },
    History(oneshot::Sender<MessageHistory>),
    ClearHistory,
    Diagnostics(oneshot::Sender<Value>),
}

#[derive(Debug)]
struct PendingCommand {
    method: Method,
    reply: oneshot::Sender<Result<()>>,
}

/// Owner of every piece of mutable controller state.
struct EventLoop {
    address: Address,
    config: ControllerConfig,
    /// Feeds timers and sessions back into the loop.
    internal: UnboundedSender<Event>,
    connection_state: Arc<Observable<ConnectionState>>,
    device_state: Arc<Observable<DeviceState>>,
    history: MessageHistory,
    interest: usize,
    detach_generation: u64,
    session: u64,
    active: Option<SessionHandle>,
    /// Resolves once the last closed session released its socket.
    closing: Option<oneshot::Receiver<()>>,
    frames: Option<UnboundedSender<Vec<u8>>>,
    prop_request: Option<i32>,
    pending: HashMap<i32, PendingCommand>,
    aggregator: StateAggregator,
}

impl EventLoop {
    async fn run(mut self, mut requests: UnboundedReceiver<Event>, mut internal: UnboundedReceiver<Event>) {
        loop {
            let event = select! {
                event = requests.next() => match event {
                    Some(event) => event,
                    None => break,
                },
                event = internal.next() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event);
        }

        self.close_session();
        debug!("{}: controller stopped", self.address);
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Attach => self.attach(),
            Event::Detach => self.detach(),
            Event::Connect => {
                self.close_session();
                self.open_session();
            }
            Event::DetachElapsed { generation } => self.detach_elapsed(generation),
            Event::Command { packet, reply } => self.command(packet, reply),
            Event::Session { session, event } if session == self.session => {
                self.session_event(event)
            }
            Event::Session { session, .. } => {
                debug!("{}: ignoring event of stale session {session}", self.address)
            }
            Event::History(reply) => {
                let _ = reply.send(self.history.clone());
            }
            Event::ClearHistory => self.history.clear(),
            Event::Diagnostics(reply) => {
                let _ = reply.send(self.diagnostics());
            }
        }
    }

    fn attach(&mut self) {
        self.interest += 1;
        // Invalidates any pending close.
        self.detach_generation += 1;
        if self.interest == 1 && self.active.is_none() {
            self.open_session();
        }
    }

    fn detach(&mut self) {
        if self.interest == 0 {
            warn!("{}: detach without a matching attach", self.address);
            return;
        }
        self.interest -= 1;
        if self.interest > 0 {
            return;
        }

        self.detach_generation += 1;
        let generation = self.detach_generation;
        let grace = self.config.detach_grace;
        let internal = self.internal.clone();
        runtime::spawn_detached(async move {
            runtime::sleep(grace).await;
            let _ = internal.unbounded_send(Event::DetachElapsed { generation });
        });
    }

    fn detach_elapsed(&mut self, generation: u64) {
        if generation != self.detach_generation || self.interest > 0 {
            return;
        }
        if self.close_session() {
            info!("{}: no interest left, disconnecting", self.address);
            self.publish_disconnected();
        }
    }

    fn open_session(&mut self) {
        self.session += 1;
        let session = self.session;
        let internal = self.internal.clone();

        self.connection_state.publish(ConnectionState::Connecting);
        let handle = transport::open(&self.address, self.closing.take(), move |event| {
            let _ = internal.unbounded_send(Event::Session { session, event });
        });
        self.active = Some(handle);
    }

    /// Returns whether a session was open.
    fn close_session(&mut self) -> bool {
        // Events still queued from the closed session become stale.
        self.session += 1;
        self.frames = None;
        self.prop_request = None;
        self.aggregator.reset();
        match self.active.take() {
            Some(handle) => {
                self.closing = Some(handle.close());
                true
            }
            None => false,
        }
    }

    fn publish_disconnected(&mut self) {
        self.device_state.publish(DeviceState::Undefined);
        self.connection_state.publish(ConnectionState::Disconnected);
    }

    fn session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { frames } => {
                info!("{}: connected", self.address);
                self.frames = Some(frames);
                self.aggregator.reset();
                self.device_state.publish(DeviceState::Undefined);
                self.connection_state.publish(ConnectionState::Connected);

                let request = OutgoingPacket::get_prop();
                self.prop_request = Some(request.id());
                if let Err(e) = self.write(&request) {
                    self.history.record_error(&e.to_string());
                }
            }
            SessionEvent::ConnectFailed(error) => {
                warn!("{}: connection failed: {error}", self.address);
                self.history.record_error(&error.to_string());
                self.close_session();
                self.publish_disconnected();
            }
            SessionEvent::Packet(packet) => self.incoming(packet),
            SessionEvent::FrameError(error) => {
                warn!("{}: dropping frame: {error}", self.address);
                self.history.record_error(&error.to_string());
            }
            SessionEvent::WriteFailed(error) => {
                self.history.record_error(&error.to_string());
            }
            SessionEvent::Lost(error) => {
                match error {
                    Some(error) => {
                        warn!("{}: connection lost: {error}", self.address);
                        self.history.record_error(&error.to_string());
                    }
                    None => info!("{}: connection closed by device", self.address),
                }
                self.close_session();
                self.publish_disconnected();
            }
        }
    }

    fn command(&mut self, packet: OutgoingPacket, reply: oneshot::Sender<Result<()>>) {
        // Callers that timed out dropped their receiver.
        self.pending.retain(|_, pending| !pending.reply.is_canceled());

        let (method, id) = (packet.method(), packet.id());
        match self.write(&packet) {
            Ok(sent) => {
                if !sent {
                    debug!("{}: not connected, {method} ({id}) left to time out", self.address);
                }
                self.pending.insert(id, PendingCommand { method, reply });
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    /// Encode and queue a packet. Returns whether it reached the writer.
    fn write(&mut self, packet: &OutgoingPacket) -> Result<bool> {
        let Some(frames) = &self.frames else {
            return Ok(false);
        };
        let frame = packet.encode().inspect_err(|e| {
            warn!("{}: cannot encode {}: {e}", self.address, packet.method());
        })?;
        if frames.unbounded_send(frame).is_err() {
            return Ok(false);
        }
        self.history
            .record(MessageType::Send, packet.method().as_str(), packet.to_value());
        Ok(true)
    }

    fn incoming(&mut self, packet: IncomingPacket) {
        match &packet {
            IncomingPacket::Result(result) => {
                self.history
                    .record(MessageType::Receive, "result", packet.to_value());
                self.result(result.clone());
            }
            IncomingPacket::Props(props) => {
                self.history
                    .record(MessageType::Push, "props", packet.to_value());
                if let Some(state) = self.aggregator.apply_props(&props.params) {
                    self.device_state.publish(state);
                }
            }
            IncomingPacket::Unknown => debug!("{}: ignoring unknown packet", self.address),
        }
    }

    fn result(&mut self, result: ResultPacket) {
        if self.prop_request == Some(result.id) {
            self.prop_request = None;
            if let Some(state) = self.aggregator.apply_result(&result.result) {
                self.device_state.publish(state);
            }
            return;
        }

        let Some(pending) = self.pending.remove(&result.id) else {
            debug!("{}: no command waiting for result {}", self.address, result.id);
            return;
        };
        let outcome = if result.is_success() {
            Ok(())
        } else {
            Err(Error::CommandRejected {
                method: pending.method,
                id: result.id,
                result: result.result,
            })
        };
        let _ = pending.reply.send(outcome);
    }

    fn diagnostics(&self) -> Value {
        json!({
            "address": self.address.to_string(),
            "connection_state": self.connection_state.get().to_string(),
            "device_state": serde_json::to_value(self.device_state.get()).unwrap_or(Value::Null),
            "interest": self.interest,
            "pending_commands": self.pending.len(),
            "history": serde_json::to_value(self.history.summary()).unwrap_or(Value::Null),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Debug;
    use std::time::Instant;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::{broadcast, mpsc as tokio_mpsc};

    use crate::types::Color;

    const WAIT: Duration = Duration::from_secs(2);
    const CLOSE: &str = "<close>";

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Ok,
        Error,
        Silent,
    }

    #[derive(Debug)]
    enum DeviceEvent {
        Accepted,
        Received(Value),
        Closed,
    }

    /// A loopback bulb answering `get_prop` with a fixed state.
    struct FakeDevice {
        address: Address,
        events: tokio_mpsc::UnboundedReceiver<DeviceEvent>,
        push: broadcast::Sender<String>,
    }

    impl FakeDevice {
        async fn start(reply: Reply) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let (events_tx, events) = tokio_mpsc::unbounded_channel();
            let (push, _) = broadcast::channel(16);

            let push_tx = push.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let _ = events_tx.send(DeviceEvent::Accepted);
                    tokio::spawn(serve(stream, reply, events_tx.clone(), push_tx.subscribe()));
                }
            });

            FakeDevice {
                address: Address::new("127.0.0.1", port),
                events,
                push,
            }
        }

        async fn next_event(&mut self) -> DeviceEvent {
            tokio::time::timeout(WAIT, self.events.recv())
                .await
                .expect("no device event")
                .expect("device stopped")
        }

        async fn received(&mut self, method: &str) -> Value {
            loop {
                if let DeviceEvent::Received(request) = self.next_event().await {
                    if request["method"] == method {
                        return request;
                    }
                }
            }
        }

        async fn closed(&mut self) {
            while !matches!(self.next_event().await, DeviceEvent::Closed) {}
        }

        async fn assert_quiet(&mut self, period: Duration) {
            if let Ok(event) = tokio::time::timeout(period, self.events.recv()).await {
                panic!("unexpected device event: {event:?}");
            }
        }

        fn push(&self, line: &str) {
            self.push.send(line.to_string()).unwrap();
        }
    }

    async fn serve(
        stream: TcpStream,
        reply: Reply,
        events: tokio_mpsc::UnboundedSender<DeviceEvent>,
        mut push: broadcast::Receiver<String>,
    ) {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let request: Value = serde_json::from_str(&line).unwrap();
                        let response = respond(&request, reply);
                        let _ = events.send(DeviceEvent::Received(request));
                        if let Some(response) = response {
                            let _ = writer.write_all(response.as_bytes()).await;
                        }
                    }
                    _ => break,
                },
                Ok(line) = push.recv() => {
                    if line == CLOSE {
                        break;
                    }
                    let _ = writer.write_all(format!("{line}\r\n").as_bytes()).await;
                }
            }
        }
        let _ = events.send(DeviceEvent::Closed);
    }

    fn respond(request: &Value, reply: Reply) -> Option<String> {
        let id = request["id"].as_i64()?;
        let response = match (request["method"].as_str()?, reply) {
            ("get_prop", _) => json!({"id": id, "result": ["on", "1", "4000", "120", "50"]}),
            (_, Reply::Ok) => json!({"id": id, "result": ["ok"]}),
            (_, Reply::Error) => json!({"id": id, "error": {"code": -1, "message": "unsupported method"}}),
            (_, Reply::Silent) => return None,
        };
        Some(format!("{response}\r\n"))
    }

    fn config() -> ControllerConfig {
        ControllerConfig::default()
            .with_command_timeout(Duration::from_millis(300))
            .with_detach_grace(Duration::from_millis(300))
    }

    async fn wait_for<T: PartialEq + Debug>(states: &mut Subscription<T>, expected: T) {
        tokio::time::timeout(WAIT, async {
            while let Some(state) = states.next().await {
                if state == expected {
                    return;
                }
            }
            panic!("state stream ended");
        })
        .await
        .unwrap_or_else(|_| panic!("never reached {expected:?}"));
    }

    fn initial_state() -> DeviceState {
        DeviceState::known(true, Color::Hsv(HueSaturation::create(120, 50).unwrap()))
    }

    #[tokio::test]
    async fn test_attach_connects_and_fetches_state() {
        let mut device = FakeDevice::start(Reply::Ok).await;
        let controller = DeviceController::new(device.address.clone(), config());
        let mut connection = controller.connection_state();

        assert_eq!(connection.next().await, Some(ConnectionState::Disconnected));
        controller.attach();
        assert_eq!(connection.next().await, Some(ConnectionState::Connecting));
        assert_eq!(connection.next().await, Some(ConnectionState::Connected));

        let request = device.received("get_prop").await;
        assert_eq!(request["params"], json!(["power", "color_mode", "ct", "hue", "sat"]));

        let state = controller.wait_for_state(WAIT).await.unwrap();
        assert_eq!(state, initial_state());
        assert_eq!(controller.current_device_state(), initial_state());
    }

    #[tokio::test]
    async fn test_command_resolves_on_matching_result() {
        let mut device = FakeDevice::start(Reply::Ok).await;
        let controller = DeviceController::new(device.address.clone(), config());
        controller.attach();
        controller.wait_for_state(WAIT).await.unwrap();

        controller.toggle().await.unwrap();
        controller.set_temperature(2700).await.unwrap();

        let toggle = device.received("toggle").await;
        assert_eq!(toggle["params"], json!([]));
        let ct = device.received("set_ct_abx").await;
        assert_eq!(ct["params"], json!([2700, "sudden", 0]));
    }

    #[tokio::test]
    async fn test_results_match_their_own_command() {
        let mut device = FakeDevice::start(Reply::Silent).await;
        let controller = Arc::new(DeviceController::new(device.address.clone(), config()));
        controller.attach();
        controller.wait_for_state(WAIT).await.unwrap();

        let toggle = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.toggle().await }
        });
        let toggle_id = device.received("toggle").await["id"].clone();

        let color = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.set_color(240, 100).await }
        });
        let request = device.received("set_hsv").await;
        assert_eq!(request["params"], json!([240, 100, "sudden", 0]));

        device.push(&json!({"id": request["id"], "result": ["ok"]}).to_string());
        assert!(color.await.unwrap().is_ok());

        let error = toggle.await.unwrap().unwrap_err();
        assert!(matches!(error, Error::CommandTimeout { method: Method::Toggle, id } if json!(id) == toggle_id));
    }

    #[tokio::test]
    async fn test_error_reply_rejects_command() {
        let device = FakeDevice::start(Reply::Error).await;
        let controller = DeviceController::new(device.address.clone(), config());
        controller.attach();
        controller.wait_for_state(WAIT).await.unwrap();

        let error = controller.set_power(PowerMode::Off).await.unwrap_err();
        assert!(matches!(error, Error::CommandRejected { method: Method::SetPower, .. }));
    }

    #[tokio::test]
    async fn test_command_while_disconnected_times_out() {
        let device = FakeDevice::start(Reply::Ok).await;
        let controller = DeviceController::new(device.address.clone(), config());

        let started = Instant::now();
        let error = controller.toggle().await.unwrap_err();
        assert!(matches!(error, Error::CommandTimeout { method: Method::Toggle, .. }));
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(controller.current_connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_invalid_arguments_fail_before_sending() {
        let device = FakeDevice::start(Reply::Ok).await;
        let controller = DeviceController::new(device.address.clone(), config());

        assert_eq!(
            controller.set_color(360, 50).await.unwrap_err(),
            Error::InvalidColor { hue: 360, saturation: 50 }
        );
        assert_eq!(
            controller.set_temperature(1000).await.unwrap_err(),
            Error::InvalidTemperature(1000)
        );
    }

    #[tokio::test]
    async fn test_props_push_updates_state() {
        let device = FakeDevice::start(Reply::Ok).await;
        let controller = DeviceController::new(device.address.clone(), config());
        let mut states = controller.device_state();
        controller.attach();
        wait_for(&mut states, initial_state()).await;

        device.push("not json");
        device.push(r#"{"method":"props","params":{"power":"off"}}"#);

        let expected = DeviceState::known(false, Color::Hsv(HueSaturation::create(120, 50).unwrap()));
        wait_for(&mut states, expected).await;

        let history = controller.history().await.unwrap();
        assert_eq!(history.summary().push_count, 1);
        assert!(history.last_error().is_some());
    }

    #[tokio::test]
    async fn test_last_detach_closes_after_grace() {
        let mut device = FakeDevice::start(Reply::Ok).await;
        let controller = DeviceController::new(device.address.clone(), config());
        let mut connection = controller.connection_state();
        controller.attach();
        wait_for(&mut connection, ConnectionState::Connected).await;

        let detached = Instant::now();
        controller.detach();
        wait_for(&mut connection, ConnectionState::Disconnected).await;
        assert!(detached.elapsed() >= Duration::from_millis(300));
        assert_eq!(controller.current_device_state(), DeviceState::Undefined);
        device.closed().await;
    }

    #[tokio::test]
    async fn test_pushes_queued_before_close_are_ignored() {
        let device = FakeDevice::start(Reply::Ok).await;
        let config = config().with_detach_grace(Duration::from_millis(100));
        let controller = DeviceController::new(device.address.clone(), config);
        let mut connection = controller.connection_state();
        controller.attach();
        controller.wait_for_state(WAIT).await.unwrap();

        // Keep the bulb pushing while the session is torn down.
        let push = device.push.clone();
        let flood = tokio::spawn(async move {
            for _ in 0..200 {
                let _ = push.send(r#"{"method":"props","params":{"power":"on"}}"#.to_string());
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        controller.detach();
        wait_for(&mut connection, ConnectionState::Disconnected).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        flood.abort();

        assert_eq!(controller.current_device_state(), DeviceState::Undefined);
        assert_eq!(controller.current_connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_attach_within_grace_keeps_connection() {
        let mut device = FakeDevice::start(Reply::Ok).await;
        let controller = DeviceController::new(device.address.clone(), config());
        controller.attach();
        controller.wait_for_state(WAIT).await.unwrap();
        device.received("get_prop").await;

        controller.detach();
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.attach();

        device.assert_quiet(Duration::from_millis(600)).await;
        assert_eq!(controller.current_connection_state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_extra_attach_does_not_reconnect() {
        let mut device = FakeDevice::start(Reply::Ok).await;
        let controller = DeviceController::new(device.address.clone(), config());
        controller.attach();
        device.received("get_prop").await;

        controller.attach();
        controller.detach();
        device.assert_quiet(Duration::from_millis(500)).await;

        let diagnostics = controller.diagnostics().await.unwrap();
        assert_eq!(diagnostics["interest"], 1);
        assert_eq!(diagnostics["connection_state"], "Connected");
    }

    #[tokio::test]
    async fn test_connect_replaces_connection() {
        let mut device = FakeDevice::start(Reply::Ok).await;
        let controller = DeviceController::new(device.address.clone(), config());
        let mut connection = controller.connection_state();
        let mut states = controller.device_state();
        controller.attach();
        wait_for(&mut connection, ConnectionState::Connected).await;
        wait_for(&mut states, initial_state()).await;

        controller.connect();
        wait_for(&mut connection, ConnectionState::Connecting).await;
        wait_for(&mut connection, ConnectionState::Connected).await;

        // The new session starts from an unknown state and fetches it again.
        let next = tokio::time::timeout(WAIT, states.next()).await.unwrap();
        assert_eq!(next, Some(DeviceState::Undefined));
        wait_for(&mut states, initial_state()).await;

        let (mut accepted, mut closed) = (0, 0);
        while accepted < 2 || closed < 1 {
            match device.next_event().await {
                DeviceEvent::Accepted => accepted += 1,
                DeviceEvent::Closed => closed += 1,
                DeviceEvent::Received(_) => {}
            }
        }
        controller.wait_for_state(WAIT).await.unwrap();
    }

    #[tokio::test]
    async fn test_device_close_disconnects() {
        let mut device = FakeDevice::start(Reply::Ok).await;
        let controller = DeviceController::new(device.address.clone(), config());
        let mut connection = controller.connection_state();
        controller.attach();
        controller.wait_for_state(WAIT).await.unwrap();

        device.push(CLOSE);
        wait_for(&mut connection, ConnectionState::Disconnected).await;
        assert_eq!(controller.current_device_state(), DeviceState::Undefined);

        device.closed().await;
        device.assert_quiet(Duration::from_millis(300)).await;
    }

    #[tokio::test]
    async fn test_refused_connection_reports_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let controller = DeviceController::new(Address::new("127.0.0.1", port), config());
        let mut connection = controller.connection_state();
        controller.attach();

        assert_eq!(connection.next().await, Some(ConnectionState::Disconnected));
        assert_eq!(connection.next().await, Some(ConnectionState::Connecting));
        assert_eq!(connection.next().await, Some(ConnectionState::Disconnected));

        let history = controller.history().await.unwrap();
        assert!(history.last_error().is_some());
    }

    #[tokio::test]
    async fn test_wait_for_state_times_out() {
        let device = FakeDevice::start(Reply::Ok).await;
        let controller = DeviceController::new(device.address.clone(), config());

        let error = controller
            .wait_for_state(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(error, Error::StateTimeout(Duration::from_millis(100)));
    }
}
