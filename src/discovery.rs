//! Device discovery via SSDP-style UDP multicast.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::channel::oneshot;
use futures::future::{self, AbortHandle, Either};
use futures::{StreamExt, pin_mut};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::DiscoveryConfig;
use crate::errors::Error;
use crate::observable::{Observable, Subscription};
use crate::runtime::{self, AsyncUdpSocket, UdpSocket};

type Result<T> = std::result::Result<T, Error>;

const LOCATION_PREFIX: &str = "Location: yeelight://";

/// A light that answered a search request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub host: String,
    pub port: u16,
}

impl Device {
    pub fn address(&self) -> Address {
        Address::new(&self.host, self.port)
    }
}

impl From<Device> for Address {
    fn from(device: Device) -> Self {
        Address::new(&device.host, device.port)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.id, self.host, self.port)
    }
}

/// Progress of the discovery engine.
///
/// Device lists are unique by id and sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryState {
    /// A search cycle was triggered.
    Discovering,
    /// The search request went out; devices found so far in this cycle.
    Discovered(Vec<Device>),
    /// The cycle ended; every device found in it.
    Finished(Vec<Device>),
    /// The search socket could not be opened or the request not sent.
    Failed,
}

impl DiscoveryState {
    pub fn devices(&self) -> &[Device] {
        match self {
            DiscoveryState::Discovered(devices) | DiscoveryState::Finished(devices) => devices,
            DiscoveryState::Discovering | DiscoveryState::Failed => &[],
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, DiscoveryState::Finished(_))
    }
}

impl Default for DiscoveryState {
    fn default() -> Self {
        DiscoveryState::Finished(Vec::new())
    }
}

/// Searches the local network for lights.
///
/// Each cycle binds the configured local port, multicasts one search request
/// and collects responses until none arrives within the receive timeout.
/// Cycles run on demand through [`discover`](Self::discover) and periodically
/// between [`start`](Self::start) and [`stop`](Self::stop). A new cycle
/// closes the socket of the one it replaces before binding its own.
///
/// # Example
///
/// ```no_run
/// use futures::StreamExt;
/// use yeelight_rs::{Discovery, DiscoveryConfig, DiscoveryState};
///
/// # async fn run() {
/// let discovery = Discovery::new(DiscoveryConfig::default());
/// let mut states = discovery.state();
/// discovery.discover();
/// while let Some(state) = states.next().await {
///     if let DiscoveryState::Finished(devices) = state {
///         println!("found {} lights", devices.len());
///         break;
///     }
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct Discovery {
    config: DiscoveryConfig,
    requests: UnboundedSender<Event>,
    state: Arc<Observable<DiscoveryState>>,
}

impl Discovery {
    /// Create the engine. Needs a running async runtime.
    pub fn new(config: DiscoveryConfig) -> Self {
        let (requests, requests_rx) = mpsc::unbounded();
        let (internal, internal_rx) = mpsc::unbounded();
        let state = Arc::new(Observable::new(DiscoveryState::default()));

        let event_loop = EventLoop {
            config: config.clone(),
            internal,
            state: Arc::clone(&state),
            ticker: None,
            cycle: 0,
            active: None,
            closing: None,
        };
        runtime::spawn_detached(event_loop.run(requests_rx, internal_rx));

        Discovery {
            config,
            requests,
            state,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Run a cycle now and then once every interval until stopped.
    pub fn start(&self) {
        self.request(Event::Start);
    }

    /// Stop periodic cycles and end the running one.
    pub fn stop(&self) {
        self.request(Event::Stop);
    }

    /// Run one extra cycle now.
    pub fn discover(&self) {
        self.request(Event::Trigger);
    }

    /// Stream of discovery states, starting with the current one.
    pub fn state(&self) -> Subscription<DiscoveryState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> DiscoveryState {
        self.state.get()
    }

    fn request(&self, event: Event) {
        if self.requests.unbounded_send(event).is_err() {
            warn!("discovery event loop is gone");
        }
    }
}

#[derive(Debug)]
enum Event {
    Start,
    Stop,
    Trigger,
    Progress { cycle: u64, state: DiscoveryState },
}

/// A running search cycle.
#[derive(Debug)]
struct CycleHandle {
    // Dropping it cancels the cycle.
    _cancel: oneshot::Sender<()>,
    done: oneshot::Receiver<()>,
}

struct EventLoop {
    config: DiscoveryConfig,
    internal: UnboundedSender<Event>,
    state: Arc<Observable<DiscoveryState>>,
    ticker: Option<AbortHandle>,
    cycle: u64,
    active: Option<CycleHandle>,
    /// Resolves once a stopped cycle released its socket.
    closing: Option<oneshot::Receiver<()>>,
}

impl EventLoop {
    async fn run(mut self, mut requests: UnboundedReceiver<Event>, mut internal: UnboundedReceiver<Event>) {
        loop {
            let event = futures::select! {
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

        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        debug!("discovery stopped");
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Start => self.start(),
            Event::Stop => {
                if let Some(ticker) = self.ticker.take() {
                    info!("stopping periodic discovery");
                    ticker.abort();
                }
                // The cancelled cycle still reports its final state.
                if let Some(handle) = self.active.take() {
                    self.closing = Some(handle.done);
                }
            }
            Event::Trigger => self.trigger(),
            Event::Progress { cycle, state } if cycle == self.cycle => self.state.publish(state),
            Event::Progress { cycle, .. } => debug!("suppressing state of superseded cycle {cycle}"),
        }
    }

    fn start(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        info!("starting periodic discovery every {:?}", self.config.interval);

        let interval = self.config.interval;
        let internal = self.internal.clone();
        let (ticker, abort) = future::abortable(async move {
            loop {
                if internal.unbounded_send(Event::Trigger).is_err() {
                    break;
                }
                runtime::sleep(interval).await;
            }
        });
        runtime::spawn_detached(async move {
            let _ = ticker.await;
        });
        self.ticker = Some(abort);
    }

    fn trigger(&mut self) {
        self.cycle += 1;
        let cycle = self.cycle;
        self.state.publish(DiscoveryState::Discovering);

        let previous = match self.active.take() {
            Some(handle) => Some(handle.done),
            None => self.closing.take(),
        };
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let internal = self.internal.clone();
        let report = move |state| {
            let _ = internal.unbounded_send(Event::Progress { cycle, state });
        };

        debug!("starting discovery cycle {cycle}");
        runtime::spawn_detached(run_cycle(self.config.clone(), previous, cancel_rx, report, done_tx));
        self.active = Some(CycleHandle {
            _cancel: cancel_tx,
            done: done_rx,
        });
    }
}

async fn run_cycle<F>(
    config: DiscoveryConfig,
    previous: Option<oneshot::Receiver<()>>,
    mut cancel: oneshot::Receiver<()>,
    report: F,
    _done: oneshot::Sender<()>,
) where
    F: Fn(DiscoveryState) + Send + 'static,
{
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    let socket = match UdpSocket::bind(&format!("0.0.0.0:{}", config.local_port)).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("cannot discover devices: {}", Error::socket("bind", e));
            report(DiscoveryState::Failed);
            return;
        }
    };

    let request = search_request(&config);
    if let Err(e) = socket
        .send_to(request.as_bytes(), &config.multicast_addr.to_string())
        .await
    {
        warn!("cannot discover devices: {}", Error::socket("send_to", e));
        report(DiscoveryState::Failed);
        return;
    }
    report(DiscoveryState::Discovered(Vec::new()));

    let mut devices: HashMap<String, Device> = HashMap::new();
    let mut buffer = vec![0u8; config.buffer_size];
    loop {
        let received = {
            let receive = runtime::timeout(config.receive_timeout, socket.recv_from(&mut buffer));
            pin_mut!(receive);
            match future::select(receive, &mut cancel).await {
                Either::Left((received, _)) => received,
                Either::Right(_) => {
                    debug!("discovery cycle cancelled");
                    break;
                }
            }
        };

        match received {
            Ok(Ok((size, from))) => match parse_response(&buffer[..size]) {
                Ok(device) => {
                    debug!("{from}: found {device}");
                    devices.insert(device.id.clone(), device);
                    report(DiscoveryState::Discovered(sorted(&devices)));
                }
                Err(e) => debug!("{from}: skipping response: {e}"),
            },
            Ok(Err(e)) => {
                debug!("{}", Error::socket("recv_from", e));
                break;
            }
            Err(_) => break,
        }
    }

    drop(socket);
    info!("discovery finished with {} devices", devices.len());
    report(DiscoveryState::Finished(sorted(&devices)));
}

fn search_request(config: &DiscoveryConfig) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\nHOST: {}\r\nMAN: \"ssdp:discover\"\r\nST: wifi_bulb",
        config.multicast_addr
    )
}

fn sorted(devices: &HashMap<String, Device>) -> Vec<Device> {
    let mut devices: Vec<Device> = devices.values().cloned().collect();
    devices.sort_by(|a, b| a.id.cmp(&b.id));
    devices
}

/// Parse a search response into a [`Device`].
///
/// Needs an `id` header and a `Location: yeelight://<ip>:<port>` header.
pub fn parse_response(data: &[u8]) -> Result<Device> {
    let text = String::from_utf8(data.to_vec()).map_err(Error::Utf8Decode)?;
    let id = parse_id(&text).ok_or_else(|| Error::InvalidResponse("no id header".to_string()))?;
    let (host, port) = parse_location(&text)
        .ok_or_else(|| Error::InvalidResponse("no location header".to_string()))?;
    Ok(Device { id, host, port })
}

fn parse_id(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let rest = line.strip_prefix("id")?;
        let value = rest.strip_prefix(':').or_else(|| rest.strip_prefix(' '))?.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn parse_location(text: &str) -> Option<(String, u16)> {
    text.lines().find_map(|line| {
        let (host, port) = line.strip_prefix(LOCATION_PREFIX)?.trim_end().rsplit_once(':')?;
        let valid_host = !host.is_empty() && host.chars().all(|c| c.is_ascii_digit() || c == '.');
        let port = port.parse().ok()?;
        valid_host.then(|| (host.to_string(), port))
    })
}
