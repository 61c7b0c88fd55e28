//! In-memory transport and clock for driving a session deterministically.

use crate::channel::{
    Channel, ChannelEndpoint, ChannelEnvelope, InboundEvent, OutboundEvent, Transport,
};
use crate::clock::Clock;
use crate::decoder::{MessageKind, SchemaCatalog};
use crate::session::{AdapterAddress, AdapterId, AdapterSpec, HmiSession, SessionSettings};

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

/// Transport that keeps every endpoint it opened instead of connecting anywhere.
#[derive(Default)]
pub struct RecordingTransport {
    endpoints: Mutex<Vec<ChannelEndpoint>>,
}

impl RecordingTransport {
    pub fn opened(&self) -> usize {
        self.endpoints.lock().unwrap().len()
    }

    /// Emit `event` on the `nth` channel ever opened (0-based).
    pub fn emit_on(&self, nth: usize, event: InboundEvent) {
        let endpoints = self.endpoints.lock().unwrap();
        endpoints[nth].sink.emit(event);
    }

    /// Emit `event` on the newest channel opened for `adapter_id`.
    pub fn emit(&self, adapter_id: AdapterId, event: InboundEvent) {
        let endpoints = self.endpoints.lock().unwrap();
        let endpoint = endpoints
            .iter()
            .rev()
            .find(|e| e.sink.adapter_id() == adapter_id)
            .expect("no channel opened for adapter");
        endpoint.sink.emit(event);
    }

    /// Outbound events queued on the newest channel of `adapter_id` so far.
    pub fn sent(&self, adapter_id: AdapterId) -> Vec<OutboundEvent> {
        let mut endpoints = self.endpoints.lock().unwrap();
        let endpoint = endpoints
            .iter_mut()
            .rev()
            .find(|e| e.sink.adapter_id() == adapter_id)
            .expect("no channel opened for adapter");
        let mut sent = Vec::new();
        while let Ok(event) = endpoint.outbound.try_recv() {
            sent.push(event);
        }
        sent
    }

    /// Whether the newest channel of `adapter_id` has been closed by its owner.
    pub fn was_closed(&self, adapter_id: AdapterId) -> bool {
        let mut endpoints = self.endpoints.lock().unwrap();
        let endpoint = endpoints
            .iter_mut()
            .rev()
            .find(|e| e.sink.adapter_id() == adapter_id)
            .expect("no channel opened for adapter");
        matches!(endpoint.shutdown.try_recv(), Ok(()))
    }
}

impl Transport for RecordingTransport {
    fn open(
        &self,
        adapter_id: AdapterId,
        address: &AdapterAddress,
        events: mpsc::UnboundedSender<ChannelEnvelope>,
    ) -> Channel {
        let (channel, endpoint) = Channel::pair(adapter_id, address.clone(), events);
        self.endpoints.lock().unwrap().push(endpoint);
        channel
    }
}

/// Clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// A session wired to a [`RecordingTransport`] and a [`ManualClock`].
pub struct TestSession {
    pub session: HmiSession,
    pub transport: Arc<RecordingTransport>,
    pub clock: Arc<ManualClock>,
    events: mpsc::UnboundedReceiver<ChannelEnvelope>,
}

impl TestSession {
    pub fn new() -> Self {
        Self::with_settings(SessionSettings::default())
    }

    pub fn with_settings(settings: SessionSettings) -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let clock = Arc::new(ManualClock::default());
        let (events_tx, events) = mpsc::unbounded_channel();
        let session = HmiSession::new(transport.clone(), events_tx, settings, clock.clone());
        Self {
            session,
            transport,
            clock,
            events,
        }
    }

    /// Session with both schema resources installed.
    pub fn with_schemas() -> Self {
        let mut test = Self::new();
        test.session
            .install_schema(MessageKind::Common, load_schema(MessageKind::Common));
        test.session
            .install_schema(MessageKind::Share, load_schema(MessageKind::Share));
        test
    }

    pub fn add(&mut self, id: AdapterId, host: &str, port: u16) -> AdapterId {
        let spec = AdapterSpec::new(Some(id), format!("Adapter {id}"), host, port).unwrap();
        self.session.add_adapter(spec).unwrap()
    }

    /// Deliver everything the transport emitted, in order.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(envelope) = self.events.try_recv() {
            self.session.handle_event(envelope);
            handled += 1;
        }
        handled
    }

    /// Emit on the current channel of `adapter_id` and deliver it.
    pub fn inbound(&mut self, adapter_id: AdapterId, event: InboundEvent) {
        self.transport.emit(adapter_id, event);
        self.pump();
    }

    /// Connect `adapter_id` and complete the handshake.
    pub fn connected(&mut self, adapter_id: AdapterId) {
        assert!(self.session.request_connect(adapter_id));
        self.inbound(adapter_id, InboundEvent::Connect);
    }
}

pub fn schema_path(kind: MessageKind) -> PathBuf {
    let file = match kind {
        MessageKind::Common => crate::COMMON_SCHEMA_PATH,
        MessageKind::Share => crate::SHARE_SCHEMA_PATH,
    };
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(file)
}

pub fn load_schema(
    kind: MessageKind,
) -> Result<SchemaCatalog, crate::error::decode::DecodeError> {
    SchemaCatalog::load(kind, &schema_path(kind))
}

/// Hand-written mirror of `Share1` for producing wire bytes in tests.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Share1 {
    #[prost(int32, tag = "1")]
    pub starting_number: i32,
    #[prost(int32, tag = "2")]
    pub ending_number: i32,
    #[prost(int32, tag = "3")]
    pub counter: i32,
}

/// Hand-written mirror of `Common1`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Common1 {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(string, tag = "2")]
    pub device_name: String,
    #[prost(uint32, tag = "3")]
    pub registry_id: u32,
    #[prost(uint32, tag = "4")]
    pub shares_version: u32,
    #[prost(uint32, tag = "5")]
    pub firmware_version: u32,
    #[prost(uint32, tag = "6")]
    pub serial_number: u32,
}
