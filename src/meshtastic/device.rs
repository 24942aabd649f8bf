//! Serial link to a Meshtastic node.
//!
//! One port is shared between the caller (writes) and a background reader task
//! (reads, heartbeats). The reader keeps the node database current and hands every
//! received mesh packet to both the registered callback and the broadcast channel.

use super::convert::{node_id, to_inbound};
use super::framing::{encode_frame, FrameDecoder, START2};
use super::{DeliveryHandle, Destination, NodeDb, RadioLink, TransportError, SNR_UNKNOWN};
use crate::listener::{InboundPacket, PacketCallback, PacketFeed};
use crate::logutil::{escape_log, hex_snippet, truncate_for_log};
use crate::protobuf::meshtastic_generated as proto;
use chrono::Utc;
use log::{debug, info, trace, warn};
use prost::Message;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, MissedTickBehavior};

const WAKE_BYTES: usize = 32;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(300);
const READ_TICK: Duration = Duration::from_millis(10);
const PACKET_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_HOP_LIMIT: u32 = 3;

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn nonzero_random() -> u32 {
    loop {
        let id: u32 = rand::random();
        if id != 0 {
            return id;
        }
    }
}

#[derive(Debug, Default)]
struct LinkState {
    my_node_num: Option<u32>,
    config_id: u32,
    config_complete: bool,
    lora: Option<proto::LoRaConfig>,
    nodes: NodeDb,
}

/// Open the port 8N1, raise DTR/RTS and drop whatever boot chatter is buffered.
async fn open_port(port_name: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, TransportError> {
    debug!("Opening serial port {} at {} baud", port_name, baud_rate);
    let mut port = serialport::new(port_name, baud_rate)
        .timeout(Duration::from_millis(100))
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .open()?;

    let _ = port.write_data_terminal_ready(true);
    let _ = port.write_request_to_send(true);
    sleep(Duration::from_millis(150)).await;
    let _ = port.clear(serialport::ClearBuffer::Input);
    Ok(port)
}

fn write_toradio(port: &SharedPort, msg: &proto::ToRadio) -> Result<(), TransportError> {
    let mut payload = Vec::with_capacity(msg.encoded_len());
    msg.encode(&mut payload)?;
    let frame = encode_frame(&payload)?;
    {
        let mut port = lock(port);
        port.write_all(&frame)?;
        port.flush()?;
    }
    trace!("ToRadio {} bytes: {}", payload.len(), hex_snippet(&payload, 64));
    Ok(())
}

fn toradio(variant: proto::to_radio::PayloadVariant) -> proto::ToRadio {
    proto::ToRadio {
        payload_variant: Some(variant),
    }
}

/// Background task that owns the read half of the link.
struct RadioReader {
    port: SharedPort,
    state: Arc<Mutex<LinkState>>,
    callback: Arc<Mutex<Option<PacketCallback>>>,
    packets: broadcast::Sender<InboundPacket>,
    decoder: FrameDecoder,
    shutdown: watch::Receiver<bool>,
}

impl RadioReader {
    async fn run(mut self) {
        info!("Starting Meshtastic reader task");
        let mut tick = tokio::time::interval(READ_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        heartbeat.tick().await;

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    let beat = toradio(proto::to_radio::PayloadVariant::Heartbeat(proto::Heartbeat {
                        nonce: nonzero_random(),
                    }));
                    if let Err(e) = write_toradio(&self.port, &beat) {
                        debug!("Heartbeat send error: {}", e);
                    }
                }
                _ = tick.tick() => {
                    if let Err(e) = self.read_and_process() {
                        warn!("Serial read error: {} - continuing", e);
                        sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
        info!(
            "Meshtastic reader task shutting down ({} console bytes skipped)",
            self.decoder.skipped()
        );
    }

    fn read_and_process(&mut self) -> Result<(), TransportError> {
        let mut buffer = [0u8; 1024];
        let n = {
            let mut port = lock(&self.port);
            if port.bytes_to_read()? == 0 {
                return Ok(());
            }
            match port.read(&mut buffer) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => 0,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Ok(());
        }
        trace!("RAW {} bytes: {}", n, hex_snippet(&buffer[..n], 64));
        for frame in self.decoder.push(&buffer[..n]) {
            self.process_frame(&frame);
        }
        Ok(())
    }

    fn process_frame(&self, data: &[u8]) {
        use proto::from_radio::PayloadVariant as FR;
        let msg = match proto::FromRadio::decode(data) {
            Ok(m) => m,
            Err(e) => {
                debug!("Undecodable FromRadio frame ({} bytes): {}", data.len(), e);
                return;
            }
        };
        match msg.payload_variant {
            Some(FR::MyInfo(my)) => {
                lock(&self.state).my_node_num = Some(my.my_node_num);
                info!("Radio node: {}", node_id(my.my_node_num));
            }
            Some(FR::NodeInfo(ni)) => {
                let (user_id, long_name) = match ni.user {
                    Some(u) => (
                        Some(u.id).filter(|s| !s.is_empty()),
                        Some(u.long_name).filter(|s| !s.is_empty()),
                    ),
                    None => (None, None),
                };
                // proto3 leaves a never-heard SNR at zero.
                let snr = if ni.snr != 0.0 { ni.snr } else { SNR_UNKNOWN };
                trace!("NodeInfo {} snr={} last_heard={}", node_id(ni.num), ni.snr, ni.last_heard);
                lock(&self.state)
                    .nodes
                    .update_info(ni.num, user_id, long_name, snr, ni.last_heard);
            }
            Some(FR::Config(cfg)) => {
                if let Some(proto::config::PayloadVariant::Lora(lora)) = cfg.payload_variant {
                    debug!(
                        "LoRa config: use_preset={} modem_preset={} region={}",
                        lora.use_preset, lora.modem_preset, lora.region
                    );
                    lock(&self.state).lora = Some(lora);
                }
            }
            Some(FR::ConfigCompleteId(id)) => {
                let mut st = lock(&self.state);
                if id == st.config_id {
                    st.config_complete = true;
                    info!("Radio configuration received ({} nodes known)", st.nodes.len());
                } else {
                    debug!("Ignoring config_complete_id {} (waiting for {})", id, st.config_id);
                }
            }
            Some(FR::Packet(pkt)) => self.deliver(&pkt),
            None => trace!("FromRadio id={} without a known payload", msg.id),
        }
    }

    fn deliver(&self, pkt: &proto::MeshPacket) {
        let heard_at = if pkt.rx_time != 0 {
            pkt.rx_time
        } else {
            u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX)
        };
        if pkt.rx_snr != 0.0 {
            lock(&self.state).nodes.observe(pkt.from, pkt.rx_snr, heard_at);
        }
        let inbound = to_inbound(pkt);
        debug!(
            "Packet id={} from {} port={}",
            pkt.id,
            node_id(pkt.from),
            inbound
                .port()
                .map(|p| p.to_text())
                .unwrap_or_else(|| "encrypted".to_string())
        );
        if let Some(cb) = lock(&self.callback).as_ref() {
            cb(&inbound);
        }
        // No subscribers is fine.
        let _ = self.packets.send(inbound);
    }
}

/// A connected Meshtastic node.
pub struct MeshtasticDevice {
    port_name: String,
    port: SharedPort,
    state: Arc<Mutex<LinkState>>,
    callback: Arc<Mutex<Option<PacketCallback>>>,
    packets: broadcast::Sender<InboundPacket>,
    shutdown: watch::Sender<bool>,
    reader: Option<JoinHandle<()>>,
}

impl MeshtasticDevice {
    /// Open `port_name`, start the reader and wait for the configuration download.
    pub async fn connect(
        port_name: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        info!("Connecting to Meshtastic radio on {}...", port_name);
        let mut port = open_port(port_name, baud_rate).await?;
        port.write_all(&[START2; WAKE_BYTES])?;
        port.flush()?;
        sleep(Duration::from_millis(100)).await;

        let port: SharedPort = Arc::new(Mutex::new(port));
        let state = Arc::new(Mutex::new(LinkState::default()));
        let callback: Arc<Mutex<Option<PacketCallback>>> = Arc::new(Mutex::new(None));
        let (packets, _) = broadcast::channel(PACKET_CHANNEL_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let reader = RadioReader {
            port: Arc::clone(&port),
            state: Arc::clone(&state),
            callback: Arc::clone(&callback),
            packets: packets.clone(),
            decoder: FrameDecoder::new(),
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(reader.run());

        let device = Self {
            port_name: port_name.to_string(),
            port,
            state,
            callback,
            packets,
            shutdown,
            reader: Some(handle),
        };

        let config_id = nonzero_random();
        lock(&device.state).config_id = config_id;
        write_toradio(
            &device.port,
            &toradio(proto::to_radio::PayloadVariant::WantConfigId(config_id)),
        )?;
        debug!("Requested configuration (id={})", config_id);

        let deadline = Instant::now() + timeout;
        loop {
            {
                let st = lock(&device.state);
                if st.config_complete && st.my_node_num.is_some() {
                    break;
                }
            }
            if Instant::now() >= deadline {
                device.close().await;
                return Err(TransportError::ConnectTimeout {
                    seconds: timeout.as_secs(),
                });
            }
            sleep(Duration::from_millis(50)).await;
        }
        info!("Connected to Meshtastic radio on {}", port_name);
        Ok(device)
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Our own node number, once the radio reported it.
    pub fn node_num(&self) -> Option<u32> {
        lock(&self.state).my_node_num
    }

    /// Switch the radio to LoRa modem preset `preset`.
    ///
    /// Sends an admin `set_config` to our own node carrying the current LoRa config
    /// with the preset replaced. Nothing is sent when the preset already matches.
    pub fn apply_modem_preset(&mut self, preset: i32) -> Result<(), TransportError> {
        let (me, mut lora) = {
            let st = lock(&self.state);
            let me = st.my_node_num.ok_or(TransportError::NotConnected)?;
            let lora = st.lora.clone().ok_or(TransportError::ConfigUnavailable)?;
            (me, lora)
        };
        if lora.use_preset && lora.modem_preset == preset {
            info!("Radio already on modem preset {}", preset);
            return Ok(());
        }
        lora.use_preset = true;
        lora.modem_preset = preset;

        let admin = proto::AdminMessage {
            payload_variant: Some(proto::admin_message::PayloadVariant::SetConfig(proto::Config {
                payload_variant: Some(proto::config::PayloadVariant::Lora(lora.clone())),
            })),
        };
        let mut payload = Vec::with_capacity(admin.encoded_len());
        admin.encode(&mut payload)?;

        let pkt = proto::MeshPacket {
            from: me,
            to: me,
            id: nonzero_random(),
            hop_limit: DEFAULT_HOP_LIMIT,
            want_ack: true,
            priority: proto::mesh_packet::PRIORITY_RELIABLE,
            payload_variant: Some(proto::mesh_packet::PayloadVariant::Decoded(proto::Data {
                portnum: proto::PortNum::AdminApp as i32,
                payload,
                want_response: true,
                ..Default::default()
            })),
            ..Default::default()
        };
        write_toradio(&self.port, &toradio(proto::to_radio::PayloadVariant::Packet(pkt)))?;
        lock(&self.state).lora = Some(lora);
        info!("Radio set to modem preset {}", preset);
        Ok(())
    }

    /// Tell the radio we are leaving and stop the reader.
    pub async fn close(mut self) {
        let bye = toradio(proto::to_radio::PayloadVariant::Disconnect(true));
        if let Err(e) = write_toradio(&self.port, &bye) {
            debug!("Disconnect send error: {}", e);
        }
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.reader.take() {
            if let Err(e) = handle.await {
                warn!("Reader task ended abnormally: {}", e);
            }
        }
        info!("Closed radio link on {}", self.port_name);
    }
}

impl Drop for MeshtasticDevice {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl RadioLink for MeshtasticDevice {
    fn send_text(
        &mut self,
        text: &str,
        destination: &Destination,
        want_ack: bool,
    ) -> Result<DeliveryHandle, TransportError> {
        let (from, to) = {
            let st = lock(&self.state);
            let from = st.my_node_num.ok_or(TransportError::NotConnected)?;
            let to = st
                .nodes
                .resolve(destination)
                .ok_or_else(|| TransportError::NodeIdUnknown(destination.to_string()))?;
            (from, to)
        };
        let packet_id = nonzero_random();
        let pkt = proto::MeshPacket {
            from,
            to,
            id: packet_id,
            hop_limit: DEFAULT_HOP_LIMIT,
            want_ack,
            priority: if want_ack {
                proto::mesh_packet::PRIORITY_RELIABLE
            } else {
                0
            },
            payload_variant: Some(proto::mesh_packet::PayloadVariant::Decoded(proto::Data {
                portnum: proto::PortNum::TextMessageApp as i32,
                payload: text.as_bytes().to_vec(),
                ..Default::default()
            })),
            ..Default::default()
        };
        write_toradio(&self.port, &toradio(proto::to_radio::PayloadVariant::Packet(pkt)))?;
        debug!(
            "Sent text id={} to {} want_ack={}: '{}'",
            packet_id,
            destination,
            want_ack,
            truncate_for_log(&escape_log(text), 120)
        );
        Ok(DeliveryHandle { packet_id })
    }

    fn snr_for(&self, destination: &Destination) -> Option<f32> {
        lock(&self.state).nodes.snr_for(destination)
    }

    fn latest_snr(&self) -> Option<f32> {
        lock(&self.state).nodes.latest_snr()
    }
}

impl PacketFeed for MeshtasticDevice {
    fn on_receive(&mut self, callback: PacketCallback) {
        *lock(&self.callback) = Some(callback);
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundPacket> {
        self.packets.subscribe()
    }
}
