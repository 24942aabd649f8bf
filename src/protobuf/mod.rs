//! Meshtastic wire messages
//!
//! The subset of the Meshtastic protobuf schema (`mesh.proto`, `config.proto`,
//! `admin.proto`, `portnums.proto`) this crate speaks, declared directly with
//! `prost` derives. Field numbers follow the upstream schema so frames interoperate
//! with stock firmware; fields not declared here are skipped on decode.

#[cfg(feature = "meshtastic-proto")]
pub mod meshtastic_generated {
    #![allow(clippy::derive_partial_eq_without_eq)]

    /// Application port numbers.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum PortNum {
        UnknownApp = 0,
        TextMessageApp = 1,
        RemoteHardwareApp = 2,
        PositionApp = 3,
        NodeinfoApp = 4,
        RoutingApp = 5,
        AdminApp = 6,
        TextMessageCompressedApp = 7,
        WaypointApp = 8,
        TelemetryApp = 67,
        TracerouteApp = 70,
        NeighborinfoApp = 71,
    }

    impl PortNum {
        /// Upstream enum value name, e.g. `TEXT_MESSAGE_APP`.
        pub fn as_str_name(&self) -> &'static str {
            match self {
                PortNum::UnknownApp => "UNKNOWN_APP",
                PortNum::TextMessageApp => "TEXT_MESSAGE_APP",
                PortNum::RemoteHardwareApp => "REMOTE_HARDWARE_APP",
                PortNum::PositionApp => "POSITION_APP",
                PortNum::NodeinfoApp => "NODEINFO_APP",
                PortNum::RoutingApp => "ROUTING_APP",
                PortNum::AdminApp => "ADMIN_APP",
                PortNum::TextMessageCompressedApp => "TEXT_MESSAGE_COMPRESSED_APP",
                PortNum::WaypointApp => "WAYPOINT_APP",
                PortNum::TelemetryApp => "TELEMETRY_APP",
                PortNum::TracerouteApp => "TRACEROUTE_APP",
                PortNum::NeighborinfoApp => "NEIGHBORINFO_APP",
            }
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Data {
        #[prost(enumeration = "PortNum", tag = "1")]
        pub portnum: i32,
        #[prost(bytes = "vec", tag = "2")]
        pub payload: Vec<u8>,
        #[prost(bool, tag = "3")]
        pub want_response: bool,
        #[prost(fixed32, tag = "4")]
        pub dest: u32,
        #[prost(fixed32, tag = "5")]
        pub source: u32,
        #[prost(fixed32, tag = "6")]
        pub request_id: u32,
        #[prost(fixed32, tag = "7")]
        pub reply_id: u32,
        #[prost(fixed32, tag = "8")]
        pub emoji: u32,
        #[prost(uint32, optional, tag = "9")]
        pub bitfield: Option<u32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MeshPacket {
        #[prost(fixed32, tag = "1")]
        pub from: u32,
        #[prost(fixed32, tag = "2")]
        pub to: u32,
        #[prost(uint32, tag = "3")]
        pub channel: u32,
        #[prost(fixed32, tag = "6")]
        pub id: u32,
        #[prost(fixed32, tag = "7")]
        pub rx_time: u32,
        #[prost(float, tag = "8")]
        pub rx_snr: f32,
        #[prost(uint32, tag = "9")]
        pub hop_limit: u32,
        #[prost(bool, tag = "10")]
        pub want_ack: bool,
        #[prost(uint32, tag = "11")]
        pub priority: u32,
        #[prost(int32, tag = "12")]
        pub rx_rssi: i32,
        #[prost(oneof = "mesh_packet::PayloadVariant", tags = "4, 5")]
        pub payload_variant: Option<mesh_packet::PayloadVariant>,
    }

    pub mod mesh_packet {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum PayloadVariant {
            #[prost(message, tag = "4")]
            Decoded(super::Data),
            #[prost(bytes, tag = "5")]
            Encrypted(Vec<u8>),
        }

        /// Priority used for packets that request an acknowledgement.
        pub const PRIORITY_RELIABLE: u32 = 70;
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct User {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(string, tag = "2")]
        pub long_name: String,
        #[prost(string, tag = "3")]
        pub short_name: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodeInfo {
        #[prost(uint32, tag = "1")]
        pub num: u32,
        #[prost(message, optional, tag = "2")]
        pub user: Option<User>,
        #[prost(float, tag = "4")]
        pub snr: f32,
        #[prost(fixed32, tag = "5")]
        pub last_heard: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MyNodeInfo {
        #[prost(uint32, tag = "1")]
        pub my_node_num: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct LoRaConfig {
        #[prost(bool, tag = "1")]
        pub use_preset: bool,
        #[prost(int32, tag = "2")]
        pub modem_preset: i32,
        #[prost(uint32, tag = "3")]
        pub bandwidth: u32,
        #[prost(uint32, tag = "4")]
        pub spread_factor: u32,
        #[prost(uint32, tag = "5")]
        pub coding_rate: u32,
        #[prost(float, tag = "6")]
        pub frequency_offset: f32,
        #[prost(int32, tag = "7")]
        pub region: i32,
        #[prost(uint32, tag = "8")]
        pub hop_limit: u32,
        #[prost(bool, tag = "9")]
        pub tx_enabled: bool,
        #[prost(int32, tag = "10")]
        pub tx_power: i32,
        #[prost(uint32, tag = "11")]
        pub channel_num: u32,
        #[prost(bool, tag = "12")]
        pub override_duty_cycle: bool,
        #[prost(bool, tag = "13")]
        pub sx126x_rx_boosted_gain: bool,
        #[prost(float, tag = "14")]
        pub override_frequency: f32,
        #[prost(bool, tag = "15")]
        pub pa_fan_disabled: bool,
        #[prost(uint32, repeated, tag = "103")]
        pub ignore_incoming: Vec<u32>,
        #[prost(bool, tag = "104")]
        pub ignore_mqtt: bool,
        #[prost(bool, tag = "105")]
        pub config_ok_to_mqtt: bool,
    }

    /// Device configuration; only the LoRa section is modelled.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Config {
        #[prost(oneof = "config::PayloadVariant", tags = "6")]
        pub payload_variant: Option<config::PayloadVariant>,
    }

    pub mod config {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum PayloadVariant {
            #[prost(message, tag = "6")]
            Lora(super::LoRaConfig),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AdminMessage {
        #[prost(oneof = "admin_message::PayloadVariant", tags = "34")]
        pub payload_variant: Option<admin_message::PayloadVariant>,
    }

    pub mod admin_message {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum PayloadVariant {
            #[prost(message, tag = "34")]
            SetConfig(super::Config),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Heartbeat {
        #[prost(uint32, tag = "1")]
        pub nonce: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ToRadio {
        #[prost(oneof = "to_radio::PayloadVariant", tags = "1, 3, 4, 7")]
        pub payload_variant: Option<to_radio::PayloadVariant>,
    }

    pub mod to_radio {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum PayloadVariant {
            #[prost(message, tag = "1")]
            Packet(super::MeshPacket),
            #[prost(uint32, tag = "3")]
            WantConfigId(u32),
            #[prost(bool, tag = "4")]
            Disconnect(bool),
            #[prost(message, tag = "7")]
            Heartbeat(super::Heartbeat),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FromRadio {
        #[prost(uint32, tag = "1")]
        pub id: u32,
        #[prost(oneof = "from_radio::PayloadVariant", tags = "2, 3, 4, 5, 7")]
        pub payload_variant: Option<from_radio::PayloadVariant>,
    }

    pub mod from_radio {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum PayloadVariant {
            #[prost(message, tag = "2")]
            Packet(super::MeshPacket),
            #[prost(message, tag = "3")]
            MyInfo(super::MyNodeInfo),
            #[prost(message, tag = "4")]
            NodeInfo(super::NodeInfo),
            #[prost(message, tag = "5")]
            Config(super::Config),
            #[prost(uint32, tag = "7")]
            ConfigCompleteId(u32),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use prost::Message;

        #[test]
        fn text_packet_survives_the_wire() {
            let pkt = MeshPacket {
                from: 0x1234_5678,
                to: 0xffff_ffff,
                id: 42,
                hop_limit: 3,
                payload_variant: Some(mesh_packet::PayloadVariant::Decoded(Data {
                    portnum: PortNum::TextMessageApp as i32,
                    payload: b"hi".to_vec(),
                    ..Default::default()
                })),
                ..Default::default()
            };
            let frame = FromRadio {
                id: 1,
                payload_variant: Some(from_radio::PayloadVariant::Packet(pkt.clone())),
            }
            .encode_to_vec();
            let back = FromRadio::decode(frame.as_slice()).unwrap();
            assert_eq!(back.payload_variant, Some(from_radio::PayloadVariant::Packet(pkt)));
        }

        #[test]
        fn port_names_match_upstream() {
            assert_eq!(PortNum::TextMessageApp.as_str_name(), "TEXT_MESSAGE_APP");
            assert_eq!(PortNum::try_from(67).unwrap(), PortNum::TelemetryApp);
        }
    }
}
