//! Wire packet to [`InboundPacket`] conversion.
//!
//! The resulting shape follows the dictionaries the Meshtastic client libraries hand
//! to applications: numeric `from`/`to`, `fromId`/`toId` strings, and a `decoded`
//! mapping with the port name, raw `payload` bytes and, for text, a `text` key.
use crate::listener::{InboundPacket, PacketValue};
use crate::protobuf::meshtastic_generated as proto;
use proto::mesh_packet::PayloadVariant;

use super::BROADCAST_NUM;

/// `!xxxxxxxx` node ID for a node number.
pub fn node_id(num: u32) -> String {
    format!("!{:08x}", num)
}

fn port_value(portnum: i32) -> PacketValue {
    match proto::PortNum::try_from(portnum) {
        Ok(port) => PacketValue::from(port.as_str_name()),
        Err(_) => PacketValue::Int(i64::from(portnum)),
    }
}

fn decoded_value(data: &proto::Data) -> PacketValue {
    let mut entries = vec![
        ("portnum", port_value(data.portnum)),
        ("payload", PacketValue::from(data.payload.clone())),
    ];
    if data.portnum == proto::PortNum::TextMessageApp as i32 {
        entries.push((
            "text",
            PacketValue::from(String::from_utf8_lossy(&data.payload).into_owned()),
        ));
    }
    if data.want_response {
        entries.push(("wantResponse", PacketValue::Bool(true)));
    }
    if data.request_id != 0 {
        entries.push(("requestId", PacketValue::from(data.request_id)));
    }
    if data.reply_id != 0 {
        entries.push(("replyId", PacketValue::from(data.reply_id)));
    }
    if let Some(bits) = data.bitfield {
        entries.push(("bitfield", PacketValue::from(bits)));
    }
    PacketValue::map(entries)
}

/// Flatten a received mesh packet.
pub fn to_inbound(pkt: &proto::MeshPacket) -> InboundPacket {
    let mut out = InboundPacket::new()
        .with("id", pkt.id)
        .with("from", pkt.from)
        .with("to", pkt.to)
        .with("fromId", node_id(pkt.from))
        .with(
            "toId",
            if pkt.to == BROADCAST_NUM {
                "^all".to_string()
            } else {
                node_id(pkt.to)
            },
        )
        .with("channel", pkt.channel)
        .with("hopLimit", pkt.hop_limit)
        .with("wantAck", pkt.want_ack);
    if pkt.rx_time != 0 {
        out.set("rxTime", pkt.rx_time);
    }
    if pkt.rx_snr != 0.0 {
        out.set("rxSnr", pkt.rx_snr);
    }
    if pkt.rx_rssi != 0 {
        out.set("rxRssi", pkt.rx_rssi);
    }
    match &pkt.payload_variant {
        Some(PayloadVariant::Decoded(data)) => out.set("decoded", decoded_value(data)),
        Some(PayloadVariant::Encrypted(bytes)) => out.set("encrypted", bytes.clone()),
        None => {}
    }
    out
}
