//! Meshtastic protobuf messages
//!
//! Only the subset of `meshtastic/mesh.proto` the relay needs is declared here, with
//! field tags matching the upstream definitions. Fields and oneof variants that are not
//! listed are skipped by prost on decode, so newer firmware stays compatible.

pub mod meshtastic {
    /// Application port numbers (subset of `PortNum`).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum PortNum {
        UnknownApp = 0,
        TextMessageApp = 1,
        RoutingApp = 5,
    }

    /// Decoded packet payload.
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
        #[prost(int32, tag = "11")]
        pub priority: i32,
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
            #[prost(bytes = "vec", tag = "5")]
            Encrypted(Vec<u8>),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MyNodeInfo {
        #[prost(uint32, tag = "1")]
        pub my_node_num: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Heartbeat {
        #[prost(uint32, tag = "1")]
        pub nonce: u32,
    }

    /// Routing result for a reliable packet. `error_reason` 0 means delivered.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Routing {
        #[prost(int32, optional, tag = "3")]
        pub error_reason: Option<i32>,
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
        #[prost(oneof = "from_radio::PayloadVariant", tags = "2, 3, 7, 8")]
        pub payload_variant: Option<from_radio::PayloadVariant>,
    }

    pub mod from_radio {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum PayloadVariant {
            #[prost(message, tag = "2")]
            Packet(super::MeshPacket),
            #[prost(message, tag = "3")]
            MyInfo(super::MyNodeInfo),
            #[prost(uint32, tag = "7")]
            ConfigCompleteId(u32),
            #[prost(bool, tag = "8")]
            Rebooted(bool),
        }
    }
}
