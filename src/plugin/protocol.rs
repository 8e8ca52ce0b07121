/// Wire messages exchanged between the host and a plugin process
///
/// Every message is protobuf-encoded and carried in a length-prefixed frame
/// (see `framing`). The conversation is strictly request/response:
///
/// 1. host sends `Hello`, plugin answers `HandshakeReply`
/// 2. host sends `Request`, plugin answers `Response`, repeated until the
///    channel closes or a `Shutdown` request is acknowledged
use prost::{Enumeration, Message};
use std::collections::HashMap;

/// Version of the host/plugin protocol spoken by this build
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable name carrying the magic cookie
pub const MAGIC_COOKIE_KEY: &str = "PLUGHOST_PLUGIN";

/// Magic cookie value a plugin must see in its environment and echo back
pub const MAGIC_COOKIE_VALUE: &str =
    "5f0c1c7e2b9a4d3c8e6f1a0b9d7c3e2a4b6d8f0e1c3a5b7d9f2e4c6a8b0d1f3e";

/// First frame sent by the host after launching a plugin
#[derive(Clone, PartialEq, Message)]
pub struct Hello {
    #[prost(uint32, tag = "1")]
    pub core_protocol: u32,
    #[prost(string, tag = "2")]
    pub core_version: String,
}

/// Plugin answer to `Hello`
#[derive(Clone, PartialEq, Message)]
pub struct HandshakeReply {
    #[prost(uint32, tag = "1")]
    pub protocol: u32,
    #[prost(string, tag = "2")]
    pub magic_cookie: String,
}

/// Remote methods every plugin exposes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum Method {
    Unspecified = 0,
    Name = 1,
    Version = 2,
    GetCapabilities = 3,
    Execute = 4,
    Shutdown = 5,
}

#[derive(Clone, PartialEq, Message)]
pub struct Request {
    #[prost(enumeration = "Method", tag = "1")]
    pub method: i32,
    #[prost(map = "string, string", tag = "2")]
    pub args: HashMap<String, String>,
}

impl Request {
    pub fn new(method: Method) -> Self {
        Self {
            method: method as i32,
            args: HashMap::new(),
        }
    }

    pub fn execute(args: HashMap<String, String>) -> Self {
        Self {
            method: Method::Execute as i32,
            args,
        }
    }
}

/// Plugin answer to a `Request`
///
/// `value` carries string results (name, version, execute output),
/// `capabilities` the capability list. A set `error` is an application
/// error reported by the plugin itself.
#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(string, tag = "1")]
    pub value: String,
    #[prost(string, repeated, tag = "2")]
    pub capabilities: Vec<String>,
    #[prost(string, optional, tag = "3")]
    pub error: Option<String>,
}

impl Response {
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn capabilities(capabilities: Vec<String>) -> Self {
        Self {
            capabilities,
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// The shared secret and protocol version a launched process must present
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub protocol_version: u32,
    pub magic_cookie_key: String,
    pub magic_cookie_value: String,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            magic_cookie_key: MAGIC_COOKIE_KEY.to_string(),
            magic_cookie_value: MAGIC_COOKIE_VALUE.to_string(),
        }
    }
}
