//! Wire codec for the Yeelight command protocol.
//!
//! Every command is a single JSON object terminated by `\r\n`:
//!
//! ```text
//! {"id":1,"method":"set_hsv","params":[200,80,"sudden",0]}\r\n
//! ```
//!
//! Devices answer with either a result correlated by `id`, or an unsolicited
//! `props` notification carrying changed properties.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::errors::Error;
use crate::types::{HueSaturation, Kelvin, PowerMode};

type Result<T> = std::result::Result<T, Error>;

/// Transition effect sent with every state-changing command.
const EFFECT: &str = "sudden";

/// Command methods understood by the device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Method {
    GetProp,
    Toggle,
    SetHsv,
    SetCtAbx,
    SetPower,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// The properties that make up a complete device state, in `get_prop` order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Property {
    Power,
    ColorMode,
    Ct,
    Hue,
    Sat,
}

impl Property {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// A command sent to a device.
///
/// Each packet gets a random 32-bit id; the device echoes it back in the
/// matching [`ResultPacket`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingPacket {
    id: i32,
    method: Method,
    params: Vec<Value>,
}

impl OutgoingPacket {
    pub fn new(method: Method, params: Vec<Value>) -> Self {
        OutgoingPacket {
            id: random_id(),
            method,
            params,
        }
    }

    /// Request the five canonical properties.
    pub fn get_prop() -> Self {
        let params = Property::iter().map(|p| json!(p.as_str())).collect();
        Self::new(Method::GetProp, params)
    }

    pub fn toggle() -> Self {
        Self::new(Method::Toggle, Vec::new())
    }

    pub fn set_hsv(color: HueSaturation) -> Self {
        Self::new(
            Method::SetHsv,
            vec![json!(color.hue()), json!(color.saturation()), json!(EFFECT), json!(0)],
        )
    }

    pub fn set_ct_abx(temperature: Kelvin) -> Self {
        Self::new(
            Method::SetCtAbx,
            vec![json!(temperature.kelvin()), json!(EFFECT), json!(0)],
        )
    }

    pub fn set_power(power: PowerMode) -> Self {
        Self::new(
            Method::SetPower,
            vec![json!(power.as_str()), json!(EFFECT), json!(0)],
        )
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Serialize to one CRLF-terminated frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut frame = serde_json::to_vec(self).map_err(Error::JsonDump)?;
        frame.extend_from_slice(b"\r\n");
        Ok(frame)
    }

    pub(crate) fn to_value(&self) -> Value {
        json!({"id": self.id, "method": self.method, "params": self.params})
    }
}

fn random_id() -> i32 {
    // The first four bytes of a v4 uuid carry no version or variant bits.
    let bytes = Uuid::new_v4().into_bytes();
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// A device response to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPacket {
    pub id: i32,
    pub result: Vec<String>,
}

impl ResultPacket {
    /// A result succeeds when its first field is `"ok"`.
    pub fn is_success(&self) -> bool {
        self.result.first().is_some_and(|r| r == "ok")
    }

    pub fn matches(&self, outgoing: &OutgoingPacket) -> bool {
        self.id == outgoing.id
    }
}

/// An unsolicited property update pushed by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropsPacket {
    pub params: HashMap<String, String>,
}

/// A decoded frame received from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingPacket {
    Result(ResultPacket),
    Props(PropsPacket),
    Unknown,
}

impl IncomingPacket {
    /// Decode one frame (without its terminator).
    ///
    /// An `id` field selects [`IncomingPacket::Result`], a `params` field selects
    /// [`IncomingPacket::Props`]; any other object is [`IncomingPacket::Unknown`].
    pub fn parse(frame: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(frame).map_err(Error::JsonLoad)?;
        let Value::Object(object) = value else {
            return Err(Error::InvalidFrame(format!("not a json object: {frame}")));
        };

        if let Some(id) = object.get("id") {
            let id = id
                .as_i64()
                .and_then(|id| i32::try_from(id).ok())
                .ok_or_else(|| Error::InvalidFrame(format!("invalid id: {id}")))?;
            // Error replies carry an "error" object instead of a result array.
            let result = object
                .get("result")
                .and_then(Value::as_array)
                .map(|fields| fields.iter().map(field_to_string).collect())
                .unwrap_or_default();
            return Ok(IncomingPacket::Result(ResultPacket { id, result }));
        }

        if let Some(params) = object.get("params") {
            let params = params
                .as_object()
                .ok_or_else(|| Error::InvalidFrame(format!("invalid params: {params}")))?
                .iter()
                .map(|(key, value)| (key.clone(), field_to_string(value)))
                .collect();
            return Ok(IncomingPacket::Props(PropsPacket { params }));
        }

        Ok(IncomingPacket::Unknown)
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            IncomingPacket::Result(r) => json!({"id": r.id, "result": r.result}),
            IncomingPacket::Props(p) => json!({"method": "props", "params": p.params}),
            IncomingPacket::Unknown => Value::Null,
        }
    }
}

fn field_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Splits a byte stream into CRLF-delimited frames and decodes them.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Frames longer than this are discarded.
    pub const MAX_FRAME_LEN: usize = 16 * 1024;

    pub fn new() -> Self {
        Self::default()
    }

    /// Feed received bytes, returning every frame they complete.
    ///
    /// A frame that fails to decode yields an `Err` in its slot without
    /// affecting the frames around it.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<Result<IncomingPacket>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = match String::from_utf8(line) {
                Ok(line) => line,
                Err(e) => {
                    frames.push(Err(Error::Utf8Decode(e)));
                    continue;
                }
            };
            let line = line.trim();
            if !line.is_empty() {
                frames.push(IncomingPacket::parse(line));
            }
        }

        if self.buffer.len() > Self::MAX_FRAME_LEN {
            let len = self.buffer.len();
            self.buffer.clear();
            frames.push(Err(Error::InvalidFrame(format!(
                "unterminated frame of {len} bytes"
            ))));
        }

        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_set_hsv_frame() {
        let packet = OutgoingPacket::set_hsv(HueSaturation::create(200, 80).unwrap());
        let frame = String::from_utf8(packet.encode().unwrap()).unwrap();
        assert_eq!(
            frame,
            format!(
                "{{\"id\":{},\"method\":\"set_hsv\",\"params\":[200,80,\"sudden\",0]}}\r\n",
                packet.id()
            )
        );
    }

    #[test]
    fn test_get_prop_params_order() {
        let packet = OutgoingPacket::get_prop();
        assert_eq!(packet.method(), Method::GetProp);
        assert_eq!(
            packet.params(),
            &[
                json!("power"),
                json!("color_mode"),
                json!("ct"),
                json!("hue"),
                json!("sat")
            ]
        );
    }

    #[test]
    fn test_toggle_has_no_params() {
        let frame = OutgoingPacket::toggle().encode().unwrap();
        let value: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["method"], "toggle");
        assert_eq!(value["params"], json!([]));
    }

    #[test]
    fn test_set_power_and_temperature_params() {
        let power = OutgoingPacket::set_power(PowerMode::Off);
        assert_eq!(power.params(), &[json!("off"), json!("sudden"), json!(0)]);

        let ct = OutgoingPacket::set_ct_abx(Kelvin::create(2700).unwrap());
        assert_eq!(ct.method().as_str(), "set_ct_abx");
        assert_eq!(ct.params(), &[json!(2700), json!("sudden"), json!(0)]);
    }

    #[test]
    fn test_echoed_result_matches_its_command() {
        let packet = OutgoingPacket::set_hsv(HueSaturation::create(200, 80).unwrap());
        let other = OutgoingPacket::toggle();
        let echo = format!("{{\"id\":{},\"result\":[\"ok\"]}}", packet.id());

        let IncomingPacket::Result(result) = IncomingPacket::parse(&echo).unwrap() else {
            panic!("expected a result packet");
        };
        assert!(result.is_success());
        assert!(result.matches(&packet));
        assert_eq!(result.matches(&other), packet.id() == other.id());
    }

    #[test]
    fn test_parse_props() {
        let packet =
            IncomingPacket::parse(r#"{"method":"props","params":{"power":"on","bright":10}}"#)
                .unwrap();
        let IncomingPacket::Props(props) = packet else {
            panic!("expected a props packet");
        };
        assert_eq!(props.params["power"], "on");
        assert_eq!(props.params["bright"], "10");
    }

    #[test]
    fn test_parse_error_reply_is_unsuccessful_result() {
        let packet =
            IncomingPacket::parse(r#"{"id":7,"error":{"code":-1,"message":"unsupported"}}"#)
                .unwrap();
        assert_eq!(
            packet,
            IncomingPacket::Result(ResultPacket {
                id: 7,
                result: vec![]
            })
        );
    }

    #[test]
    fn test_parse_unknown_and_malformed() {
        assert_eq!(
            IncomingPacket::parse(r#"{"hello":"world"}"#).unwrap(),
            IncomingPacket::Unknown
        );
        assert!(matches!(
            IncomingPacket::parse("{not json"),
            Err(Error::JsonLoad(_))
        ));
        assert!(matches!(
            IncomingPacket::parse("[1,2]"),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_decoder_reassembles_split_frames() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode(br#"{"id":1,"res"#).is_empty());
        let frames = decoder.decode(b"ult\":[\"ok\"]}\r\n{\"id\":2,\"result\":[\"ok\"]}\r\n");
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.is_ok()));
    }

    #[test]
    fn test_decoder_skips_bad_frame_only() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.decode(b"garbage\r\n\r\n{\"id\":3,\"result\":[\"ok\"]}\r\n");
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_err());
        assert!(frames[1].is_ok());
    }

    #[test]
    fn test_decoder_drops_oversized_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.decode(&vec![b'x'; FrameDecoder::MAX_FRAME_LEN + 1]);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_err());
        assert!(decoder.decode(b"{\"params\":{}}\r\n")[0].is_ok());
    }
}
