/*
[INPUT]:  Raw control payloads from subscribers and raw inbound stream frames
[OUTPUT]: Validated ControlMessage / StreamMessage values
[POS]:    WebSocket layer - message parsing and validation
[UPDATE]: When adding new control methods or changing frame format
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::Result;

/// Control methods accepted on the outbound path.
///
/// Remote unsubscription is not supported, so only `SUBSCRIBE` parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ControlMethod {
    #[serde(rename = "SUBSCRIBE")]
    Subscribe,
}

/// Outbound control frame, e.g. `{"method":"SUBSCRIBE","params":["btcusdt@ticker"],"id":1}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ControlMessage {
    pub method: ControlMethod,
    pub params: Vec<String>,
    #[serde(default)]
    pub id: u64,
}

impl ControlMessage {
    pub fn subscribe(params: Vec<String>, id: u64) -> Self {
        Self {
            method: ControlMethod::Subscribe,
            params,
            id,
        }
    }

    pub fn parse(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Inbound frame after boundary validation.
///
/// Combined-stream data frames carry `{"stream": ..., "data": {...}}`;
/// control acknowledgements carry `{"result": ..., "id": ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StreamMessage {
    Data {
        #[serde(default)]
        stream: Option<String>,
        data: Value,
    },
    Ack {
        id: u64,
        #[serde(default)]
        result: Value,
    },
}

impl StreamMessage {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Business payload of a data frame
    pub fn payload(&self) -> Option<&Value> {
        match self {
            StreamMessage::Data { data, .. } => Some(data),
            StreamMessage::Ack { .. } => None,
        }
    }

    pub fn stream(&self) -> Option<&str> {
        match self {
            StreamMessage::Data { stream, .. } => stream.as_deref(),
            StreamMessage::Ack { .. } => None,
        }
    }

    /// Event type (`e`) of a data payload
    pub fn event_type(&self) -> Option<&str> {
        self.payload()?.get("e")?.as_str()
    }

    /// Symbol (`s`) of a data payload
    pub fn symbol(&self) -> Option<&str> {
        self.payload()?.get("s")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_message_parses_subscribe() {
        let message =
            ControlMessage::parse(r#"{"method":"SUBSCRIBE","params":["btcusdt@ticker"],"id":7}"#)
                .expect("valid control message");
        assert_eq!(message, ControlMessage::subscribe(vec!["btcusdt@ticker".into()], 7));
    }

    #[test]
    fn control_message_rejects_unknown_method_and_missing_params() {
        assert!(ControlMessage::parse(r#"{"method":"UNSUBSCRIBE","params":["a"],"id":1}"#).is_err());
        assert!(ControlMessage::parse(r#"{"method":"SUBSCRIBE","id":1}"#).is_err());
        assert!(ControlMessage::parse("not json").is_err());
    }

    #[test]
    fn control_message_text_is_wire_format() {
        let text = ControlMessage::subscribe(vec!["ethusdt@kline_1m".into()], 3)
            .to_text()
            .expect("serialize");
        assert_eq!(text, r#"{"method":"SUBSCRIBE","params":["ethusdt@kline_1m"],"id":3}"#);
    }

    #[test]
    fn stream_message_distinguishes_data_and_ack() {
        let data = StreamMessage::parse(
            r#"{"stream":"btcusdt@ticker","data":{"e":"24hrTicker","s":"BTCUSDT","c":"100.5"}}"#,
        )
        .expect("data frame");
        assert_eq!(data.stream(), Some("btcusdt@ticker"));
        assert_eq!(data.event_type(), Some("24hrTicker"));
        assert_eq!(data.symbol(), Some("BTCUSDT"));

        let ack = StreamMessage::parse(r#"{"result":null,"id":4}"#).expect("ack frame");
        assert_eq!(
            ack,
            StreamMessage::Ack {
                id: 4,
                result: Value::Null
            }
        );
        assert!(ack.payload().is_none());
        assert!(ack.symbol().is_none());
    }

    #[test]
    fn stream_message_rejects_unknown_shapes() {
        assert!(StreamMessage::parse(r#"{"hello":"world"}"#).is_err());
        assert!(StreamMessage::parse("[1,2,3]").is_err());
    }
}
