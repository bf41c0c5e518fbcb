use bytes::Bytes;
use serde_json::{json, Map, Value};

/// Arm/disarm value carried in the `isArmed` key (0 = disarmed, 1 = armed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArmIntent {
    #[default]
    Disarmed,
    Armed,
}

impl ArmIntent {
    pub fn wire_value(self) -> u8 {
        match self {
            ArmIntent::Disarmed => 0,
            ArmIntent::Armed => 1,
        }
    }

    pub fn from_wire(v: u64) -> Option<Self> {
        match v {
            0 => Some(ArmIntent::Disarmed),
            1 => Some(ArmIntent::Armed),
            _ => None,
        }
    }
}

/// One heartbeat frame as seen by the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// `{"isArmed": 0|1}`
    Intent(ArmIntent),
    /// `{"ping": true}`
    Ping,
    /// A valid map without any recognized key. Still counts as liveness.
    Keepalive,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,
    #[error("payload is not a JSON object: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("isArmed must be 0 or 1, got {0}")]
    InvalidIntent(Value),
}

/// Recognized payload keys. Everything else is ignored.
#[derive(Debug, Clone, Copy)]
enum Key {
    IsArmed,
    Ping,
}

impl Key {
    fn as_str(self) -> &'static str {
        match self {
            Key::IsArmed => "isArmed",
            Key::Ping => "ping",
        }
    }

    fn lookup(self, map: &Map<String, Value>) -> Option<&Value> {
        map.get(self.as_str())
    }
}

pub fn encode(msg: &Message) -> Bytes {
    let (key, value) = match msg {
        Message::Intent(i) => (Key::IsArmed, json!(i.wire_value())),
        Message::Ping | Message::Keepalive => (Key::Ping, Value::Bool(true)),
    };
    let mut map = Map::new();
    map.insert(key.as_str().to_string(), value);
    Bytes::from(Value::Object(map).to_string())
}

pub fn decode(payload: &[u8]) -> Result<Message, DecodeError> {
    // C-string senders append a terminating NUL
    let end = payload.iter().rposition(|b| *b != 0).map(|i| i + 1).unwrap_or(0);
    let payload = &payload[..end];
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }

    let map: Map<String, Value> = serde_json::from_slice(payload)?;

    if let Some(v) = Key::IsArmed.lookup(&map) {
        return v
            .as_u64()
            .and_then(ArmIntent::from_wire)
            .map(Message::Intent)
            .ok_or_else(|| DecodeError::InvalidIntent(v.clone()));
    }
    if Key::Ping.lookup(&map).is_some() {
        return Ok(Message::Ping);
    }
    Ok(Message::Keepalive)
}
