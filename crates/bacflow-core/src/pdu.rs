use crate::address::Address;
use std::collections::BTreeMap;

/// Bytes moving between layers plus the addressing every layer agrees on.
///
/// Each layer strips its own header from `data` on the way up and prepends
/// it on the way down; `source` and `destination` are rewritten to the
/// addressing scope of the layer that holds the PDU.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pdu {
    pub source: Address,
    pub destination: Address,
    pub expecting_reply: bool,
    /// Network priority, 0 (normal) through 3 (life safety).
    pub network_priority: u8,
    /// Free-form annotations that travel with the PDU inside one stack.
    pub user_data: BTreeMap<String, String>,
    pub data: Vec<u8>,
}

impl Pdu {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: Address) -> Self {
        self.source = source;
        self
    }

    pub fn with_destination(mut self, destination: Address) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_expecting_reply(mut self, expecting_reply: bool) -> Self {
        self.expecting_reply = expecting_reply;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.network_priority = priority & 0x03;
        self
    }

    pub fn with_user_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_data.insert(key.into(), value.into());
        self
    }

    /// A reply travelling back to where this PDU came from.
    pub fn reply(&self, data: Vec<u8>) -> Self {
        Self {
            source: Address::Null,
            destination: self.source.clone(),
            expecting_reply: false,
            network_priority: self.network_priority,
            user_data: self.user_data.clone(),
            data,
        }
    }

    /// The same addressing and annotations carrying a different payload.
    pub fn forward(&self, data: Vec<u8>) -> Self {
        Self {
            data,
            ..self.clone_header()
        }
    }

    fn clone_header(&self) -> Self {
        Self {
            source: self.source.clone(),
            destination: self.destination.clone(),
            expecting_reply: self.expecting_reply,
            network_priority: self.network_priority,
            user_data: self.user_data.clone(),
            data: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Pdu;
    use crate::address::Address;

    #[test]
    fn reply_swaps_direction_and_keeps_priority() {
        let pdu = Pdu::new(vec![1, 2])
            .with_source(Address::LocalStation(vec![9]))
            .with_destination(Address::LocalBroadcast)
            .with_expecting_reply(true)
            .with_priority(2)
            .with_user_data("trace", "abc");

        let reply = pdu.reply(vec![3]);
        assert_eq!(reply.destination, Address::LocalStation(vec![9]));
        assert_eq!(reply.source, Address::Null);
        assert!(!reply.expecting_reply);
        assert_eq!(reply.network_priority, 2);
        assert_eq!(reply.user_data.get("trace").map(String::as_str), Some("abc"));

        let fwd = pdu.forward(vec![4]);
        assert_eq!(fwd.destination, Address::LocalBroadcast);
        assert_eq!(fwd.data, vec![4]);
    }
}
