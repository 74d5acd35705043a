use serde::Serialize;
use serde_json as json;

/// One strategy-level decision or exchange.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub inputs: json::Value,
    pub outputs: json::Value,
}

/// Append-only buffer of strategy decisions, unbounded for the scope of one
/// run. Lightweight stand-in for a conversation memory an adaptive strategy
/// would feed back into its model.
#[derive(Debug, Default)]
pub struct Memory {
    exchanges: Vec<Exchange>,
}

impl Memory {
    pub fn new() -> Self {
        Memory::default()
    }

    pub fn save_context(&mut self, inputs: json::Value, outputs: json::Value) {
        self.exchanges.push(Exchange { inputs, outputs });
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}
