/*
[INPUT]:  Partial per-symbol payloads from the stream ingestion path
[OUTPUT]: Latest merged state per symbol
[POS]:    Data layer - last-known symbol snapshots owned by the multiplexer
[UPDATE]: When changing merge rules for nested candle data
*/

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Last known fields of one symbol
pub type SymbolState = Map<String, Value>;

/// Nested candle sub-object, merged key by key
pub const CANDLE_FIELD: &str = "k";
/// Close price; kept when an update omits it
pub const CLOSE_FIELD: &str = "c";

/// Folds partial updates into the latest full state per symbol.
///
/// Fields are never removed. Top-level fields are last-write-wins; the candle
/// field is merged key by key, and its close prefers the update's top-level
/// close, then the update's candle close, then the previous one. Falsy JSON
/// values (`null`, `false`, `0`, `""`) count as absent for the close.
#[derive(Debug, Clone, Default)]
pub struct SymbolStateStore {
    symbols: HashMap<String, SymbolState>,
}

impl SymbolStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, symbol: &str, delta: &Map<String, Value>) {
        let state = self.symbols.entry(symbol.to_string()).or_default();
        let previous_candle = state.get(CANDLE_FIELD).and_then(Value::as_object).cloned();

        for (field, value) in delta {
            if field != CANDLE_FIELD {
                state.insert(field.clone(), value.clone());
            }
        }

        let delta_candle = delta.get(CANDLE_FIELD).and_then(Value::as_object);
        if previous_candle.is_none() && delta_candle.is_none() {
            return;
        }

        let mut candle = previous_candle.unwrap_or_default();
        let previous_close = candle.get(CLOSE_FIELD).filter(|v| is_truthy(v)).cloned();

        if let Some(delta_candle) = delta_candle {
            for (field, value) in delta_candle {
                candle.insert(field.clone(), value.clone());
            }
        }

        let close = delta
            .get(CLOSE_FIELD)
            .filter(|v| is_truthy(v))
            .or_else(|| {
                delta_candle
                    .and_then(|c| c.get(CLOSE_FIELD))
                    .filter(|v| is_truthy(v))
            })
            .cloned()
            .or(previous_close);

        if let Some(close) = close {
            candle.insert(CLOSE_FIELD.to_string(), close);
        }

        state.insert(CANDLE_FIELD.to_string(), Value::Object(candle));
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolState> {
        self.symbols.get(symbol)
    }

    pub fn get_all(&self) -> &HashMap<String, SymbolState> {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
