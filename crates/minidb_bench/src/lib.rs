//! Shared data generators for the MiniDB benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use minidb_codec::Value;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generates random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generates a random alphanumeric string.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generates `count` distinct keys.
pub fn generate_keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("key:{i:08}")).collect()
}

/// Builds a chat message document whose text is `text_len` characters.
pub fn chat_message(id: u64, text_len: usize) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "user": random_text(8),
        "text": random_text(text_len),
        "ts": 1_700_000_000 + id,
    })
}

/// Builds a nested map `depth` levels deep with `width` entries per level.
pub fn nested_value(depth: usize, width: usize) -> Value {
    if depth == 0 {
        Value::Text("leaf".into())
    } else {
        Value::object((0..width).map(|i| (format!("key_{i}"), nested_value(depth - 1, width))))
    }
}
