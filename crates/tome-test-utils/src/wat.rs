// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WAT fixtures for plugin modules.

use serde_json::json;

/// Offset where `invoke` copies its input before echoing it back.
const INPUT_OFFSET: u32 = 4096;

/// A plugin module whose `entry_point` writes `shape_json` and whose
/// `invoke` export echoes its input as the result.
pub fn source_module_wat(entry_point: &str, shape_json: &str) -> String {
    let escaped: String = shape_json
        .bytes()
        .map(|b| format!("\\{b:02x}"))
        .collect();
    format!(
        r#"(module
  (import "tome" "log" (func $log (param i32 i32 i32)))
  (import "tome" "get_input_len" (func $get_input_len (result i32)))
  (import "tome" "get_input" (func $get_input (param i32)))
  (import "tome" "set_output" (func $set_output (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "{escaped}")
  (func (export "{entry_point}")
    (call $log (i32.const 2) (i32.const 0) (i32.const 0))
    (call $set_output (i32.const 0) (i32.const {len})))
  (func (export "invoke")
    (local $n i32)
    (local.set $n (call $get_input_len))
    (call $get_input (i32.const {INPUT_OFFSET}))
    (call $set_output (i32.const {INPUT_OFFSET}) (local.get $n))))"#,
        len = shape_json.len(),
    )
}

pub fn single_shape(id: i64, name: &str, lang: &str) -> String {
    json!({
        "kind": "single",
        "source": {"id": id, "name": name, "lang": lang, "nsfw": false},
    })
    .to_string()
}

pub fn group_shape(sources: &[(i64, &str, &str)]) -> String {
    let sources: Vec<_> = sources
        .iter()
        .map(|(id, name, lang)| json!({"id": id, "name": name, "lang": lang, "nsfw": false}))
        .collect();
    json!({"kind": "group", "sources": sources}).to_string()
}
