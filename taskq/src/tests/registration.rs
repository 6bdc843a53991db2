use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::codec::{JsonObject, Record};
use crate::extract::{CurrentTaskId, Input, State};
use crate::WorkerApp;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct Doubled {
    value: i64,
}

async fn bytes_handler(Input(bytes): Input<Vec<u8>>) -> Vec<u8> {
    bytes
}

async fn string_handler(Input(s): Input<String>) -> String {
    s.to_uppercase()
}

async fn json_object_handler(Input(obj): Input<JsonObject>) -> JsonObject {
    obj
}

async fn record_handler(Input(Record(input)): Input<Record<Doubled>>) -> Record<Doubled> {
    Record(Doubled {
        value: input.value * 2,
    })
}

async fn stateful_handler(Input(s): Input<String>, state: State<Mutex<u32>>) -> String {
    *state.lock().unwrap() += 1;
    s
}

async fn task_id_handler(_id: CurrentTaskId, Input(s): Input<String>) -> String {
    s
}

/// Verifies that handlers of every codec shape and several extractor arities compile
/// and can be registered on a [`WorkerApp`].
#[test]
fn handlers_of_every_shape_register() {
    let _app = WorkerApp::new(Mutex::new(0u32))
        .task("bytes", bytes_handler)
        .task("string", string_handler)
        .task("json_object", json_object_handler)
        .task("record", record_handler)
        .task("stateful", stateful_handler)
        .task("task_id", task_id_handler);
}

/// A later registration for the same task kind silently replaces the earlier one.
#[test]
fn later_registration_replaces_earlier() {
    let app = WorkerApp::new(()).task("kind", bytes_handler_unit).task("kind", bytes_handler_unit_2);

    assert_eq!(app.handlers.len(), 1);
}

async fn bytes_handler_unit(Input(bytes): Input<Vec<u8>>) -> Vec<u8> {
    bytes
}

async fn bytes_handler_unit_2(Input(_bytes): Input<Vec<u8>>) -> Vec<u8> {
    vec![]
}
