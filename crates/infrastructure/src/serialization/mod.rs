//! Serialization for files written and read by Tether.
//!
//! JSON output is deterministic (sorted keys via `BTreeMap`, 2-space
//! indentation, trailing newline) so stored files diff cleanly. Handshake
//! definitions may also be written in YAML.

mod definition;
mod json;

pub use definition::{DefinitionFormat, from_definition};
pub use json::{SerializationError, from_json, from_json_bytes, to_json_stable, to_json_stable_bytes};
