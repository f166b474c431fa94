//! GLB file assembly.

use serde_json::Value;

const CHUNK_JSON: u32 = 0x4E4F534A;
const CHUNK_BIN: u32 = 0x004E4942;

/// Assemble a GLB image from a document and its binary buffer
pub fn assemble_glb(root: &Value, buffer_data: &[u8]) -> Vec<u8> {
    let json_string = serde_json::to_string(root).expect("Failed to serialize JSON");
    let json_bytes = json_string.as_bytes();

    // Both chunks are padded to 4-byte alignment
    let json_padding = (4 - (json_bytes.len() % 4)) % 4;
    let json_chunk_length = json_bytes.len() + json_padding;
    let buffer_padding = (4 - (buffer_data.len() % 4)) % 4;
    let buffer_chunk_length = buffer_data.len() + buffer_padding;

    let has_bin = !buffer_data.is_empty();
    let total_length = 12 + 8 + json_chunk_length + if has_bin { 8 + buffer_chunk_length } else { 0 };

    let mut glb = Vec::with_capacity(total_length);

    // Header
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total_length as u32).to_le_bytes());

    // JSON chunk, padded with spaces
    glb.extend_from_slice(&(json_chunk_length as u32).to_le_bytes());
    glb.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    glb.extend_from_slice(json_bytes);
    glb.extend(std::iter::repeat_n(0x20u8, json_padding));

    // BIN chunk, padded with zeros
    if has_bin {
        glb.extend_from_slice(&(buffer_chunk_length as u32).to_le_bytes());
        glb.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        glb.extend_from_slice(buffer_data);
        glb.extend(std::iter::repeat_n(0u8, buffer_padding));
    }

    glb
}
