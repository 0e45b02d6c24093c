//! Binary artifact container: encode and decode the assembled graph plus
//! its constant buffer.
//!
//! Layout: 8-byte magic, `u32` container version, `u32` header length, the
//! bincode-encoded [`BackendGraph`] header, then the raw constant payload.
//! Constant-table offsets are relative to the payload start. Encoding is
//! deterministic for identical input; the schema and this container are
//! versioned together.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, bail, ensure, Result};

use crate::schema::{BackendGraph, SCHEMA_VERSION};

const MAGIC: &[u8; 8] = b"EDGEPACK";
const CONTAINER_V1: u32 = 1;

/// Fixed byte count before the bincode header.
const PREFIX_LEN: usize = 8 + 4 + 4;

/// Serializes the graph and constant buffer into one artifact.
pub fn encode(graph: &BackendGraph, constants: &[u8]) -> Result<Vec<u8>> {
    let header = bincode::serialize(graph)?;
    ensure!(
        header.len() <= u32::MAX as usize,
        "artifact header too large"
    );

    let mut out = Vec::with_capacity(PREFIX_LEN + header.len() + constants.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&CONTAINER_V1.to_le_bytes());
    out.extend_from_slice(&(header.len() as u32).to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(constants);
    Ok(out)
}

/// Reverses [`encode`], returning the graph and its constant payload.
///
/// The decoded graph is re-validated against the payload so a corrupted or
/// hand-edited artifact is rejected here instead of inside the runtime.
pub fn decode(bytes: &[u8]) -> Result<(BackendGraph, Vec<u8>)> {
    ensure!(bytes.len() >= PREFIX_LEN, "artifact truncated before header");
    if &bytes[..8] != MAGIC {
        bail!("invalid artifact magic header");
    }

    let version = u32::from_le_bytes(bytes[8..12].try_into().expect("fixed slice"));
    if version != CONTAINER_V1 {
        bail!("unsupported artifact container version {version}");
    }

    let header_len = u32::from_le_bytes(bytes[12..16].try_into().expect("fixed slice")) as usize;
    let header_end = PREFIX_LEN
        .checked_add(header_len)
        .ok_or_else(|| anyhow!("artifact header length overflows"))?;
    ensure!(
        bytes.len() >= header_end,
        "artifact truncated inside header: expected {header_len} bytes"
    );

    let graph: BackendGraph = bincode::deserialize(&bytes[PREFIX_LEN..header_end])?;
    if graph.version != SCHEMA_VERSION {
        bail!(
            "artifact schema version '{}' does not match expected '{}'",
            graph.version,
            SCHEMA_VERSION
        );
    }

    let constants = bytes[header_end..].to_vec();
    graph.validate(constants.len() as u64)?;
    Ok((graph, constants))
}

/// Writes an encoded artifact to disk.
pub fn save<P: AsRef<Path>>(path: P, graph: &BackendGraph, constants: &[u8]) -> Result<()> {
    let bytes = encode(graph, constants)?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Reads an artifact from disk and decodes it.
pub fn load<P: AsRef<Path>>(path: P) -> Result<(BackendGraph, Vec<u8>)> {
    let bytes = std::fs::read(path)?;
    decode(&bytes)
}
