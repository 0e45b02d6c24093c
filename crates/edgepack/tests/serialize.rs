use std::time::{SystemTime, UNIX_EPOCH};

use edgepack::diagnostics::NullSink;
use edgepack::graph::{EdgeGraph, GraphBuilder, Node, TensorLiteral, TensorSpec};
use edgepack::lower::assemble;
use edgepack::schema::{BackendGraph, ConstantSegment, DType, SCHEMA_VERSION};
use edgepack::serialize::{decode, encode, load, save};

fn f32_spec(dims: &[usize]) -> TensorSpec {
    TensorSpec::new(DType::F32, dims.to_vec())
}

fn literal_backed(graph: &EdgeGraph) -> impl Fn(&Node) -> bool + '_ {
    move |node: &Node| graph.literal(node.id).is_some()
}

fn linear_graph() -> EdgeGraph {
    let mut builder = GraphBuilder::new();
    let x = builder.placeholder("x", f32_spec(&[1, 8]));
    let w = builder.parameter("w", TensorLiteral::from_f32([4, 8], &[0.25; 32]));
    let b = builder.parameter("b", TensorLiteral::from_f32([4], &[1.0; 4]));
    let fc = builder.call("linear", "fc", &[x, w, b], f32_spec(&[1, 4]));
    let act = builder.call("relu", "act", &[fc], f32_spec(&[1, 4]));
    builder.output(&[act]);
    builder.finish()
}

#[test]
fn artifact_round_trips() {
    let graph = linear_graph();
    let is_param = literal_backed(&graph);
    let assembled = assemble(&graph, &is_param, &NullSink).expect("assemble");

    let bytes = encode(&assembled.graph, &assembled.constants).expect("encode");
    let (decoded, constants) = decode(&bytes).expect("decode");
    assert_eq!(decoded, assembled.graph);
    assert_eq!(constants, assembled.constants);
}

#[test]
fn encoding_is_deterministic() {
    let graph = linear_graph();
    let is_param = literal_backed(&graph);
    let assembled = assemble(&graph, &is_param, &NullSink).expect("assemble");

    let first = encode(&assembled.graph, &assembled.constants).expect("encode");
    let second = encode(&assembled.graph, &assembled.constants).expect("encode");
    assert_eq!(first, second);
}

#[test]
fn decode_rejects_bad_magic() {
    let graph = BackendGraph::new(0);
    let mut bytes = encode(&graph, &[]).expect("encode");
    bytes[0] ^= 0xff;
    let err = decode(&bytes).expect_err("must fail");
    assert!(err.to_string().contains("magic"));
}

#[test]
fn decode_rejects_unknown_container_version() {
    let graph = BackendGraph::new(0);
    let mut bytes = encode(&graph, &[]).expect("encode");
    bytes[8] = 0xff;
    let err = decode(&bytes).expect_err("must fail");
    assert!(err.to_string().contains("container version"));
}

#[test]
fn decode_rejects_schema_version_mismatch() {
    let mut graph = BackendGraph::new(0);
    graph.version = "edgeir.v0".to_string();
    let bytes = encode(&graph, &[]).expect("encode");
    let err = decode(&bytes).expect_err("must fail");
    assert!(err.to_string().contains("schema version"));
}

#[test]
fn decode_rejects_truncated_input() {
    let graph = BackendGraph::new(0);
    let bytes = encode(&graph, &[]).expect("encode");
    assert!(decode(&bytes[..10]).is_err());
    assert!(decode(&bytes[..bytes.len() - 1]).is_err());
}

#[test]
fn decode_revalidates_constant_bounds() {
    let mut graph = BackendGraph::new(0);
    graph.constant_table.push(ConstantSegment {
        offset: 0,
        length: 16,
    });
    // Encoding does not validate; the paired decoder must.
    let bytes = encode(&graph, &[]).expect("encode");
    let err = decode(&bytes).expect_err("must fail");
    assert!(err.to_string().contains("exceeds buffer"));
}

#[test]
fn graph_dumps_to_readable_json() {
    let graph = linear_graph();
    let is_param = literal_backed(&graph);
    let assembled = assemble(&graph, &is_param, &NullSink).expect("assemble");

    let dump = assembled.graph.to_json_string().expect("json");
    assert!(dump.contains("\"operators\""));
    assert!(dump.contains(SCHEMA_VERSION));
}

#[test]
fn artifact_survives_a_disk_round_trip() {
    let graph = linear_graph();
    let is_param = literal_backed(&graph);
    let assembled = assemble(&graph, &is_param, &NullSink).expect("assemble");

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = std::env::temp_dir().join(format!("edgepack_artifact_{timestamp}.bin"));
    save(&path, &assembled.graph, &assembled.constants).expect("save");
    let (loaded, constants) = load(&path).expect("load");
    std::fs::remove_file(&path).expect("cleanup");

    assert_eq!(loaded, assembled.graph);
    assert_eq!(constants, assembled.constants);
}
