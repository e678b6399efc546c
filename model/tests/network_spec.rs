use model::{LayerEntry, LayerId, ModelErr, NetworkSpec, Result, Shape, shape};

const INCEPTION_BLOCK: &str = r#"{
    "layers": [
        { "path": "stem", "type": "conv", "in_channels": 3, "out_channels": 16,
          "kernel_size": [3, 3], "padding": 1 },
        { "path": "branch1", "type": "conv", "in_channels": 16, "out_channels": 8,
          "kernel_size": [1, 1] },
        { "path": "branch3", "type": "conv", "in_channels": 16, "out_channels": 8,
          "kernel_size": [3, 3], "padding": 1 },
        { "path": "bn", "type": "norm", "kind": "batch", "dims": 2, "num_channels": 16 },
        { "path": "act", "type": "activation", "function": "relu" },
        { "path": "pool", "type": "pool", "kind": "max", "dims": 2, "size": 2 },
        { "path": "flatten", "type": "flatten" },
        { "path": "head", "type": "linear", "in_features": 1024, "out_features": 10 }
    ],
    "root": { "seq": [
        { "call": "stem" },
        { "residual": {
            "body": { "seq": [
                { "parallel": {
                    "branches": [{ "call": "branch1" }, { "call": "branch3" }],
                    "merge": { "concat": { "axis": 1 } }
                } },
                { "call": "bn" }
            ] }
        } },
        { "call": "act" },
        { "call": "pool" },
        { "call": "flatten" },
        { "call": "head" }
    ] }
}"#;

fn trace_paths(json: &str, input: &[usize]) -> Result<(Shape, Vec<String>)> {
    let net = NetworkSpec::from_json_str(json)?.build()?;
    let mut paths = Vec::new();
    let mut hook = |_: LayerId, entry: &LayerEntry, _: &Shape, _: &Shape| -> Result<()> {
        paths.push(entry.path().to_string());
        Ok(())
    };
    let out = net.trace(&shape(input), &mut hook)?;
    Ok((out, paths))
}

#[test]
fn traces_branches_in_order() {
    let (out, paths) = trace_paths(INCEPTION_BLOCK, &[2, 3, 16, 16]).unwrap();
    assert_eq!(out, shape(&[2, 10]));
    assert_eq!(
        paths,
        ["stem", "branch1", "branch3", "bn", "act", "pool", "flatten", "head"]
    );
}

#[test]
fn wrong_input_channels_name_the_layer() {
    let err = trace_paths(INCEPTION_BLOCK, &[1, 4, 16, 16]).unwrap_err();
    match err {
        ModelErr::ShapeMismatch { layer, got, expected, .. } => {
            assert_eq!(layer, "stem (Conv2d)");
            assert_eq!((got, expected), (4, 3));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn residual_shapes_must_agree() {
    let json = r#"{
        "layers": [
            { "path": "fc", "type": "linear", "in_features": 4, "out_features": 3 }
        ],
        "root": { "residual": { "body": { "call": "fc" } } }
    }"#;
    let err = trace_paths(json, &[1, 4]).unwrap_err();
    assert!(matches!(err, ModelErr::MergeMismatch { .. }));
}

#[test]
fn duplicate_paths_are_rejected() {
    let json = r#"{
        "layers": [
            { "path": "a", "type": "identity" },
            { "path": "a", "type": "dropout", "p": 0.1 }
        ],
        "root": { "call": "a" }
    }"#;
    let err = NetworkSpec::from_json_str(json).unwrap().build().unwrap_err();
    assert!(matches!(err, ModelErr::DuplicateLayer(path) if path == "a"));
}

#[test]
fn malformed_json_is_a_json_error() {
    let err = NetworkSpec::from_json_str("{ \"layers\": [").unwrap_err();
    assert!(matches!(err, ModelErr::Json(_)));
    assert_eq!(err.to_string(), "invalid JSON");
    assert!(std::error::Error::source(&err).is_some());
}
