use std::collections::{HashMap, HashSet};

use flops_counter::{
    ComplexityInfo, ComplexityReport, FlopsErr, GroupRules, Options, StageRule,
    get_model_complexity_info,
};
use model::{
    Layer, Network, NetworkBuilder, Node,
    layers::{Custom, Linear},
    zoo,
};

fn quiet<'a>() -> Options<'a> {
    Options {
        print_per_layer_stat: false,
        as_strings: false,
        ..Default::default()
    }
}

fn raw(network: &Network, input_res: &[usize], options: Options<'_>) -> ComplexityReport {
    match get_model_complexity_info(network, input_res, options).unwrap() {
        ComplexityInfo::Raw(report) => report,
        ComplexityInfo::Formatted(_) => panic!("expected raw counts"),
    }
}

#[test]
fn resnet18_totals_and_groups() {
    let net = zoo::resnet18(1000).unwrap();
    let report = raw(&net, &[3, 224, 224], quiet());

    assert_eq!(report.total.forward, 1_822_177_768);
    assert_eq!(report.total.backward, 3_641_219_536);
    assert_eq!(report.total.params, 11_689_512);
    assert_eq!(report.total.fc_params, 513_000);
    assert_eq!(report.total.buffers, 9_620);

    assert_eq!(report.initial.forward, 121_225_216);
    assert_eq!(report.initial.backward, 240_844_800);
    assert_eq!(report.initial.params, 9_536);

    let names: Vec<_> = report.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["group1", "group2", "group3", "group4"]);
    let forwards: Vec<_> = report.stages.iter().map(|s| s.counts.forward).collect();
    assert_eq!(forwards, [464_830_464, 412_446_720, 411_744_256, 411_393_024]);
    assert_eq!(report.stages[0].counts.backward, 928_858_112);

    assert_eq!(report.fc.forward, 513_000);
    assert_eq!(report.fc.backward, 1_026_000);
    assert_eq!(report.fc.params, 513_000);
}

#[test]
fn strings_project_the_raw_counts() {
    let net = zoo::resnet18(1000).unwrap();
    let report = raw(&net, &[3, 224, 224], quiet());

    let options = Options {
        print_per_layer_stat: false,
        ..Default::default()
    };
    let ComplexityInfo::Formatted(strings) =
        get_model_complexity_info(&net, &[3, 224, 224], options).unwrap()
    else {
        panic!("expected formatted counts");
    };

    assert_eq!(strings, report.to_strings(Default::default()));
    assert_eq!(strings.total.forward, "1.82 GMac");
    assert_eq!(strings.total.backward, "3.64 GMac");
    assert_eq!(strings.total.params, "11.69 M");
    assert_eq!(strings.total.fc_params, "513.0 k");
    assert_eq!(strings.total.buffers, "9.62 k");
    assert_eq!(strings.initial.forward, "121.23 MMac");
    assert_eq!(strings.stages[3].counts.params, "8.39 M");
}

#[test]
fn wrong_backend_is_rejected() {
    let net = zoo::mlp(&[4, 2]).unwrap();
    for backend in ["aten", "Pytorch", "jax"] {
        let options = Options {
            backend: backend.to_string(),
            ..quiet()
        };
        let err = get_model_complexity_info(&net, &[4], options).unwrap_err();
        assert!(matches!(err, FlopsErr::InvalidBackend(_)));
        assert_eq!(err.to_string(), format!("wrong backend name: {backend}"));
    }
}

#[test]
fn empty_input_res_is_rejected() {
    let net = zoo::mlp(&[4, 2]).unwrap();
    let err = get_model_complexity_info(&net, &[], quiet()).unwrap_err();
    assert!(matches!(err, FlopsErr::InvalidInput(_)));
}

#[test]
fn ignored_types_keep_their_params() {
    let net = zoo::resnet18(1000).unwrap();
    let options = Options {
        ignore_modules: HashSet::from(["Conv2d".to_string()]),
        ..quiet()
    };
    let report = raw(&net, &[3, 224, 224], options);

    assert_eq!(report.total.params, 11_689_512);
    assert_eq!(report.fc.forward, 513_000);
    // the stem keeps bn1, relu and maxpool
    assert_eq!(report.initial.forward, 112 * 112 * 64 * 4);
}

#[test]
fn custom_hooks_count_custom_layers() {
    let mut b = NetworkBuilder::new();
    let fc = b.add("fc", Layer::Linear(Linear::new(16, 16, false)));
    let swish = b.add("act", Layer::Custom(Custom::new("Swish", 0)));
    let net = b.build(Node::chain([fc, swish])).unwrap();

    let without = raw(&net, &[16], quiet());
    assert_eq!(without.total.forward, 256);

    let options = Options {
        custom_modules_hooks: HashMap::from([(
            "Swish".to_string(),
            Box::new(|_: &Layer, _: &model::Shape, y: &model::Shape| 4 * y[1] as u64)
                as flops_counter::CustomHook,
        )]),
        ..quiet()
    };
    let with = raw(&net, &[16], options);
    assert_eq!(with.total.forward, 256 + 64);
}

#[test]
fn reused_layers_count_once_per_call() {
    let mut b = NetworkBuilder::new();
    let fc = b.add("fc", Layer::Linear(Linear::new(8, 8, true)));
    let net = b.build(Node::repeat(4, Node::Call(fc))).unwrap();

    let report = raw(&net, &[8], quiet());
    assert_eq!(report.total.forward, 4 * (64 + 8));
    assert_eq!(report.total.params, 72);
    assert_eq!(report.fc.params, 72);
}

#[test]
fn custom_groups_split_an_mlp() {
    let net = zoo::mlp(&[10, 20, 20, 5]).unwrap();
    let rules = GroupRules {
        initial: vec!["layers.0".into()],
        stages: vec![StageRule::new("hidden", &["layers.1", "layers.2", "layers.3"])],
        fc: vec!["layers.4".into()],
    };
    let report = raw(
        &net,
        &[10],
        Options {
            group_rules: rules,
            ..quiet()
        },
    );

    assert_eq!(report.initial.forward, 200 + 20);
    assert_eq!(report.stages[0].counts.forward, 20 + 400 + 20 + 20);
    assert_eq!(report.fc.forward, 100 + 5);
    assert_eq!(
        report.initial.forward + report.stages[0].counts.forward + report.fc.forward,
        report.total.forward
    );
    assert_eq!(report.total.fc_params, 105);
}

#[test]
fn per_layer_table_goes_to_the_given_stream() {
    let net = zoo::mlp(&[4, 3]).unwrap();
    let mut out = Vec::new();
    let options = Options {
        print_per_layer_stat: true,
        ost: Some(&mut out),
        ..quiet()
    };
    get_model_complexity_info(&net, &[4], options).unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(!text.is_empty());
    assert!(text.starts_with("Network(15, 100.000% Params, 15 Mac"));
    assert!(text.contains("(0): Linear(15, 100.000% Params"));
}
