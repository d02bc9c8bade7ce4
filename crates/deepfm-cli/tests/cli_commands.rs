use clap::Parser;
use deepfm_cli::{Cli, Commands};
use std::path::{Path, PathBuf};

#[test]
fn cli_parses_train_flags() {
    let cli = Cli::parse_from([
        "deepfm",
        "train",
        "--config",
        "params.json",
        "--data",
        "train.jsonl",
        "--eval-data",
        "eval.jsonl",
        "--steps",
        "500",
    ]);
    match cli.command {
        Commands::Train(cmd) => {
            assert_eq!(cmd.config, PathBuf::from("params.json"));
            assert_eq!(cmd.data, PathBuf::from("train.jsonl"));
            assert_eq!(cmd.eval_data, Some(PathBuf::from("eval.jsonl")));
            assert_eq!(cmd.steps, Some(500));
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn cli_parses_predict_flags() {
    let cli = Cli::parse_from([
        "deepfm", "predict", "-c", "p.json", "-d", "test.jsonl", "-o", "out.jsonl",
    ]);
    match cli.command {
        Commands::Predict(cmd) => assert_eq!(cmd.output, Some(PathBuf::from("out.jsonl"))),
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn cli_requires_data() {
    assert!(Cli::try_parse_from(["deepfm", "evaluate", "--config", "p.json"]).is_err());
}

fn write_fixture(dir: &Path) -> (PathBuf, PathBuf) {
    let config = dir.join("params.json");
    let params = serde_json::json!({
        "cont_field_size": 2,
        "cate_field_size": 2,
        "cate_feats_size": 10,
        "embedding_size": 4,
        "hidden_units": [8, 4],
        "batch_size": 4,
        "model_dir": dir.join("model"),
    });
    std::fs::write(&config, params.to_string()).unwrap();

    let data = dir.join("data.jsonl");
    let lines: Vec<String> = (0..10)
        .map(|id| {
            serde_json::json!({
                "cont_feats": [0.1 * id as f32, 1.0],
                "cate_feats": [id, 9 - id],
                "label": if id < 5 { 1 } else { 0 },
            })
            .to_string()
        })
        .collect();
    std::fs::write(&data, lines.join("\n")).unwrap();
    (config, data)
}

#[test]
fn train_then_predict_writes_one_score_per_example() {
    let dir = tempfile::tempdir().unwrap();
    let (config, data) = write_fixture(dir.path());

    let train = Cli::parse_from([
        "deepfm",
        "train",
        "--config",
        config.to_str().unwrap(),
        "--data",
        data.to_str().unwrap(),
        "--eval-data",
        data.to_str().unwrap(),
        "--steps",
        "7",
    ]);
    match train.command {
        Commands::Train(cmd) => cmd.run().unwrap(),
        other => panic!("unexpected command {other:?}"),
    }
    assert!(dir.path().join("model/checkpoint-7.json").exists());

    let output = dir.path().join("scores.jsonl");
    let predict = Cli::parse_from([
        "deepfm",
        "predict",
        "--config",
        config.to_str().unwrap(),
        "--data",
        data.to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
    ]);
    match predict.command {
        Commands::Predict(cmd) => cmd.run().unwrap(),
        other => panic!("unexpected command {other:?}"),
    }

    let text = std::fs::read_to_string(&output).unwrap();
    let scores: Vec<f64> = text
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["score"].as_f64().unwrap())
        .collect();
    assert_eq!(scores.len(), 10);
    assert!(scores.iter().all(|p| *p > 0.0 && *p < 1.0));
}

#[test]
fn missing_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let cli = Cli::parse_from([
        "deepfm",
        "evaluate",
        "--config",
        dir.path().join("absent.json").to_str().unwrap(),
        "--data",
        "data.jsonl",
    ]);
    let Commands::Evaluate(cmd) = cli.command else {
        panic!("expected evaluate");
    };
    let err = cmd.run().unwrap_err();
    assert!(err.to_string().contains("Failed to load params"));
}
