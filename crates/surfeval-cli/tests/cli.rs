use std::process::{Command, Output};

fn run_cli(args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_surfeval"));
    cmd.env_remove("RUST_LOG").env_remove("SURFEVAL_VERIFY_MODELS");
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.args(args).output().unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_missing_required_flags_is_usage_error() {
    let output = run_cli(&[], &[]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("--protocol"));
}

#[test]
fn test_missing_checkpoint_is_reported() {
    let output = run_cli(
        &["--protocol", "1", "--checkpoint", "/nonexistent/surfeval/model.onnx"],
        &[],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("checkpoint check failed"));
}

#[test]
fn test_missing_list_file_is_reported_before_model_load() {
    let output = run_cli(
        &[
            "--protocol",
            "2",
            "--checkpoint",
            "/nonexistent/surfeval/model.onnx",
            "--data-dir",
            "/nonexistent/surfeval/data",
        ],
        &[("SURFEVAL_VERIFY_MODELS", "0")],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("failed to open dataset"));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("Evaluating"));
}

#[test]
fn test_single_image_mode_checks_checkpoint() {
    let output = run_cli(
        &[
            "--protocol",
            "1",
            "--checkpoint",
            "/nonexistent/surfeval/model.onnx",
            "--image_path",
            "/nonexistent/portrait.jpg",
        ],
        &[("SURFEVAL_MODEL_DIR", "/nonexistent/surfeval/models")],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("checkpoint check failed"));
}

#[test]
fn test_pinned_checkpoint_mismatch_is_reported() {
    let dir = std::env::temp_dir().join(format!(
        "surfeval-cli-test-pinned-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let checkpoint = dir.join("classifier.onnx");
    std::fs::write(&checkpoint, b"not the pinned weights").unwrap();
    std::fs::write(
        dir.join("classifier.onnx.sha256"),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824  classifier.onnx\n",
    )
    .unwrap();

    let output = run_cli(
        &["--protocol", "1", "--checkpoint", checkpoint.to_str().unwrap()],
        &[],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("does not match its sidecar"));

    let _ = std::fs::remove_dir_all(&dir);
}
