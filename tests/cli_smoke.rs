use std::process::Command;

fn duel() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_duel"));
    cmd.env_remove("OPENAI_API_KEY").env_remove("COHERE_API_KEY");
    cmd
}

#[test]
fn run_without_credentials_exits_one() {
    let output = duel()
        .args(["run", "--objective", "concise answers", "--prompt", "hi"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("insufficient participants"), "stderr: {stderr}");
}

#[test]
fn models_lists_registered_backends() {
    let output = duel().arg("models").output().unwrap();

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cohere/command"));
    assert!(stdout.contains("openai/gpt-3.5-turbo"));
    assert!(stdout.contains("no credential"));
}

#[test]
fn unknown_judge_is_a_usage_error() {
    let output = duel()
        .env("OPENAI_API_KEY", "sk-test")
        .env("COHERE_API_KEY", "co-test")
        .args([
            "run",
            "--objective",
            "concise answers",
            "--prompt",
            "hi",
            "--judge",
            "no/such-model",
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not available"), "stderr: {stderr}");
}
