//! CLI contract tests: prompt preview, validation, configuration and a full
//! submission against a local stand-in for the provider.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::process::Output;
use std::thread;

use assert_cmd::Command;
use tempfile::TempDir;

use psychguide::presenter::{
    INVALID_CONFIG_MESSAGE, MISSING_CONTACT_MESSAGE, MISSING_KEY_MESSAGE,
};

const ENV_VARS: [&str; 9] = [
    "CLAUDE_API_KEY",
    "PSYCHGUIDE_CONFIG",
    "PSYCHGUIDE_MODEL",
    "PSYCHGUIDE_MAX_TOKENS",
    "PSYCHGUIDE_TEMPERATURE",
    "PSYCHGUIDE_BASE_URL",
    "PSYCHGUIDE_TIMEOUT_SECS",
    "PSYCHGUIDE_MAX_RETRIES",
    "RUST_LOG",
];

/// Temp dir with a config whose secrets file does not exist.
fn isolated_config() -> TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    let secrets = dir.path().join("absent.env");
    let config = format!(
        "[retry]\nmax_retries = 0\ntimeout_secs = 5\n\n[paths]\nsecrets_file = {:?}\n",
        secrets.display().to_string()
    );
    std::fs::write(dir.path().join("config.toml"), config).expect("write config");
    dir
}

/// Replace the config in `dir` with `retry` settings and a secrets file path.
fn write_config(dir: &Path, retry: &str, secrets: &Path) {
    let config = format!(
        "[retry]\n{retry}\n\n[paths]\nsecrets_file = {:?}\n",
        secrets.display().to_string()
    );
    std::fs::write(dir.join("config.toml"), config).expect("write config");
}

fn psychguide(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("psychguide").expect("binary builds");
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.arg("--config").arg(config_dir.join("config.toml"));
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Answer one HTTP request with `body` on a background thread.
fn serve_once(status_line: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener binds");
    let addr = listener.local_addr().expect("local addr");
    thread::spawn(move || {
        if let Ok((mut socket, _)) = listener.accept() {
            let mut raw = Vec::new();
            let mut chunk = [0_u8; 4096];
            while let Ok(read) = socket.read(&mut chunk) {
                if read == 0 {
                    break;
                }
                raw.extend_from_slice(&chunk[..read]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes());
        }
    });
    format!("http://{addr}")
}

#[test]
fn prompt_prints_the_rendered_form() {
    let dir = isolated_config();
    let output = psychguide(dir.path())
        .args([
            "prompt",
            "--history",
            "Trouble sleeping for 3 weeks",
            "--symptom",
            "insomnia",
            "--symptom",
            "Fatigue",
        ])
        .output()
        .expect("runs");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "Mental Health History: Trouble sleeping for 3 weeks\n\
         Current Symptoms: Insomnia, Fatigue\n\
         Medication Preferences: No Preference\n\
         Treatment Preferences: Cognitive Behavioral Therapy (CBT)\n\
         Preferred Communication Method: Text Only\n\
         \n\
         Please provide a personalized diagnosis and treatment plan based on the above information.\n"
    );
}

#[test]
fn prompt_reads_form_file_and_flags_override_it() {
    let dir = isolated_config();
    let form = dir.path().join("form.toml");
    std::fs::write(
        &form,
        r#"
mental_health_history = "Low mood since spring"
current_symptoms = ["Depression", "Mood Swings"]
medication_preference = "Prefer Prescription Medication"
treatment_preference = "Mindfulness-Based Therapy"
"#,
    )
    .expect("write form");

    let output = psychguide(dir.path())
        .args(["prompt", "--form"])
        .arg(&form)
        .args(["--medication", "prefer natural remedies"])
        .output()
        .expect("runs");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Mental Health History: Low mood since spring\n"));
    assert!(text.contains("Current Symptoms: Depression, Mood Swings\n"));
    assert!(text.contains("Medication Preferences: Prefer Natural Remedies\n"));
    assert!(text.contains("Treatment Preferences: Mindfulness-Based Therapy\n"));
}

#[test]
fn unknown_symptom_is_a_usage_error() {
    let dir = isolated_config();
    let output = psychguide(dir.path())
        .args(["prompt", "--symptom", "sleepy"])
        .output()
        .expect("runs");

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("sleepy"));
}

#[test]
fn call_request_without_name_is_rejected() {
    let dir = isolated_config();
    let output = psychguide(dir.path())
        .args([
            "submit",
            "--quiet",
            "--history",
            "none",
            "--communication",
            "Text and Call",
            "--contact",
            "555-0100",
        ])
        .output()
        .expect("runs");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains(MISSING_CONTACT_MESSAGE));
    assert!(stdout(&output).is_empty());
}

#[test]
fn submit_without_key_reports_missing_configuration() {
    let dir = isolated_config();
    let output = psychguide(dir.path())
        .args(["submit", "--quiet", "--history", "none"])
        .output()
        .expect("runs");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains(MISSING_KEY_MESSAGE));
}

#[test]
fn check_without_key_fails() {
    let dir = isolated_config();
    let output = psychguide(dir.path()).arg("check").output().expect("runs");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("claude_api_key"));
}

#[test]
fn check_with_key_reports_settings_without_the_key() {
    let dir = isolated_config();
    let output = psychguide(dir.path())
        .arg("check")
        .env("CLAUDE_API_KEY", "sk-test-check-key")
        .output()
        .expect("runs");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("model: claude-3-5-sonnet-20240620"));
    assert!(text.contains("max_tokens: 280"));
    assert!(!text.contains("sk-test-check-key"));
}

#[test]
fn submit_prints_plan_and_call_confirmation() {
    let dir = isolated_config();
    let base_url = serve_once(
        "200 OK",
        r#"{"content":[{"type":"text","text":"Plan: CBT-I and a sleep diary."}]}"#,
    );

    let output = psychguide(dir.path())
        .env("CLAUDE_API_KEY", "sk-test-submit-key")
        .env("PSYCHGUIDE_BASE_URL", base_url)
        .args([
            "submit",
            "--history",
            "Trouble sleeping for 3 weeks",
            "--symptom",
            "insomnia",
            "--communication",
            "text-and-call",
            "--name",
            "Amina",
            "--contact",
            "555-0100",
        ])
        .output()
        .expect("runs");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.starts_with("Plan: CBT-I and a sleep diary.\n"));
    assert!(text.contains(
        "Thank you, Amina. A call will be placed to you at 555-0100 within the next 24 hours."
    ));
    assert!(stderr(&output).contains("Psychiatric Patient Diagnosis and Treatment"));
}

#[test]
fn submit_rejected_by_provider_exits_nonzero_without_detail() {
    let dir = isolated_config();
    let base_url = serve_once(
        "401 Unauthorized",
        r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#,
    );

    let output = psychguide(dir.path())
        .env("CLAUDE_API_KEY", "sk-test-rejected-key")
        .env("PSYCHGUIDE_BASE_URL", base_url)
        .args(["submit", "--quiet", "--history", "none"])
        .output()
        .expect("runs");

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("rejected"));
    assert!(!err.contains("sk-test-rejected-key"));
    assert!(stdout(&output).is_empty());
}

#[test]
fn prompt_accepts_kebab_case_choice_names() {
    let dir = isolated_config();
    let output = psychguide(dir.path())
        .args([
            "prompt",
            "--history",
            "none",
            "--medication",
            "avoid-medication",
            "--treatment",
            "therapy-and-medication",
        ])
        .output()
        .expect("runs");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Medication Preferences: Prefer to Avoid Medication\n"));
    assert!(text.contains("Treatment Preferences: Therapy & Medication\n"));
}

#[test]
fn form_errors_are_reported_before_bad_retry_settings() {
    let dir = isolated_config();
    write_config(
        dir.path(),
        "max_retries = 0\ntimeout_secs = 0",
        &dir.path().join("absent.env"),
    );

    let output = psychguide(dir.path())
        .args(["submit", "--quiet", "--history", "none", "--communication", "Text and Call"])
        .output()
        .expect("runs");

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains(MISSING_CONTACT_MESSAGE), "stderr: {err}");
    assert!(!err.contains(INVALID_CONFIG_MESSAGE));
}

#[cfg(unix)]
#[test]
fn world_readable_secrets_file_is_presented_as_configuration_error() {
    use std::os::unix::fs::PermissionsExt;

    let dir = isolated_config();
    let secrets = dir.path().join("shared.env");
    std::fs::write(&secrets, "CLAUDE_API_KEY=sk-test-shared-key\n").expect("write secrets");
    std::fs::set_permissions(&secrets, std::fs::Permissions::from_mode(0o644)).expect("chmod");
    write_config(dir.path(), "max_retries = 0\ntimeout_secs = 5", &secrets);

    let output = psychguide(dir.path())
        .args(["submit", "--quiet", "--history", "none"])
        .output()
        .expect("runs");

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains(INVALID_CONFIG_MESSAGE), "stderr: {err}");
    assert!(!err.contains("Error:"));
    assert!(!err.contains("sk-test-shared-key"));
    assert!(stdout(&output).is_empty());
}

#[cfg(unix)]
#[test]
fn check_reports_world_readable_secrets_file() {
    use std::os::unix::fs::PermissionsExt;

    let dir = isolated_config();
    let secrets = dir.path().join("shared.env");
    std::fs::write(&secrets, "CLAUDE_API_KEY=sk-test-shared-key\n").expect("write secrets");
    std::fs::set_permissions(&secrets, std::fs::Permissions::from_mode(0o644)).expect("chmod");
    write_config(dir.path(), "max_retries = 0\ntimeout_secs = 5", &secrets);

    let output = psychguide(dir.path()).arg("check").output().expect("runs");

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("error: invalid configuration: secrets file"), "stderr: {err}");
    assert!(!err.contains("sk-test-shared-key"));
}
