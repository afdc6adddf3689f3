use std::fs;
use std::io::Cursor;
use std::path::Path;

use assert_cmd::Command;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use predicates::prelude::PredicateBooleanExt;
use predicates::str::{contains, is_empty};
use serde_json::Value;
use tempfile::TempDir;

/// Command with a scrubbed environment whose config and credentials live in `home`.
fn isolated(mut cmd: Command, home: &Path) -> Command {
    cmd.env_remove("RUST_LOG")
        .env_remove("KT_PROVIDER")
        .env_remove("KT_MODEL")
        .env_remove("KT_AGE")
        .env_remove("KT_TIMEOUT")
        .env_remove("KT_OPENAI_BASE_URL")
        .env_remove("KT_GEMINI_BASE_URL")
        .env_remove("OPENAI_API_KEY")
        .env_remove("GEMINI_API_KEY")
        .env("KT_CONFIG", home.join("config.toml"))
        .env("KT_CREDENTIALS", home.join("credentials.toml"));
    cmd
}

fn kidtutor_cmd(home: &Path) -> Command {
    isolated(Command::new(assert_cmd::cargo::cargo_bin!("kidtutor")), home)
}

fn kidask_cmd(home: &Path) -> Command {
    isolated(Command::new(assert_cmd::cargo::cargo_bin!("kidask")), home)
}

fn parse_stdout_json(output: &[u8]) -> Value {
    let text = String::from_utf8(output.to_vec()).expect("stdout should be utf-8");
    serde_json::from_str(text.trim()).expect("stdout should contain valid JSON")
}

fn write_config(home: &Path, contents: &str) {
    fs::write(home.join("config.toml"), contents).expect("config should be writable");
}

#[test]
fn dry_run_succeeds_without_api_key() {
    let home = TempDir::new().unwrap();

    let assert = kidask_cmd(home.path())
        .args(["--age", "9", "--dry-run", "Why is the sky blue?"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["dry_run"], Value::Bool(true));
    assert_eq!(body["provider"], "gemini");
    assert_eq!(body["model"], "gemini-2.5-flash");
    assert_eq!(body["api_key_present"], Value::Bool(false));
    assert_eq!(body["auth"], "query-key");
    let text = body["request"]["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap();
    assert!(text.contains("at the age of 9."));
    assert!(text.ends_with("User Question: Why is the sky blue?"));
}

#[test]
fn dry_run_never_prints_the_real_key() {
    let home = TempDir::new().unwrap();
    let secret = "sk-secret-value";

    let assert = kidtutor_cmd(home.path())
        .env("OPENAI_API_KEY", secret)
        .args(["ask", "--provider", "openai", "--dry-run", "hello"])
        .assert()
        .success()
        .stdout(contains(secret).not());

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["provider"], "openai");
    assert_eq!(body["api_key_present"], Value::Bool(true));
    assert_eq!(body["url"], "https://api.openai.com/v1/chat/completions");
    assert_eq!(body["request"]["messages"][1]["content"], "hello");
}

#[test]
fn verbose_does_not_leak_api_key() {
    let home = TempDir::new().unwrap();
    let secret = "gemini-secret-value";

    kidask_cmd(home.path())
        .env("GEMINI_API_KEY", secret)
        .args(["--dry-run", "--verbose", "hello"])
        .assert()
        .success()
        .stderr(contains("api_key_present=true").and(contains(secret).not()));
}

#[test]
fn quiet_suppresses_verbose_logs_on_stderr() {
    let home = TempDir::new().unwrap();

    kidask_cmd(home.path())
        .args(["--dry-run", "--verbose", "--quiet", "hello"])
        .assert()
        .success()
        .stderr(is_empty());
}

#[test]
fn quiet_keeps_fatal_errors_visible() {
    let home = TempDir::new().unwrap();

    kidask_cmd(home.path())
        .arg("--quiet")
        .assert()
        .failure()
        .stderr(contains(
            "No question provided. Pass it as an argument or pipe it on stdin.",
        ));
}

#[test]
fn question_can_come_from_stdin() {
    let home = TempDir::new().unwrap();

    let assert = kidask_cmd(home.path())
        .args(["--provider", "openai", "--dry-run"])
        .write_stdin("  What is a fraction?\n")
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["request"]["messages"][1]["content"], "What is a fraction?");
}

#[test]
fn invalid_provider_from_env_returns_error() {
    let home = TempDir::new().unwrap();

    kidask_cmd(home.path())
        .env("KT_PROVIDER", "claude")
        .args(["--dry-run", "hello"])
        .assert()
        .failure()
        .stderr(contains(
            "Invalid KT_PROVIDER 'claude'. Supported values: openai, gemini.",
        ));
}

#[test]
fn missing_key_error_explains_how_to_fix_it() {
    let home = TempDir::new().unwrap();

    kidask_cmd(home.path())
        .args(["--provider", "openai", "hello"])
        .assert()
        .failure()
        .stderr(contains("no API key saved for ChatGPT").and(contains("OPENAI_API_KEY")));
}

#[test]
fn profile_env_and_cli_precedence_is_respected() {
    let home = TempDir::new().unwrap();
    write_config(
        home.path(),
        "[profiles.school]\nprovider = \"openai\"\nopenai_model = \"profile-model\"\nage = \"7\"\ntimeout = 30\n",
    );

    let assert = kidtutor_cmd(home.path())
        .env("KT_AGE", "8")
        .env("KT_TIMEOUT", "45")
        .args([
            "ask",
            "--profile",
            "school",
            "--timeout",
            "60",
            "--dry-run",
            "hello",
        ])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["provider"], "openai");
    assert_eq!(body["model"], "profile-model");
    assert_eq!(body["timeout_secs"], 60);
    let system = body["request"]["messages"][0]["content"].as_str().unwrap();
    assert!(system.ends_with("at the age of 8."));
}

#[test]
fn profile_is_not_implicit_when_not_passed() {
    let home = TempDir::new().unwrap();
    write_config(home.path(), "[profiles.default]\nprovider = \"openai\"\n");

    let assert = kidask_cmd(home.path())
        .args(["--dry-run", "hello"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["provider"], "gemini");
}

#[test]
fn profile_not_found_returns_error() {
    let home = TempDir::new().unwrap();
    write_config(home.path(), "[profiles.school]\nprovider = \"openai\"\n");

    kidask_cmd(home.path())
        .args(["--profile", "home", "--dry-run", "hello"])
        .assert()
        .failure()
        .stderr(contains("Profile 'home' not found"));
}

#[test]
fn json_flag_sets_json_output_mode() {
    let home = TempDir::new().unwrap();

    let assert = kidask_cmd(home.path())
        .args(["--output", "text", "--json", "--dry-run", "hello"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["output"], "json");
}

#[test]
fn image_dry_run_uses_homework_prompt() {
    let home = TempDir::new().unwrap();
    let photo = home.path().join("homework.png");
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(16, 16))
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    fs::write(&photo, bytes).unwrap();

    let assert = kidtutor_cmd(home.path())
        .args(["ask", "--provider", "openai", "--dry-run", "--image"])
        .arg(&photo)
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    let parts = &body["request"]["messages"][1]["content"];
    assert!(parts[0]["text"].as_str().unwrap().contains("homework"));
    assert!(
        parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,")
    );
}

#[test]
fn unreadable_image_is_reported() {
    let home = TempDir::new().unwrap();
    let photo = home.path().join("notes.txt");
    fs::write(&photo, "not a picture").unwrap();

    kidask_cmd(home.path())
        .args(["--dry-run", "--image"])
        .arg(&photo)
        .assert()
        .failure()
        .stderr(contains("could not prepare the attached image"));
}

#[test]
fn keys_set_status_and_clear() {
    let home = TempDir::new().unwrap();
    let secret = "AIza-test-secret";

    kidtutor_cmd(home.path())
        .args(["keys", "set", "gemini", secret])
        .assert()
        .success()
        .stdout(contains("saved gemini key"));

    kidtutor_cmd(home.path())
        .args(["keys", "status"])
        .assert()
        .success()
        .stdout(
            contains("gemini: saved")
                .and(contains("openai: missing"))
                .and(contains(secret).not()),
        );

    kidtutor_cmd(home.path())
        .env("OPENAI_API_KEY", "sk-env")
        .args(["keys", "status"])
        .assert()
        .success()
        .stdout(contains("openai: set via OPENAI_API_KEY"));

    kidtutor_cmd(home.path())
        .args(["keys", "clear", "gemini"])
        .assert()
        .success();

    kidtutor_cmd(home.path())
        .args(["keys", "status"])
        .assert()
        .success()
        .stdout(contains("gemini: missing"));
}

#[test]
fn keys_set_reads_key_from_stdin() {
    let home = TempDir::new().unwrap();

    kidtutor_cmd(home.path())
        .args(["keys", "set", "chatgpt"])
        .write_stdin("sk-from-stdin\n")
        .assert()
        .success()
        .stdout(contains("saved openai key"));

    let saved = fs::read_to_string(home.path().join("credentials.toml")).unwrap();
    assert!(saved.contains("sk-from-stdin"));
}

#[test]
fn saved_key_is_used_by_dry_run() {
    let home = TempDir::new().unwrap();
    kidtutor_cmd(home.path())
        .args(["keys", "set", "openai", "sk-saved"])
        .assert()
        .success();

    let assert = kidask_cmd(home.path())
        .args(["--provider", "openai", "--dry-run", "hello"])
        .assert()
        .success();

    let body = parse_stdout_json(&assert.get_output().stdout);
    assert_eq!(body["api_key_present"], Value::Bool(true));
}

#[test]
fn config_check_validates_profiles() {
    let home = TempDir::new().unwrap();
    write_config(home.path(), "[profiles.school]\nprovider = \"gemini\"\n");

    kidtutor_cmd(home.path())
        .args(["config", "check", "--profile", "school"])
        .assert()
        .success()
        .stdout(contains("config OK:"));

    write_config(home.path(), "[profiles.school]\nprovider = \"bard\"\n");
    kidtutor_cmd(home.path())
        .args(["config", "check", "--profile", "school"])
        .assert()
        .failure()
        .stderr(contains("Invalid profile provider 'bard'"));
}

#[test]
fn config_check_rejects_unknown_fields() {
    let home = TempDir::new().unwrap();
    write_config(home.path(), "[profiles.school]\ntemperature = 0.2\n");

    kidtutor_cmd(home.path())
        .args(["config", "check"])
        .assert()
        .failure()
        .stderr(contains("Failed to parse config file"));
}

#[test]
fn chat_switch_is_announced_and_saved() {
    let home = TempDir::new().unwrap();
    let transcript = home.path().join("chat.json");

    kidtutor_cmd(home.path())
        .args(["chat", "--no-welcome", "--save"])
        .arg(&transcript)
        .write_stdin("/provider openai\n/provider chatgpt\n/age 10\n/quit\n")
        .assert()
        .success()
        .stdout(contains("Switched to ChatGPT.").and(contains("now using")));

    let saved: Value = serde_json::from_str(&fs::read_to_string(&transcript).unwrap()).unwrap();
    assert_eq!(saved["selected_provider"], "openai");
    assert_eq!(saved["user_age"], "10");
    let messages = saved["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["text"], "Switched to ChatGPT.");
    assert_eq!(messages[0]["is_from_user"], Value::Bool(false));
}

#[test]
fn chat_speaks_welcome_and_explains_commands() {
    let home = TempDir::new().unwrap();

    kidtutor_cmd(home.path())
        .arg("chat")
        .write_stdin("/help\n/say nobody hears this\n/dance\n")
        .assert()
        .success()
        .stdout(
            contains("This is an AI teacher based on")
                .and(contains("/listen"))
                .and(contains("Not listening"))
                .and(contains("Unknown command '/dance'")),
        );
}

#[test]
fn version_prints_build_metadata() {
    kidtutor_cmd(Path::new("."))
        .arg("--version")
        .assert()
        .success()
        .stdout(contains("commit:").and(contains("built:")));

    kidask_cmd(Path::new("."))
        .arg("--version")
        .assert()
        .success()
        .stdout(contains("commit:").and(contains("built:")));
}

#[test]
fn completion_bash_outputs_script() {
    kidtutor_cmd(Path::new("."))
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(contains("_kidtutor").and(contains("complete")));
}

#[test]
fn help_includes_examples() {
    kidtutor_cmd(Path::new("."))
        .args(["ask", "--help"])
        .assert()
        .success()
        .stdout(contains("Examples:").and(contains("--image homework.jpg")));
}
