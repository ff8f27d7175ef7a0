use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_mutant-runner");

struct Campaign {
    _dir: TempDir,
    project: PathBuf,
    mutant_dir: PathBuf,
    output: PathBuf,
}

/// Lay out a project and a generator output directory. Each entry of
/// `mutants` becomes one manifest record; `None` content leaves the mutant
/// file missing on disk.
fn create_campaign(mutants: &[Option<&str>]) -> Campaign {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("project");
    fs::create_dir_all(project.join("src")).unwrap();
    fs::write(project.join("src/Token.sol"), "contract Token { uint x = 1; }").unwrap();

    let mutant_dir = dir.path().join("gambit_out");
    let mut manifest = Vec::new();
    for (i, content) in mutants.iter().enumerate() {
        let name = format!("mutants/{}/src/Token.sol", i + 1);
        if let Some(content) = content {
            let path = mutant_dir.join(&name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
        }
        manifest.push(serde_json::json!({
            "name": name,
            "original": "src/Token.sol",
            "description": "BinaryOpMutation",
            "diff": "- uint x = 1;\n+ uint x = 0;\n",
            "id": (i + 1).to_string(),
        }));
    }
    fs::create_dir_all(&mutant_dir).unwrap();
    fs::write(
        mutant_dir.join("gambit_results.json"),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();

    let output = dir.path().join("results.json");
    Campaign {
        _dir: dir,
        project,
        mutant_dir,
        output,
    }
}

impl Campaign {
    fn command(&self, build: &str, test: &str) -> Command {
        let mut cmd = Command::new(BIN);
        cmd.arg("run")
            .arg("--test-cmd")
            .arg(test)
            .arg("--build-cmd")
            .arg(build)
            .arg("--mutant-dir")
            .arg(&self.mutant_dir)
            .arg("--project-root")
            .arg(&self.project)
            .arg("--output")
            .arg(&self.output)
            .arg("--jobs")
            .arg("2");
        cmd
    }

    fn run(&self, build: &str, test: &str, extra: &[&str]) -> Output {
        self.command(build, test).args(extra).output().unwrap()
    }

    fn escaped_names(&self) -> Vec<String> {
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&self.output).unwrap()).unwrap();
        let mut names: Vec<String> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        names
    }
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

const DETECTS_MUTATION: &str = "! grep -q MUTATED src/Token.sol";

#[test]
fn undetected_mutations_are_written() {
    let c = create_campaign(&[Some("MUTATED 1"), Some("MUTATED 2"), Some("MUTATED 3")]);
    let out = c.run("true", "exit 0", &[]);

    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    assert_eq!(
        c.escaped_names(),
        ["mutants/1/src/Token.sol", "mutants/2/src/Token.sol", "mutants/3/src/Token.sol"]
    );
    assert!(stdout(&out).contains("3 out of 3 mutations were NOT detected"));
    assert!(stdout(&out).contains("Elapsed time:"));

    let record: serde_json::Value = serde_json::from_str(&fs::read_to_string(&c.output).unwrap()).unwrap();
    assert_eq!(record[0]["description"], "BinaryOpMutation");
    assert!(record[0]["id"].is_string(), "generator fields must be carried through");
}

#[test]
fn detected_mutations_leave_empty_list() {
    let c = create_campaign(&[Some("MUTATED 1"), Some("MUTATED 2"), Some("MUTATED 3")]);
    let out = c.run("true", DETECTS_MUTATION, &[]);

    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    assert!(c.escaped_names().is_empty());
    assert!(stdout(&out).contains("0 out of 3 mutations"));
}

#[test]
fn stale_mutant_exits_2_without_touching_output() {
    let c = create_campaign(&[Some("MUTATED"), Some("BROKEN"), Some("MUTATED")]);
    fs::write(&c.output, "previous results").unwrap();

    let out = c.run("! grep -q BROKEN src/Token.sol", "exit 0", &[]);

    assert_eq!(out.status.code(), Some(2), "stderr: {}", stderr(&out));
    assert_eq!(fs::read_to_string(&c.output).unwrap(), "previous results");
    let err = stderr(&out);
    assert!(err.contains("mutants/2/src/Token.sol"), "{err}");
    assert!(err.contains("gambit mutate"), "{err}");
}

#[test]
fn missing_mutant_file_is_skipped() {
    let c = create_campaign(&[Some("MUTATED 1"), None, Some("MUTATED 3")]);
    let out = c.run("true", "exit 0", &[]);

    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    assert_eq!(c.escaped_names(), ["mutants/1/src/Token.sol", "mutants/3/src/Token.sol"]);
}

#[test]
fn failing_baseline_tests_exit_3() {
    let c = create_campaign(&[Some("MUTATED")]);
    let out = c.run("true", "exit 1", &[]);

    assert_eq!(out.status.code(), Some(3), "stderr: {}", stderr(&out));
    assert!(!c.output.exists());
    assert!(stderr(&out).contains("main project context"));
}

#[test]
fn failing_baseline_build_exits_1() {
    let c = create_campaign(&[Some("MUTATED")]);
    let out = c.run("exit 1", "exit 0", &[]);

    assert_eq!(out.status.code(), Some(1), "stderr: {}", stderr(&out));
    assert!(!c.output.exists());
}

#[test]
fn missing_manifest_exits_1() {
    let c = create_campaign(&[Some("MUTATED")]);
    fs::remove_file(c.mutant_dir.join("gambit_results.json")).unwrap();
    let out = c.run("true", "exit 0", &[]);

    assert_eq!(out.status.code(), Some(1));
    assert!(!c.output.exists());
}

#[test]
fn uncaught_reruns_only_prior_escapes() {
    let c = create_campaign(&[Some("MUTATED 1"), Some("MUTATED 2"), Some("MUTATED 3")]);
    fs::write(
        &c.output,
        r#"[{"name": "mutants/2/src/Token.sol", "original": "src/Token.sol"}]"#,
    )
    .unwrap();

    let out = c.run("true", "exit 0", &["--uncaught"]);

    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    assert_eq!(c.escaped_names(), ["mutants/2/src/Token.sol"]);
    assert!(stdout(&out).contains("1 out of 1 mutations"));
}

#[test]
fn uncaught_with_no_matches_exits_1() {
    let c = create_campaign(&[Some("MUTATED 1")]);
    let prior = r#"[{"name": "mutants/99/src/Token.sol"}]"#;
    fs::write(&c.output, prior).unwrap();

    let out = c.run("true", "exit 0", &["--uncaught"]);

    assert_eq!(out.status.code(), Some(1));
    assert_eq!(fs::read_to_string(&c.output).unwrap(), prior);
}

#[test]
fn uncaught_without_prior_file_exits_1() {
    let c = create_campaign(&[Some("MUTATED 1")]);
    let out = c.run("true", "exit 0", &["--uncaught"]);
    assert_eq!(out.status.code(), Some(1));
}

fn send_sigint(pid: u32) {
    let status = Command::new("kill")
        .arg("-INT")
        .arg(pid.to_string())
        .status()
        .unwrap();
    assert!(status.success());
}

fn wait_with_deadline(child: &mut std::process::Child, limit: Duration) -> std::process::ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if start.elapsed() > limit {
            let _ = child.kill();
            panic!("mutant-runner did not exit within {limit:?}");
        }
        thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn interrupt_during_baseline_exits_130() {
    let c = create_campaign(&[Some("MUTATED")]);
    let mut child = c
        .command("true", "sleep 30")
        .args(["--timeout", "60"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    thread::sleep(Duration::from_millis(500));
    send_sigint(child.id());
    let status = wait_with_deadline(&mut child, Duration::from_secs(10));

    assert_eq!(status.code(), Some(130));
    assert!(!c.output.exists());
}

#[test]
fn interrupt_during_campaign_exits_130() {
    let c = create_campaign(&[Some("MUTATED 1"), Some("MUTATED 2"), Some("MUTATED 3")]);
    // Instant on the unmutated project, slow inside every workspace.
    let test = "if grep -q MUTATED src/Token.sol; then sleep 30; fi";
    let mut child = c
        .command("true", test)
        .args(["--timeout", "60"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    thread::sleep(Duration::from_millis(1500));
    send_sigint(child.id());
    let status = wait_with_deadline(&mut child, Duration::from_secs(10));

    assert_eq!(status.code(), Some(130));
    assert!(!c.output.exists());
}

#[test]
fn report_prints_records() {
    let c = create_campaign(&[Some("MUTATED 1"), Some("MUTATED 2")]);
    let out = c.run("true", "exit 0", &[]);
    assert_eq!(out.status.code(), Some(0));

    let report = Command::new(BIN)
        .arg("report")
        .arg("--json")
        .arg(&c.output)
        .output()
        .unwrap();

    assert_eq!(report.status.code(), Some(0));
    let text = stdout(&report);
    assert!(text.contains("=== Mutations to be tested ==="));
    assert!(text.contains("Mutation 2/2:"));
    assert!(text.contains("Description: BinaryOpMutation"));
    assert!(text.contains("Total mutations: 2"));
}

#[test]
fn report_on_empty_list_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.json");
    fs::write(&path, "[]").unwrap();

    let out = Command::new(BIN).arg("report").arg("--json").arg(&path).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn generate_without_gambit_still_writes_config() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("Token.sol"), "contract Token {}").unwrap();
    let foundry = dir.path().join("foundry.toml");
    fs::write(&foundry, "[profile.default]\nremappings = [\"a/=lib/a/\"]\n").unwrap();
    let empty_path = dir.path().join("bin");
    fs::create_dir_all(&empty_path).unwrap();
    let config = dir.path().join("gambit.json");

    let out = Command::new(BIN)
        .arg("generate")
        .arg(&src)
        .arg("--foundry-toml")
        .arg(&foundry)
        .arg("--output")
        .arg(&config)
        .env("PATH", &empty_path)
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("'gambit' command not found"), "{}", stderr(&out));
    let entries: serde_json::Value = serde_json::from_str(&fs::read_to_string(&config).unwrap()).unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["solc_remappings"][0], "a/=lib/a/");
}

