//! End-to-end runs against a shell script standing in for the reconstruction tool.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use sb_runner::{Console, ProcessExecutor, RunnerConfig, Scheduler, SharedBuffer};
use sb_types::{DeviceSlot, TrialSpec, TrialState};

/// Behaviour is chosen by `--val-image`: `fail` exits non-zero, `hang` sleeps.
const FAKE_TOOL: &str = r#"#!/bin/sh
out=""
mode=""
while [ $# -gt 1 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    --val-image) mode="$2"; shift 2 ;;
    *) shift ;;
  esac
done
case "$mode" in
  fail) echo "simulated CUDA failure" >&2; exit 3 ;;
  hang) exec sleep 30 ;;
esac
printf 'ply\nformat binary_little_endian 1.0\nelement vertex 3\nend_header\n' > "$out"
echo "device=$CUDA_VISIBLE_DEVICES dataset=$1" >> "$out"
"#;

/// Written once, before any test spawns a child.
fn fake_tool() -> &'static Path {
    static TOOL: OnceLock<PathBuf> = OnceLock::new();
    TOOL.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("sb-runner-it-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fake-opensplat");
        std::fs::write(&path, FAKE_TOOL).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    })
}

fn spec(name: &str, mode: Option<&str>) -> TrialSpec {
    let spec = TrialSpec::new(name, format!("{name} trial"))
        .and_then(|s| s.param("num-iters", 10))
        .unwrap();
    match mode {
        Some(m) => spec.param("val-image", m).unwrap(),
        None => spec,
    }
}

fn scheduler(config: RunnerConfig, console: Console) -> Scheduler {
    config.prepare_output_dir().unwrap();
    let executor = Arc::new(ProcessExecutor::new(config.clone(), console.clone()));
    Scheduler::new(config, executor, console).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_run_records_every_trial() {
    let tmp = tempfile::tempdir().unwrap();
    let config = RunnerConfig::new(fake_tool(), tmp.path())
        .with_output_dir(tmp.path().join("out"))
        .with_workers(2)
        .with_timeout_secs(30);
    let buf = SharedBuffer::new();
    let sched = scheduler(config, Console::new(buf.clone()));

    let env_before = std::env::var_os("CUDA_VISIBLE_DEVICES");
    let results = sched
        .run(vec![
            spec("ok_a", None),
            spec("ok_b", None),
            spec("broken", Some("fail")),
        ])
        .await
        .unwrap();

    assert_eq!(results.outcomes.len(), 3);
    assert_eq!(results.success_count(), 2);

    let ok_a = results.get("ok_a").unwrap();
    assert_eq!(ok_a.device_slot(), DeviceSlot(0));
    let artifact = std::fs::read_to_string(ok_a.artifact_path()).unwrap();
    assert!(artifact.contains("device=0"), "{artifact}");
    assert!(artifact.contains(&format!("dataset={}", tmp.path().display())));

    let ok_b = results.get("ok_b").unwrap();
    let artifact = std::fs::read_to_string(ok_b.artifact_path()).unwrap();
    assert!(artifact.contains("device=1"), "{artifact}");

    let broken = results.get("broken").unwrap();
    assert_eq!(broken.state(), TrialState::Failed);
    assert_eq!(broken.device_slot(), DeviceSlot(0));
    assert!(broken
        .error_detail()
        .unwrap()
        .contains("simulated CUDA failure"));

    // The device variable is set on children only.
    assert_eq!(std::env::var_os("CUDA_VISIBLE_DEVICES"), env_before);

    let console = buf.contents();
    assert!(console.contains("[GPU 1] start: ok_b"));
    assert!(console.contains("[done 3/3]"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_kills_only_the_slow_trial() {
    let tmp = tempfile::tempdir().unwrap();
    let config = RunnerConfig::new(fake_tool(), tmp.path())
        .with_output_dir(tmp.path())
        .with_workers(2)
        .with_timeout_secs(1);
    let sched = scheduler(config, Console::sink());

    let started = Instant::now();
    let results = sched
        .run(vec![spec("stuck", Some("hang")), spec("quick", None)])
        .await
        .unwrap();

    assert!(started.elapsed().as_secs_f64() < 10.0);
    let stuck = results.get("stuck").unwrap();
    assert!(!stuck.succeeded());
    assert_eq!(stuck.error_detail(), Some("Timeout"));
    assert_eq!(stuck.state(), TrialState::TimedOut);
    assert!(results.get("quick").unwrap().succeeded());
}

#[tokio::test]
async fn missing_tool_fails_each_trial_without_aborting() {
    // Failed spawns still fork; keep them after the script has been written.
    fake_tool();
    let tmp = tempfile::tempdir().unwrap();
    let config = RunnerConfig::new(tmp.path().join("not-installed"), tmp.path())
        .with_output_dir(tmp.path())
        .with_workers(3);
    let sched = scheduler(config, Console::sink());

    let results = sched
        .run(vec![spec("a", None), spec("b", None), spec("c", None), spec("d", None)])
        .await
        .unwrap();

    assert_eq!(results.outcomes.len(), 4);
    for outcome in &results.outcomes {
        assert!(!outcome.succeeded());
        assert_eq!(outcome.state(), TrialState::LaunchError);
        assert!(!outcome.error_detail().unwrap().is_empty());
    }
    assert_eq!(sched.snapshot().launch_error, 4);
}

#[tokio::test]
async fn sequential_path_matches_pool_path() {
    let tmp = tempfile::tempdir().unwrap();
    let specs = || vec![spec("x", None), spec("y", Some("fail")), spec("z", None)];

    let mut summaries = Vec::new();
    for workers in [1, 3] {
        let config = RunnerConfig::new(fake_tool(), tmp.path())
            .with_output_dir(tmp.path().join(format!("w{workers}")))
            .with_workers(workers);
        let results = scheduler(config, Console::sink()).run(specs()).await.unwrap();
        let mut summary: Vec<(String, bool)> = results
            .outcomes
            .iter()
            .map(|o| (o.name().to_string(), o.succeeded()))
            .collect();
        summary.sort();
        summaries.push(summary);
    }
    assert_eq!(summaries[0], summaries[1]);
}
