use async_trait::async_trait;
use pilot_bootstrap::codec;
use pilot_bootstrap::plan::{BootstrapPlan, EncodedPayload};
use pilot_bootstrap::runtime::{
    AttemptOutcome, BootstrapError, BootstrapProtocol, ExtractError, Extractor, FetchError,
    Fetcher, Invocation, LaunchError, Launcher, Logger, Phase,
};
use pilot_bootstrap::types::{BootstrapConfig, BootstrapSettings, LocationSpec, PayloadEntry};
use sha2::{Digest, Sha512};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const PILOT_SCRIPT: &[u8] = b"print('pilot')\n";
const DESCRIPTOR: &[u8] = b"{\"Setups\": {}}";

fn sha512_hex(content: &[u8]) -> String {
    format!("{:x}", Sha512::digest(content))
}

fn manifest(records: &[(&str, &[u8])]) -> Vec<u8> {
    records
        .iter()
        .map(|(name, content)| format!("{}  {}\n", sha512_hex(content), name))
        .collect::<String>()
        .into_bytes()
}

fn good_bundle() -> HashMap<String, Vec<u8>> {
    HashMap::from([
        (
            "checksums.sha512".to_string(),
            manifest(&[("pilot.json", DESCRIPTOR), ("dirac-pilot.py", PILOT_SCRIPT)]),
        ),
        ("pilot.json".to_string(), DESCRIPTOR.to_vec()),
        ("pilot.tar".to_string(), b"archive".to_vec()),
    ])
}

fn remote(host: &str) -> LocationSpec {
    LocationSpec::Remote(format!("https://{host}"))
}

/// Serves fixed bundles per location and records every request.
#[derive(Default)]
struct MapFetcher {
    bundles: HashMap<String, HashMap<String, Vec<u8>>>,
    calls: Arc<Mutex<Vec<String>>>,
    /// When set, records on each manifest request whether a manifest already
    /// sits in a working directory under this path.
    watch: Option<PathBuf>,
    stale_seen: Arc<Mutex<Vec<bool>>>,
}

impl MapFetcher {
    fn serve(mut self, location: &LocationSpec, bundle: HashMap<String, Vec<u8>>) -> Self {
        self.bundles.insert(location.to_string(), bundle);
        self
    }

    fn manifest_present(&self, exec_dir: &Path) -> bool {
        std::fs::read_dir(exec_dir)
            .unwrap()
            .filter_map(Result::ok)
            .any(|entry| entry.path().join("checksums.sha512").exists())
    }
}

#[async_trait]
impl Fetcher for MapFetcher {
    async fn fetch(&self, location: &LocationSpec, resource: &str) -> Result<Vec<u8>, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{location} {resource}"));
        if resource == "checksums.sha512" {
            if let Some(exec_dir) = &self.watch {
                let present = self.manifest_present(exec_dir);
                self.stale_seen.lock().unwrap().push(present);
            }
        }
        self.bundles
            .get(&location.to_string())
            .and_then(|bundle| bundle.get(resource))
            .cloned()
            .ok_or_else(|| {
                FetchError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{resource} not served"),
                ))
            })
    }
}

/// Writes fixed files into the destination, or fails.
struct StubExtractor {
    files: Vec<(String, Vec<u8>)>,
    fail: bool,
    calls: Arc<Mutex<usize>>,
}

impl StubExtractor {
    fn writing(files: &[(&str, &[u8])]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(name, content)| (name.to_string(), content.to_vec()))
                .collect(),
            fail: false,
            calls: Arc::default(),
        }
    }

    fn failing() -> Self {
        Self {
            files: Vec::new(),
            fail: true,
            calls: Arc::default(),
        }
    }
}

#[async_trait]
impl Extractor for StubExtractor {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn extract(&self, _archive: &Path, dest: &Path) -> Result<(), ExtractError> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(ExtractError::Tar("corrupt archive".to_string()));
        }
        for (name, content) in &self.files {
            std::fs::write(dest.join(name), content)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct LaunchRecord {
    invocation: Invocation,
    input: String,
    files: Vec<String>,
    proxy_mode: Option<u32>,
}

struct RecordingLauncher {
    code: i32,
    records: Arc<Mutex<Vec<LaunchRecord>>>,
}

impl RecordingLauncher {
    fn exiting(code: i32) -> Self {
        Self {
            code,
            records: Arc::default(),
        }
    }
}

#[async_trait]
impl Launcher for RecordingLauncher {
    async fn launch(&self, invocation: &Invocation, input: Vec<u8>) -> Result<i32, LaunchError> {
        let mut files: Vec<String> = std::fs::read_dir(&invocation.cwd)?
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();

        #[cfg(unix)]
        let proxy_mode = {
            use std::os::unix::fs::PermissionsExt;
            std::fs::metadata(invocation.cwd.join("proxy"))
                .ok()
                .map(|m| m.permissions().mode() & 0o777)
        };
        #[cfg(not(unix))]
        let proxy_mode = None;

        self.records.lock().unwrap().push(LaunchRecord {
            invocation: invocation.clone(),
            input: String::from_utf8_lossy(&input).into_owned(),
            files,
            proxy_mode,
        });
        Ok(self.code)
    }
}

fn plan_in(exec_dir: &Path, config: BootstrapConfig) -> BootstrapPlan {
    let settings = BootstrapSettings {
        interpreter: Some("python3".to_string()),
        ..BootstrapSettings::default()
    };
    let config = config
        .with_exec_dir(exec_dir.display().to_string())
        .with_settings(settings);
    BootstrapPlan::compile(&config).unwrap()
}

fn protocol(
    plan: BootstrapPlan,
    fetcher: MapFetcher,
    primary: StubExtractor,
    fallback: StubExtractor,
    launcher: RecordingLauncher,
) -> BootstrapProtocol {
    BootstrapProtocol::with_components(
        plan,
        Box::new(fetcher),
        Box::new(primary),
        Box::new(fallback),
        Box::new(launcher),
    )
    .with_run_id("run-1")
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[tokio::test]
async fn test_first_successful_candidate_wins() {
    let exec = TempDir::new().unwrap();
    let mut plan = plan_in(exec.path(), BootstrapConfig::new("-l LHCb"));
    plan.locations = vec![remote("a"), remote("b"), remote("c"), remote("d")];

    let fetcher = MapFetcher::default()
        .serve(&remote("c"), good_bundle())
        .serve(&remote("d"), good_bundle());
    let calls = fetcher.calls.clone();
    let launcher = RecordingLauncher::exiting(0);
    let records = launcher.records.clone();

    let report = protocol(
        plan,
        fetcher,
        StubExtractor::writing(&[("dirac-pilot.py", PILOT_SCRIPT)]),
        StubExtractor::failing(),
        launcher,
    )
    .run(&mut Logger::silent())
    .await
    .unwrap();

    let outcomes: Vec<bool> = report
        .attempts
        .iter()
        .map(|a| a.outcome == AttemptOutcome::Success)
        .collect();
    assert_eq!(outcomes, vec![false, false, true]);
    assert_eq!(report.attempts[2].location, remote("c"));
    assert!(calls.lock().unwrap().iter().all(|c| !c.starts_with("https://d ")));

    assert_eq!(
        report.phases,
        vec![
            Phase::Init,
            Phase::StageWorkdir,
            Phase::UnpackPayload,
            Phase::Retrieve,
            Phase::Verify,
            Phase::Execute,
            Phase::Cleanup,
        ]
    );
    assert_eq!(report.verified_files, 2);
    assert_eq!(report.workload_exit_code, Some(0));

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].files.contains(&"dirac-pilot.py".to_string()));
    assert!(is_empty_dir(exec.path()));
}

#[tokio::test]
async fn test_exhaustion_tries_each_candidate_once() {
    let exec = TempDir::new().unwrap();
    let mut plan = plan_in(exec.path(), BootstrapConfig::new(""));
    plan.locations = vec![remote("a"), remote("b")];

    let fetcher = MapFetcher::default();
    let calls = fetcher.calls.clone();
    let launcher = RecordingLauncher::exiting(0);
    let records = launcher.records.clone();

    let err = protocol(
        plan,
        fetcher,
        StubExtractor::failing(),
        StubExtractor::failing(),
        launcher,
    )
    .run(&mut Logger::silent())
    .await
    .unwrap_err();

    assert!(matches!(err, BootstrapError::RetrievalExhausted { attempts: 2 }));
    assert_eq!(err.exit_code(), 4);
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["https://a checksums.sha512", "https://b checksums.sha512"]
    );
    assert!(records.lock().unwrap().is_empty());
    assert!(is_empty_dir(exec.path()));
}

#[tokio::test]
async fn test_checksum_mismatch_prevents_launch() {
    let exec = TempDir::new().unwrap();
    let mut plan = plan_in(exec.path(), BootstrapConfig::new(""));
    plan.locations = vec![remote("a")];

    let mut bundle = good_bundle();
    bundle.insert(
        "checksums.sha512".to_string(),
        manifest(&[("dirac-pilot.py", b"print('genuine')\n")]),
    );
    let launcher = RecordingLauncher::exiting(0);
    let records = launcher.records.clone();

    let err = protocol(
        plan,
        MapFetcher::default().serve(&remote("a"), bundle),
        StubExtractor::writing(&[("dirac-pilot.py", PILOT_SCRIPT)]),
        StubExtractor::failing(),
        launcher,
    )
    .run(&mut Logger::silent())
    .await
    .unwrap_err();

    assert_eq!(err.exit_code(), 5);
    assert!(records.lock().unwrap().is_empty());
    assert!(is_empty_dir(exec.path()));
}

#[tokio::test]
async fn test_absent_manifest_entries_are_skipped() {
    let exec = TempDir::new().unwrap();
    let mut plan = plan_in(exec.path(), BootstrapConfig::new(""));
    plan.locations = vec![remote("a")];

    let mut bundle = good_bundle();
    bundle.insert(
        "checksums.sha512".to_string(),
        manifest(&[("pilot.json", DESCRIPTOR), ("not-shipped.py", b"x")]),
    );

    let report = protocol(
        plan,
        MapFetcher::default().serve(&remote("a"), bundle),
        StubExtractor::writing(&[]),
        StubExtractor::failing(),
        RecordingLauncher::exiting(0),
    )
    .run(&mut Logger::silent())
    .await
    .unwrap();

    assert_eq!(report.verified_files, 1);
}

#[tokio::test]
async fn test_proxy_only_run_skips_retrieval() {
    let exec = TempDir::new().unwrap();
    let plan = plan_in(
        exec.path(),
        BootstrapConfig::new("").with_payload(PayloadEntry::new("proxy", b"X".to_vec())),
    );

    let fetcher = MapFetcher::default();
    let calls = fetcher.calls.clone();
    let launcher = RecordingLauncher::exiting(0);
    let records = launcher.records.clone();

    let report = protocol(
        plan,
        fetcher,
        StubExtractor::failing(),
        StubExtractor::failing(),
        launcher,
    )
    .run(&mut Logger::silent())
    .await
    .unwrap();

    assert!(calls.lock().unwrap().is_empty());
    assert!(!report.phases.contains(&Phase::Retrieve));
    assert!(!report.phases.contains(&Phase::Verify));

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.files, vec!["proxy".to_string()]);
    #[cfg(unix)]
    assert_eq!(record.proxy_mode, Some(0o700));
    assert_eq!(
        record.invocation.env.get("X509_USER_PROXY"),
        Some(&record.invocation.cwd.join("proxy").display().to_string())
    );
}

#[tokio::test]
async fn test_corrupt_payload_exits_three_and_cleans_up() {
    let exec = TempDir::new().unwrap();
    let mut plan = plan_in(exec.path(), BootstrapConfig::new(""));
    plan.payload = vec![EncodedPayload {
        name: "proxy".to_string(),
        token: "%%% not a token %%%".to_string(),
    }];
    let launcher = RecordingLauncher::exiting(0);
    let records = launcher.records.clone();

    let err = protocol(
        plan,
        MapFetcher::default(),
        StubExtractor::failing(),
        StubExtractor::failing(),
        launcher,
    )
    .run(&mut Logger::silent())
    .await
    .unwrap_err();

    assert_eq!(err.exit_code(), 3);
    assert!(records.lock().unwrap().is_empty());
    assert!(is_empty_dir(exec.path()));
}

#[tokio::test]
async fn test_payload_outside_workdir_is_refused() {
    let exec = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let escaped = outside.path().join("escaped");
    let mut plan = plan_in(exec.path(), BootstrapConfig::new(""));
    plan.payload = vec![EncodedPayload {
        name: escaped.display().to_string(),
        token: codec::encode(b"cred").unwrap(),
    }];
    let launcher = RecordingLauncher::exiting(0);
    let records = launcher.records.clone();

    let err = protocol(
        plan,
        MapFetcher::default(),
        StubExtractor::failing(),
        StubExtractor::failing(),
        launcher,
    )
    .run(&mut Logger::silent())
    .await
    .unwrap_err();

    assert_eq!(err.exit_code(), 3);
    assert!(!escaped.exists());
    assert!(records.lock().unwrap().is_empty());
    assert!(is_empty_dir(exec.path()));
}

#[tokio::test]
async fn test_stale_files_are_purged_between_candidates() {
    let exec = TempDir::new().unwrap();
    let mut plan = plan_in(exec.path(), BootstrapConfig::new(""));
    plan.locations = vec![remote("a"), remote("b")];

    let mut partial = good_bundle();
    partial.remove("pilot.json");
    let mut fetcher = MapFetcher::default()
        .serve(&remote("a"), partial)
        .serve(&remote("b"), good_bundle());
    fetcher.watch = Some(exec.path().to_path_buf());
    let stale_seen = fetcher.stale_seen.clone();

    let report = protocol(
        plan,
        fetcher,
        StubExtractor::writing(&[("dirac-pilot.py", PILOT_SCRIPT)]),
        StubExtractor::failing(),
        RecordingLauncher::exiting(0),
    )
    .run(&mut Logger::silent())
    .await
    .unwrap();

    assert_eq!(report.attempts.len(), 2);
    assert_eq!(*stale_seen.lock().unwrap(), vec![false, false]);
}

#[tokio::test]
async fn test_primary_extraction_failure_falls_back() {
    let exec = TempDir::new().unwrap();
    let mut plan = plan_in(exec.path(), BootstrapConfig::new(""));
    plan.locations = vec![remote("a")];

    let primary = StubExtractor::failing();
    let fallback = StubExtractor::writing(&[("dirac-pilot.py", PILOT_SCRIPT)]);
    let fallback_calls = fallback.calls.clone();

    let report = protocol(
        plan,
        MapFetcher::default().serve(&remote("a"), good_bundle()),
        primary,
        fallback,
        RecordingLauncher::exiting(0),
    )
    .run(&mut Logger::silent())
    .await
    .unwrap();

    assert_eq!(*fallback_calls.lock().unwrap(), 1);
    assert_eq!(report.verified_files, 2);
}

#[tokio::test]
async fn test_invocation_and_forwarded_log() {
    let exec = TempDir::new().unwrap();
    let plan = plan_in(exec.path(), BootstrapConfig::new("-l LHCb -o 'a b'"));
    let launcher = RecordingLauncher::exiting(0);
    let records = launcher.records.clone();
    let mut logger = Logger::silent();

    protocol(
        plan,
        MapFetcher::default(),
        StubExtractor::failing(),
        StubExtractor::failing(),
        launcher,
    )
    .run(&mut logger)
    .await
    .unwrap();

    let records = records.lock().unwrap();
    let invocation = &records[0].invocation;
    assert_eq!(invocation.program, "python3");
    assert_eq!(
        invocation.args,
        vec!["dirac-pilot.py", "-l", "LHCb", "-o", "a b", "--pilotUUID", "run-1"]
    );
    assert!(records[0].input.contains("[pilotLogger] Launching: "));
    assert!(records[0].input.ends_with('\n'));
    assert!(logger.lines().is_empty());
}

#[tokio::test]
async fn test_workload_failure_exits_one() {
    let exec = TempDir::new().unwrap();
    let plan = plan_in(exec.path(), BootstrapConfig::new(""));

    let err = protocol(
        plan,
        MapFetcher::default(),
        StubExtractor::failing(),
        StubExtractor::failing(),
        RecordingLauncher::exiting(42),
    )
    .run(&mut Logger::silent())
    .await
    .unwrap_err();

    assert!(matches!(err, BootstrapError::WorkloadFailed { code: 42 }));
    assert_eq!(err.exit_code(), 1);
    assert!(is_empty_dir(exec.path()));
}

#[tokio::test]
async fn test_missing_exec_dir_exits_two() {
    let exec = TempDir::new().unwrap();
    let plan = plan_in(&exec.path().join("absent"), BootstrapConfig::new(""));
    let launcher = RecordingLauncher::exiting(0);
    let records = launcher.records.clone();

    let err = protocol(
        plan,
        MapFetcher::default(),
        StubExtractor::failing(),
        StubExtractor::failing(),
        launcher,
    )
    .run(&mut Logger::silent())
    .await
    .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert!(records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unbalanced_options_fail_before_launch() {
    let exec = TempDir::new().unwrap();
    let mut plan = plan_in(exec.path(), BootstrapConfig::new(""));
    plan.options = "-o 'open".to_string();
    let launcher = RecordingLauncher::exiting(0);
    let records = launcher.records.clone();

    let err = protocol(
        plan,
        MapFetcher::default(),
        StubExtractor::failing(),
        StubExtractor::failing(),
        launcher,
    )
    .run(&mut Logger::silent())
    .await
    .unwrap_err();

    assert!(matches!(err, BootstrapError::InvalidOptions { .. }));
    assert!(records.lock().unwrap().is_empty());
}

#[test]
fn test_payload_round_trips_through_plan() {
    let exec = TempDir::new().unwrap();
    let plan = plan_in(
        exec.path(),
        BootstrapConfig::new("").with_payload(PayloadEntry::new("pilot.cfg", vec![0u8, 159, 146, 150])),
    );
    assert_eq!(codec::decode(&plan.payload[0].token).unwrap(), vec![0u8, 159, 146, 150]);
}
