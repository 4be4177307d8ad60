//! Unit tests for the package orchestrator.

use super::*;
use crate::archive::error::ExtractionError;
use crate::archive::extraction::MockExtractor;
use crate::checksum::hash_bytes;
use crate::config::PackageSpec;
use crate::download::{DownloadError, MockDownloader};
use crate::test_utils::{StubDownloader, TarCodec, sample_source_tree, tar_bytes};
use rstest::{fixture, rstest};
use tempfile::TempDir;

const FOO_URL: &str = "https://example.test/foo-2.0.tar.gz";

struct Project {
    _temp: TempDir,
    config: BootstrapConfig,
}

impl Project {
    fn layout(&self) -> &ProjectLayout {
        &self.config.layout
    }

    fn cache_file(&self) -> Utf8PathBuf {
        self.layout().cache_dir.join("foo-2.0.tar.gz")
    }

    fn destination(&self) -> Utf8PathBuf {
        self.layout().vendor_dir.join("foo")
    }

    fn seed_cache(&self, bytes: &[u8]) {
        std::fs::create_dir_all(&self.layout().cache_dir).expect("create cache");
        std::fs::write(self.cache_file(), bytes).expect("write cache");
    }

    fn pin(&self, sha256: &str) {
        let mut lock = Lockfile::default();
        lock.record(
            PackageKey::new("foo", "2.0"),
            LockEntry {
                name: "foo".to_owned(),
                version: "2.0".to_owned(),
                url: FOO_URL.to_owned(),
                archive: ".bootstrap_cache/foo-2.0.tar.gz".to_owned(),
                sha256: sha256.to_owned(),
                destination: "src/thirdparty/foo".to_owned(),
            },
        );
        lock.save(self.layout().lockfile.as_std_path())
            .expect("save lock");
    }

    fn lock(&self) -> Lockfile {
        Lockfile::load(self.layout().lockfile.as_std_path()).expect("load lock")
    }
}

#[fixture]
fn project() -> Project {
    let temp = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
    let config = BootstrapConfig {
        layout: ProjectLayout::new(&root),
        packages: vec![
            PackageSpec::new("foo", "2.0", "https://example.test/foo-{ver}.tar.gz", "foo-{ver}.tar.gz")
                .with_inner_top("foo-{ver}"),
        ],
    };
    Project {
        _temp: temp,
        config,
    }
}

fn archive() -> Vec<u8> {
    tar_bytes(&sample_source_tree(), TarCodec::Gzip).expect("build archive")
}

fn extracted() -> ExtractOutcome {
    ExtractOutcome::Extracted {
        files: 2,
        stripped_top: Some("foo-2.0".to_owned()),
    }
}

fn output_text(out: Vec<u8>) -> String {
    String::from_utf8(out).expect("UTF-8 output")
}

#[rstest]
fn first_run_downloads_extracts_and_records(project: Project) {
    let downloader = StubDownloader::new().with_response(FOO_URL, archive());
    let mut out = Vec::new();

    let summary = run_bootstrap_with(
        &project.config,
        RunOptions::default(),
        &downloader,
        &SafeExtractor,
        &mut out,
    )
    .expect("run");

    assert_eq!(downloader.calls(), vec![FOO_URL.to_owned()]);
    let report = summary.packages.first().expect("one report");
    assert!(matches!(report.fetch, FetchStatus::Downloaded { .. }));
    assert_eq!(report.extract, ExtractStatus::Extracted { files: 2 });
    assert!(project.destination().join("src/a.c").is_file());

    let lock = project.lock();
    let entry = lock.get(&PackageKey::new("foo", "2.0")).expect("entry");
    assert_eq!(entry.sha256, hash_bytes(&archive()).to_string());
    assert_eq!(entry.archive, ".bootstrap_cache/foo-2.0.tar.gz");
    assert_eq!(entry.destination, "src/thirdparty/foo");
    assert_eq!(entry.url, FOO_URL);

    let text = output_text(out);
    assert!(text.starts_with("[foo 2.0]\n  - fetching: https://example.test/foo-2.0.tar.gz\n"));
    assert!(text.contains("  - sha256: "));
    assert!(!text.contains("checksum OK"));
    assert!(text.contains("  - extracting to: "));
}

#[rstest]
fn rerun_performs_no_network_or_extraction(project: Project) {
    let downloader = StubDownloader::new().with_response(FOO_URL, archive());
    run_bootstrap_with(
        &project.config,
        RunOptions::default(),
        &downloader,
        &SafeExtractor,
        &mut Vec::new(),
    )
    .expect("first run");
    let lock_before = std::fs::read(&project.layout().lockfile).expect("read lock");

    let mut offline = MockDownloader::new();
    offline.expect_download().times(0);
    let mut idle = MockExtractor::new();
    idle.expect_extract().times(0);
    let mut out = Vec::new();

    let summary = run_bootstrap_with(
        &project.config,
        RunOptions::default(),
        &offline,
        &idle,
        &mut out,
    )
    .expect("second run");

    let report = summary.packages.first().expect("one report");
    assert_eq!(report.fetch, FetchStatus::Cached);
    assert_eq!(report.extract, ExtractStatus::AlreadyPresent);
    assert_eq!(
        std::fs::read(&project.layout().lockfile).expect("read lock"),
        lock_before
    );

    let text = output_text(out);
    assert!(text.contains("  - using cached: foo-2.0.tar.gz"));
    assert!(text.contains("  - checksum OK (manifest.lock)"));
    assert!(text.contains("  - already extracted: "));
}

#[rstest]
fn checksum_mismatch_aborts_before_extraction(project: Project) {
    project.seed_cache(&archive());
    project.pin(&"0".repeat(64));
    let lock_before = std::fs::read(&project.layout().lockfile).expect("read lock");

    let mut downloader = MockDownloader::new();
    downloader.expect_download().times(0);
    let mut extractor = MockExtractor::new();
    extractor.expect_extract().times(0);

    let err = run_bootstrap_with(
        &project.config,
        RunOptions::default(),
        &downloader,
        &extractor,
        &mut Vec::new(),
    )
    .expect_err("mismatch");

    assert!(matches!(
        err,
        BootstrapError::Checksum {
            source: crate::checksum::ChecksumError::Mismatch { .. },
            ..
        }
    ));
    let message = err.to_string();
    assert!(message.contains("foo@2.0"));
    assert!(message.contains(&"0".repeat(64)));
    assert!(message.contains(hash_bytes(&archive()).as_str()));
    assert!(!project.destination().exists());
    assert_eq!(
        std::fs::read(&project.layout().lockfile).expect("read lock"),
        lock_before
    );
}

#[rstest]
fn empty_pinned_digest_is_treated_as_unpinned(project: Project) {
    project.seed_cache(&archive());
    project.pin("");

    let mut downloader = MockDownloader::new();
    downloader.expect_download().times(0);
    let mut out = Vec::new();

    run_bootstrap_with(
        &project.config,
        RunOptions::default(),
        &downloader,
        &SafeExtractor,
        &mut out,
    )
    .expect("run");

    assert!(project.destination().join("src/a.c").is_file());
    let lock = project.lock();
    let entry = lock.get(&PackageKey::new("foo", "2.0")).expect("entry");
    assert_eq!(entry.sha256, hash_bytes(&archive()).to_string());
    assert!(!output_text(out).contains("checksum OK"));
}

#[rstest]
fn malformed_pinned_digest_is_rejected_before_extraction(project: Project) {
    project.seed_cache(&archive());
    project.pin("xyz");

    let mut downloader = MockDownloader::new();
    downloader.expect_download().times(0);
    let mut extractor = MockExtractor::new();
    extractor.expect_extract().times(0);

    let err = run_bootstrap_with(
        &project.config,
        RunOptions::default(),
        &downloader,
        &extractor,
        &mut Vec::new(),
    )
    .expect_err("malformed pin");

    assert!(matches!(
        err,
        BootstrapError::Checksum {
            source: crate::checksum::ChecksumError::InvalidDigest { .. },
            ..
        }
    ));
    assert!(err.to_string().contains("foo@2.0"));
    assert!(!project.destination().exists());
}

#[rstest]
fn uppercase_pinned_digest_matches(project: Project) {
    project.seed_cache(&archive());
    project.pin(&hash_bytes(&archive()).as_str().to_ascii_uppercase());
    let mut out = Vec::new();

    run_bootstrap_with(
        &project.config,
        RunOptions::default(),
        &StubDownloader::new(),
        &SafeExtractor,
        &mut out,
    )
    .expect("run");

    assert!(output_text(out).contains("  - checksum OK (manifest.lock)\n"));
}

#[rstest]
fn partial_lock_entry_is_completed_on_run(project: Project) {
    project.seed_cache(&archive());
    std::fs::write(
        &project.layout().lockfile,
        r#"{"packages":{"foo@2.0":{"name":"foo","version":"2.0"}}}"#,
    )
    .expect("write lock");

    run_bootstrap_with(
        &project.config,
        RunOptions::default(),
        &StubDownloader::new(),
        &SafeExtractor,
        &mut Vec::new(),
    )
    .expect("run");

    let lock = project.lock();
    let entry = lock.get(&PackageKey::new("foo", "2.0")).expect("entry");
    assert_eq!(entry.sha256, hash_bytes(&archive()).to_string());
    assert_eq!(entry.url, FOO_URL);
    assert_eq!(entry.archive, ".bootstrap_cache/foo-2.0.tar.gz");
    assert!(project.destination().join("src/a.c").is_file());
}

#[rstest]
fn download_failure_names_package_and_skips_lockfile(project: Project) {
    let mut downloader = MockDownloader::new();
    downloader
        .expect_download()
        .times(1)
        .returning(|url, _| {
            Err(DownloadError::NotFound {
                url: url.to_owned(),
            })
        });
    let mut extractor = MockExtractor::new();
    extractor.expect_extract().times(0);

    let err = run_bootstrap_with(
        &project.config,
        RunOptions::default(),
        &downloader,
        &extractor,
        &mut Vec::new(),
    )
    .expect_err("download failure");

    assert_eq!(err.package().map(PackageKey::as_str), Some("foo@2.0"));
    assert!(!project.layout().lockfile.exists());
}

#[rstest]
fn force_refetches_and_requests_forced_extraction(project: Project) {
    project.seed_cache(b"stale bytes");
    std::fs::create_dir_all(project.destination()).expect("create dest");
    std::fs::write(project.destination().join("README"), b"old").expect("write old");

    let mut downloader = MockDownloader::new();
    downloader
        .expect_download()
        .withf(|url, _| url == FOO_URL)
        .times(1)
        .returning(|_, dest| {
            std::fs::write(dest, b"fresh bytes")?;
            Ok(11)
        });
    let mut extractor = MockExtractor::new();
    extractor
        .expect_extract()
        .withf(|request: &ExtractRequest| request.force && request.inner_top.as_deref() == Some("foo-2.0"))
        .times(1)
        .returning(|_| Ok(extracted()));

    let options = RunOptions {
        force: true,
        quiet: true,
    };
    let summary =
        run_bootstrap_with(&project.config, options, &downloader, &extractor, &mut Vec::new())
            .expect("forced run");

    let report = summary.packages.first().expect("one report");
    assert_eq!(report.fetch, FetchStatus::Downloaded { bytes: 11 });
    assert_eq!(report.sha256, hash_bytes(b"fresh bytes"));
}

#[rstest]
fn marker_only_destination_is_extracted_again(project: Project) {
    project.seed_cache(&archive());
    std::fs::create_dir_all(project.destination()).expect("create dest");
    std::fs::write(project.destination().join(".gitignore"), "*\n").expect("marker");

    let mut extractor = MockExtractor::new();
    extractor
        .expect_extract()
        .withf(|request: &ExtractRequest| !request.force)
        .times(1)
        .returning(|_| Ok(extracted()));

    let summary = run_bootstrap_with(
        &project.config,
        RunOptions::default(),
        &StubDownloader::new(),
        &extractor,
        &mut Vec::new(),
    )
    .expect("run");

    let report = summary.packages.first().expect("one report");
    assert_eq!(report.fetch, FetchStatus::Cached);
    assert_eq!(report.extract, ExtractStatus::Extracted { files: 2 });
}

#[rstest]
fn extraction_failure_names_package(project: Project) {
    project.seed_cache(&archive());
    let mut extractor = MockExtractor::new();
    extractor.expect_extract().times(1).returning(|_| {
        Err(ExtractionError::PathTraversal {
            path: "../../etc/passwd".to_owned(),
        })
    });

    let err = run_bootstrap_with(
        &project.config,
        RunOptions::default(),
        &StubDownloader::new(),
        &extractor,
        &mut Vec::new(),
    )
    .expect_err("traversal");

    assert!(matches!(err, BootstrapError::Extraction { .. }));
    assert!(err.to_string().starts_with("[foo@2.0] extraction failed"));
    assert!(!project.layout().lockfile.exists());
}

#[rstest]
fn quiet_run_writes_nothing(project: Project) {
    project.seed_cache(&archive());
    let mut extractor = MockExtractor::new();
    extractor
        .expect_extract()
        .times(1)
        .returning(|_| Ok(ExtractOutcome::SkippedPopulated));
    let mut out = Vec::new();

    let options = RunOptions {
        force: false,
        quiet: true,
    };
    let summary = run_bootstrap_with(
        &project.config,
        options,
        &StubDownloader::new(),
        &extractor,
        &mut out,
    )
    .expect("run");

    assert!(out.is_empty());
    let report = summary.packages.first().expect("one report");
    assert_eq!(report.extract, ExtractStatus::SkippedPopulated);
}

#[rstest]
fn concurrent_run_is_refused(project: Project) {
    std::fs::create_dir_all(&project.layout().cache_dir).expect("create cache");
    let held = RunLock::acquire(&project.layout().cache_dir.join(RUN_LOCK_FILE)).expect("lock");

    let err = run_bootstrap_with(
        &project.config,
        RunOptions::default(),
        &StubDownloader::new(),
        &MockExtractor::new(),
        &mut Vec::new(),
    )
    .expect_err("contended");

    assert!(matches!(err, BootstrapError::AlreadyRunning { .. }));
    drop(held);
}

#[rstest]
fn clean_removes_vendor_and_cache_but_keeps_lockfile(project: Project) {
    project.seed_cache(&archive());
    std::fs::create_dir_all(project.destination().join("src")).expect("create dest");
    project.pin(&"a".repeat(64));
    let mut out = Vec::new();

    clean(project.layout(), RunOptions::default(), &mut out).expect("clean");

    assert!(!project.layout().vendor_dir.exists());
    assert!(!project.layout().cache_dir.exists());
    assert!(project.layout().lockfile.exists());
    assert_eq!(output_text(out), "Cleaning thirdparty and cache...\nDone.\n");
}

#[rstest]
fn clean_without_directories_succeeds(project: Project) {
    let options = RunOptions {
        force: false,
        quiet: true,
    };
    assert!(clean(project.layout(), options, &mut Vec::new()).is_ok());
}

#[rstest]
fn packages_are_processed_in_declaration_order(project: Project) {
    let mut config = project.config.clone();
    config.packages.push(PackageSpec::new(
        "bar",
        "1.1",
        "https://example.test/bar-{ver}.tar.gz",
        "bar-{ver}.tar.gz",
    ));
    let downloader = StubDownloader::new()
        .with_response(FOO_URL, archive())
        .with_response("https://example.test/bar-1.1.tar.gz", archive());
    let mut extractor = MockExtractor::new();
    extractor
        .expect_extract()
        .times(2)
        .returning(|_| Ok(extracted()));

    let summary = run_bootstrap_with(
        &config,
        RunOptions::default(),
        &downloader,
        &extractor,
        &mut Vec::new(),
    )
    .expect("run");

    let keys: Vec<&str> = summary.packages.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["foo@2.0", "bar@1.1"]);
    assert_eq!(
        downloader.calls(),
        vec![
            FOO_URL.to_owned(),
            "https://example.test/bar-1.1.tar.gz".to_owned()
        ]
    );
    assert_eq!(project.lock().len(), 2);
}
