use std::io::Write;
use std::sync::Arc;

use extraction_checker::bootstrap::CheckerContext;
use extraction_checker::checker::{AssemblyMode, CheckLoop, WorkerDiscriminator};
use extraction_checker::config::ConfigManager;

fn write_toml(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const CONFIG: &str = r#"
[checker]
featurizer_type = "sbpycaffeimg"
detector_type = "full"
input_type = "image"
max_delay_seconds = 600
read_timeout_ms = 50

[store.layout]
item_table = "escorts_images_sha1_infos"

[stream]
consumer_queue = "images_ready"
updates_out_topic = "updates_out"
"#;

#[test]
fn test_environment_overrides_file_values() {
    let file = write_toml(CONFIG);
    std::env::set_var("EXTRBOOTTEST__CHECKER__BATCH_UPDATE_SIZE", "25");

    let manager = ConfigManager::load(file.path(), "EXTRBOOTTEST").unwrap();
    std::env::remove_var("EXTRBOOTTEST__CHECKER__BATCH_UPDATE_SIZE");

    let settings = &manager.config().checker;
    assert_eq!(settings.batch_update_size, 25);
    assert_eq!(settings.max_delay_seconds, 600);
    assert_eq!(settings.status_interval().as_secs(), 10);
    assert_eq!(manager.env_prefix(), "EXTRBOOTTEST");
}

#[tokio::test(start_paused = true)]
async fn test_loaded_config_bootstraps_a_working_loop() {
    let file = write_toml(CONFIG);
    let manager = ConfigManager::load(file.path(), "EXTRBOOTTESTB").unwrap();

    let context = CheckerContext::connect(Arc::new(manager.config().clone()))
        .await
        .unwrap();
    assert_eq!(context.store.backend_name(), "memory");
    assert_eq!(context.source.source_name(), "images_ready");
    assert_eq!(
        context.announcer.as_ref().map(|a| a.topic.as_str()),
        Some("updates_out")
    );

    let mut check_loop = CheckLoop::new(
        &context,
        WorkerDiscriminator::for_process(None),
        AssemblyMode::Single,
    );
    assert!(check_loop
        .worker_name()
        .starts_with("ExtractionCheckersbpycaffeimg-feat-full-image.ec"));

    let report = tokio_test::assert_ok!(check_loop.run_cycle().await);
    assert_eq!(report.gathered, 0);
    assert!(report.committed.is_none());
}
