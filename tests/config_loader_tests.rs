use pds_sync::config::ConfigLoader;
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const TEST_KEY: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        for key in [
            "PDS_SYNC_PROFILE",
            "PDS_SYNC_API_BIND_ADDR",
            "PDS_SYNC_LOG_LEVEL",
            "PDS_SYNC_CRYPTO_KEY",
            "PDS_SYNC_PAGE_DELAY_MS",
            "PDS_SYNC_MAX_RUN_SECONDS",
            "PDS_SYNC_EMBEDDING_API_KEY",
            "PDS_SYNC_METADATA_POLL_ATTEMPTS",
        ] {
            env::remove_var(key);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();
    unsafe {
        env::set_var("PDS_SYNC_CRYPTO_KEY", TEST_KEY);
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.sync.page_delay_ms, 1000);
    assert_eq!(cfg.sync.max_run_seconds, None);
    assert_eq!(cfg.metadata.attempts, 30);
    assert_eq!(cfg.crypto_key.as_ref().map(Vec::len), Some(32));
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "PDS_SYNC_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "PDS_SYNC_API_BIND_ADDR=192.168.0.10:5000\nPDS_SYNC_PAGE_DELAY_MS=250\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "PDS_SYNC_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        &format!(
            "PDS_SYNC_PROFILE=test\nPDS_SYNC_API_BIND_ADDR=127.0.0.1:4000\nPDS_SYNC_CRYPTO_KEY={TEST_KEY}\n"
        ),
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.sync.page_delay_ms, 250);
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "PDS_SYNC_API_BIND_ADDR=127.0.0.1:3000\nPDS_SYNC_MAX_RUN_SECONDS=60\n",
    );

    unsafe {
        env::set_var("PDS_SYNC_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("PDS_SYNC_MAX_RUN_SECONDS", "900");
        env::set_var("PDS_SYNC_CRYPTO_KEY", TEST_KEY);
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.sync.max_run_seconds, Some(900));

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("PDS_SYNC_API_BIND_ADDR", "not-an-addr");
        env::set_var("PDS_SYNC_CRYPTO_KEY", TEST_KEY);
    }
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn non_numeric_setting_names_the_variable() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("PDS_SYNC_PAGE_DELAY_MS", "soon");
        env::set_var("PDS_SYNC_CRYPTO_KEY", TEST_KEY);
    }
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("non-numeric delay should fail");
    assert!(err.to_string().contains("PDS_SYNC_PAGE_DELAY_MS"));

    clear_env();
}

#[test]
fn production_requires_embedding_key() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("PDS_SYNC_PROFILE", "production");
        env::set_var("PDS_SYNC_CRYPTO_KEY", TEST_KEY);
    }
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    assert!(loader.load().is_err());

    unsafe {
        env::set_var("PDS_SYNC_EMBEDDING_API_KEY", "sk-test");
    }
    assert!(loader.load().is_ok());

    clear_env();
}
