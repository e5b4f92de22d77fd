use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn chat_archive(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("chat-archive").unwrap();
    cmd.env("CHAT_ARCHIVE_DATA_DIR", data_dir.path())
        .env("RUST_LOG", "warn");
    cmd
}

fn init(data_dir: &TempDir) {
    chat_archive(data_dir)
        .args(["init", "--given-name", "Sam", "--e164", "+15550000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized chat-archive"));
}

#[test]
fn test_status_before_init() {
    let data_dir = TempDir::new().unwrap();
    chat_archive(&data_dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not initialized"));
}

#[test]
fn test_init_is_idempotent() {
    let data_dir = TempDir::new().unwrap();
    init(&data_dir);
    chat_archive(&data_dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Already initialized"));

    chat_archive(&data_dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup key:       present"))
        .stdout(predicate::str::contains("Recipients:       1"));
}

#[test]
fn test_export_requires_init() {
    let data_dir = TempDir::new().unwrap();
    let output = data_dir.path().join("out.bin");
    chat_archive(&data_dir)
        .arg("export")
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("chat-archive init"));
}

#[test]
fn test_export_validate_import() {
    let data_dir = TempDir::new().unwrap();
    init(&data_dir);
    let archive = data_dir.path().join("archive.bin");

    chat_archive(&data_dir)
        .arg("export")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("Recipients:             1"));

    chat_archive(&data_dir)
        .arg("validate")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));

    chat_archive(&data_dir)
        .arg("import")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));

    chat_archive(&data_dir)
        .args(["import", "--force"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("Import complete"));
}

#[test]
fn test_plaintext_export_round_trip() {
    let data_dir = TempDir::new().unwrap();
    init(&data_dir);
    let archive = data_dir.path().join("debug.bin");

    chat_archive(&data_dir)
        .args(["export", "--plaintext"])
        .arg(&archive)
        .assert()
        .success();

    chat_archive(&data_dir)
        .args(["validate", "--plaintext"])
        .arg(&archive)
        .assert()
        .success();

    chat_archive(&data_dir)
        .arg("validate")
        .arg(&archive)
        .assert()
        .failure();
}

#[test]
fn test_validate_rejects_garbage() {
    let data_dir = TempDir::new().unwrap();
    init(&data_dir);
    let archive = data_dir.path().join("garbage.bin");
    std::fs::write(&archive, vec![0x42; 512]).unwrap();

    chat_archive(&data_dir)
        .arg("validate")
        .arg(&archive)
        .assert()
        .failure();
}

#[test]
fn test_backup_create_list_restore() {
    let data_dir = TempDir::new().unwrap();
    init(&data_dir);

    chat_archive(&data_dir)
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups found"));

    chat_archive(&data_dir)
        .args(["backup", "create"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup created: backup-"));

    chat_archive(&data_dir)
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 1 backup(s)"));

    chat_archive(&data_dir)
        .args(["backup", "restore", "latest", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restore complete"));

    chat_archive(&data_dir)
        .args(["backup", "restore", "backup-19990101-000000-000"])
        .assert()
        .failure();
}

#[test]
fn test_backup_prune_respects_keep_count() {
    let data_dir = TempDir::new().unwrap();
    init(&data_dir);
    std::fs::write(
        data_dir.path().join("config.json"),
        r#"{"backup_retention":{"keep_count":1}}"#,
    )
    .unwrap();

    for _ in 0..3 {
        chat_archive(&data_dir)
            .args(["backup", "create"])
            .assert()
            .success();
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    chat_archive(&data_dir)
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 1 backup(s)"));

    chat_archive(&data_dir)
        .args(["backup", "prune"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to prune"));
}
