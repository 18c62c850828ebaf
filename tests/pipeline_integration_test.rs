use chunk_etl::config::toml_config::TomlConfig;
use chunk_etl::core::combine::combine_chunks;
use chunk_etl::domain::model::{Rule, Severity};
use chunk_etl::domain::ports::MemorySink;
use chunk_etl::{split, CleaningEngine, ResultAggregator};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const HEADER: &str = "login_id,mail_address,created_at";

fn default_rules() -> Vec<Rule> {
    vec![
        Rule::ValidateEmail {
            column: "mail_address".to_string(),
        },
        Rule::TruncateDates {
            columns: vec!["created_at".to_string()],
            unparseable: String::new(),
        },
    ]
}

/// Every third row has a broken email address.
fn write_source(dir: &Path, rows: usize) -> PathBuf {
    let path = dir.join("source.csv");
    let mut content = format!("{HEADER}\n");
    for i in 1..=rows {
        let mail = if i % 3 == 0 {
            format!("user{i}.example.com")
        } else {
            format!("user{i}@example.com")
        };
        content.push_str(&format!("user{i},{mail},2014-01-{:02} 08:30:00\n", (i % 28) + 1));
    }
    fs::write(&path, content).unwrap();
    path
}

fn data_lines(path: &Path) -> usize {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .filter(|l| !l.is_empty())
        .count()
}

#[tokio::test]
async fn test_split_then_clean_conserves_records() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), 25);
    let chunks = dir.path().join("chunks");
    let created = split(&source, 4, &chunks, b',').unwrap();
    assert_eq!(created.len(), 7);

    let valid = dir.path().join("clean.csv");
    let errors = dir.path().join("garbage.csv");
    let report = ResultAggregator::new(default_rules(), b',')
        .with_workers(3)
        .run(&chunks, &valid, &errors)
        .await
        .unwrap();

    assert_eq!(report.files_processed, 7);
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.total_errors, 8);
    assert_eq!(report.total_valid + report.total_errors, 25);
    assert_eq!(data_lines(&valid), report.total_valid);
    assert_eq!(data_lines(&errors), report.total_errors);

    let merged = fs::read_to_string(&valid).unwrap();
    assert!(merged.starts_with(&format!("{HEADER}\n")));
    assert!(merged.contains("user1,user1@example.com,2014-01-02\n"));
    let first_error = fs::read_to_string(&errors).unwrap();
    assert!(first_error.starts_with(&format!("{HEADER},reason\nuser3,")));
}

#[tokio::test]
async fn test_corrupted_chunk_does_not_stop_siblings() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), 9);
    let chunks = dir.path().join("chunks");
    split(&source, 3, &chunks, b',').unwrap();
    fs::write(
        chunks.join("chunk_2.csv"),
        format!("{HEADER}\nx,x@example.com,2014-01-01\ny,broken\n"),
    )
    .unwrap();

    let sink = Arc::new(MemorySink::new());
    let report = ResultAggregator::new(default_rules(), b',')
        .with_sink(sink.clone())
        .run(&chunks, &dir.path().join("clean.csv"), &dir.path().join("errors.csv"))
        .await
        .unwrap();

    assert_eq!(report.files_processed, 3);
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.failed_files[0].path, chunks.join("chunk_2.csv"));
    assert_eq!(report.records_lost, 2);
    assert_eq!(report.total_valid + report.total_errors, 6);
    assert_eq!(report.total_records(), 8);
    let failed = chunks.join("chunk_2.csv");
    assert!(sink
        .events()
        .iter()
        .any(|e| e.severity == Severity::Error && e.path.as_ref() == Some(&failed)));
}

#[tokio::test]
async fn test_identical_runs_are_byte_identical() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), 40);
    let chunks = dir.path().join("chunks");
    split(&source, 3, &chunks, b',').unwrap();

    let mut outputs = Vec::new();
    for (run, workers) in [(1, 1), (2, 8)] {
        let valid = dir.path().join(format!("clean_{run}.csv"));
        let errors = dir.path().join(format!("errors_{run}.csv"));
        ResultAggregator::new(default_rules(), b',')
            .with_workers(workers)
            .run(&chunks, &valid, &errors)
            .await
            .unwrap();
        outputs.push((fs::read(&valid).unwrap(), fs::read(&errors).unwrap()));
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[tokio::test]
async fn test_engine_runs_from_toml_config() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("lifebear.csv");
    fs::write(
        &source,
        "login_id;mail_address;created_at\n\
         alice;alice@example.com;2014-03-01 09:00:00\n\
         bob;bob-at-example.com;2014-03-02 10:00:00\n\
         alice;alice@example.com;2014-03-03 11:00:00\n\
         carol;carol@example.co.jp;03/04/2014 12:00\n\
         dave;dave@example.com;not a date\n",
    )
    .unwrap();

    let toml = format!(
        r#"
[source]
path = "{root}/lifebear.csv"
delimiter = ";"

[dedupe]
key_columns = ["login_id", "mail_address"]
valid_output = "{root}/valid_data.csv"
duplicates_output = "{root}/duplicates.csv"

[split]
max_rows_per_chunk = 2
chunk_directory = "{root}/chunks"

[output]
valid_path = "{root}/clean.csv"
error_path = "{root}/garbage.csv"

[performance]
workers = 2
"#,
        root = dir.path().display()
    );
    let settings = TomlConfig::from_toml_str(&toml).unwrap().to_settings().unwrap();

    let summary = CleaningEngine::new(settings).run().await.unwrap();

    let dedupe = summary.dedupe.unwrap();
    assert_eq!((dedupe.total, dedupe.unique, dedupe.duplicates), (5, 4, 1));
    assert_eq!(summary.chunks.len(), 2);
    assert_eq!(summary.report.total_valid, 3);
    assert_eq!(summary.report.total_errors, 1);

    assert_eq!(
        fs::read_to_string(dir.path().join("clean.csv")).unwrap(),
        "login_id,mail_address,created_at\n\
         alice,alice@example.com,2014-03-01\n\
         carol,carol@example.co.jp,2014-03-04\n\
         dave,dave@example.com,\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("garbage.csv")).unwrap(),
        "login_id,mail_address,created_at,reason\nbob,bob-at-example.com,2014-03-02 10:00:00,invalid_email\n"
    );
    assert_eq!(data_lines(&dir.path().join("duplicates.csv")), 1);
}

#[tokio::test]
async fn test_folder_mode_then_combine() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), 10);
    let chunks = dir.path().join("chunks");
    split(&source, 4, &chunks, b',').unwrap();

    let valid_dir = dir.path().join("valid");
    let error_dir = dir.path().join("invalid");
    let report = ResultAggregator::new(default_rules(), b',')
        .run_to_folders(&chunks, &valid_dir, &error_dir)
        .await
        .unwrap();
    assert_eq!(report.files_processed, 3);
    assert!(valid_dir.join("chunk_3.csv").exists());
    assert!(error_dir.join("chunk_1.csv").exists());

    let combined = dir.path().join("combined.csv");
    let summary = combine_chunks(&valid_dir, &combined, b',', "csv").unwrap();
    assert_eq!(summary.files_combined, 3);
    assert_eq!(summary.rows, report.total_valid);
    assert_eq!(data_lines(&combined), 7);
}
