use chunk_etl::config::cli::{Cli, Command};
use chunk_etl::core::combine::combine_chunks;
use chunk_etl::utils::error::{CleanError, ErrorSeverity};
use chunk_etl::utils::logger;
use chunk_etl::{CleanSettings, CleaningEngine};
use clap::Parser;
use serde::Serialize;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("🚀 Starting chunk-etl");
    if cli.verbose {
        tracing::debug!("CLI args: {:?}", cli);
    }

    // 載入並驗證配置
    let (settings, monitor_enabled) = match cli.settings() {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    match execute(&cli, settings, monitor_enabled).await {
        Ok(()) => {
            println!("✅ chunk-etl finished");
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
            Ok(())
        }
    }
}

async fn execute(
    cli: &Cli,
    settings: CleanSettings,
    monitor_enabled: bool,
) -> Result<(), CleanError> {
    let engine = CleaningEngine::new_with_monitoring(settings, monitor_enabled);

    match &cli.command {
        Command::Dedupe(_) => {
            let summary = engine
                .dedupe()
                .await?
                .ok_or_else(|| CleanError::MissingConfigError {
                    field: "dedupe.key_columns".to_string(),
                })?;
            println!(
                "🧹 {} rows read, {} unique, {} duplicates",
                summary.total, summary.unique, summary.duplicates
            );
            write_report(cli.report.as_deref(), &summary)?;
        }
        Command::Split(_) => {
            let config = engine.config();
            let source = config
                .source_file
                .clone()
                .ok_or_else(|| CleanError::MissingConfigError {
                    field: "source.path".to_string(),
                })?;
            let chunks = engine.split(source, config.source_delimiter).await?;
            println!(
                "✂️ {} chunks written to {}",
                chunks.len(),
                config.chunk_directory.display()
            );
            write_report(cli.report.as_deref(), &chunks)?;
        }
        Command::Clean(_) | Command::CleanToFolders(_) => {
            let report = engine.clean().await?;
            println!("📊 {}", report.summary());
            write_report(cli.report.as_deref(), &report)?;
        }
        Command::Combine(args) => {
            let config = engine.config();
            let summary = combine_chunks(
                &args.input_dir,
                &args.output,
                config.delimiter,
                &config.chunk_extension,
            )?;
            println!(
                "🔗 {} chunks ({} rows) combined into {}, {} skipped",
                summary.files_combined,
                summary.rows,
                args.output.display(),
                summary.files_skipped.len()
            );
            write_report(cli.report.as_deref(), &summary)?;
        }
        Command::Run(_) => {
            let summary = engine.run().await?;
            println!("📊 {}", summary.report.summary());
            write_report(cli.report.as_deref(), &summary)?;
        }
    }

    Ok(())
}

fn write_report<T: Serialize>(path: Option<&Path>, value: &T) -> Result<(), CleanError> {
    let Some(path) = path else {
        return Ok(());
    };
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|source| CleanError::OutputWrite {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("📝 Report written to {}", path.display());
    Ok(())
}
