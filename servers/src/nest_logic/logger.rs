use anyhow::Result;
use chrono::Local;
use lib_nest::LogRecord;
use log::kv::Key;
use std::fs;
use std::path::{Path, PathBuf};

const LOG_FILE_PREFIX: &str = "server_nest_";

/// Installs the global logger: human readable lines on stdout and JSON lines
/// (the format the log page reads back) in a fresh file under `log_dir`.
/// Returns the path of that file.
pub fn setup_logging(log_dir: &Path, log_level: &str) -> Result<PathBuf> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    // Clean up old log files, keeping only the most recent one
    cleanup_old_logs(log_dir)?;

    let log_file_name = format!("{}{}.log", LOG_FILE_PREFIX, Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = log_dir.join(log_file_name);

    let console = fern::Dispatch::new()
        .format(|out, message, record| {
            let param = param_of(record);
            out.finish(format_args!(
                "{}[{}][{}] {}{}",
                Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message,
                if param.is_empty() { String::new() } else { format!(" ({})", param) }
            ))
        })
        .chain(std::io::stdout());

    let json_file = fern::Dispatch::new()
        .format(|out, _message, record| {
            let line = to_log_record(record, Local::now().to_rfc3339())
                .to_json_line()
                .unwrap_or_else(|e| format!(r#"{{"msg":"unserializable log record: {}"}}"#, e));
            out.finish(format_args!("{}", line))
        })
        .chain(fern::log_file(&log_path)?);

    fern::Dispatch::new()
        .level(parse_level(log_level))
        .chain(console)
        .chain(json_file)
        .apply()?;

    Ok(log_path)
}

fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" | "warning" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

fn param_of(record: &log::Record<'_>) -> String {
    record
        .key_values()
        .get(Key::from_str("param"))
        .map(|value| value.to_string())
        .unwrap_or_default()
}

/// Maps one `log` event to the JSON line layout.
pub fn to_log_record(record: &log::Record<'_>, time: String) -> LogRecord {
    LogRecord::new(
        time,
        record.level().as_str().to_lowercase(),
        record.module_path().unwrap_or(record.target()),
        record.args().to_string(),
        param_of(record),
    )
}

fn cleanup_old_logs(log_dir: &Path) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| {
            let path = e.path();
            path.extension().is_some_and(|ext| ext == "log")
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX))
        })
        .filter_map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, e.path()))
        })
        .collect();

    // Sort by modification time, newest first
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    // Keep the most recent one (index 0), delete the rest
    for (_, path) in entries.iter().skip(1) {
        if let Err(e) = fs::remove_file(path) {
            eprintln!("Failed to delete old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_record_maps_to_json_line_fields() {
        let kvs: &[(&str, &str)] = &[("param", "ws://localhost:8080/refreshdata")];
        let record = to_log_record(
            &log::Record::builder()
                .args(format_args!("Client {} attached", 3))
                .level(log::Level::Warn)
                .target("server_nest")
                .module_path(Some("server_nest::nest_logic::downstream"))
                .key_values(&kvs)
                .build(),
            "2024-01-15T10:00:00+01:00".to_string(),
        );

        assert_eq!(record.time, "2024-01-15T10:00:00+01:00");
        assert_eq!(record.level, "warn");
        assert_eq!(record.msg, "Client 3 attached");
        assert_eq!(record.param, "ws://localhost:8080/refreshdata");
        assert_eq!(record.fct, "server_nest::nest_logic::downstream");

        let line = record.to_json_line().unwrap();
        assert_eq!(LogRecord::from_json_line(&line).unwrap(), record);
    }

    #[test]
    fn test_record_without_param() {
        let record = to_log_record(
            &log::Record::builder()
                .args(format_args!("started"))
                .level(log::Level::Info)
                .target("server_nest")
                .build(),
            String::new(),
        );
        assert_eq!(record.param, "");
        assert_eq!(record.fct, "server_nest");
    }

    #[test]
    fn test_cleanup_keeps_newest_log_only() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        for (i, age) in [30u64, 10, 20].iter().enumerate() {
            let file = File::create(dir.path().join(format!("{}{}.log", LOG_FILE_PREFIX, i))).unwrap();
            file.set_modified(now - Duration::from_secs(*age)).unwrap();
        }
        fs::write(dir.path().join("unrelated.log"), "keep me").unwrap();

        cleanup_old_logs(dir.path()).unwrap();

        let mut remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec![format!("{}1.log", LOG_FILE_PREFIX), "unrelated.log".to_string()]);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), log::LevelFilter::Debug);
        assert_eq!(parse_level("warning"), log::LevelFilter::Warn);
        assert_eq!(parse_level("bogus"), log::LevelFilter::Info);
    }
}
