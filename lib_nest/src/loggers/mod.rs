/// Defines the data structure of one JSON log line.
pub mod logrecord;
/// Reads a JSON-lines log file back into log records.
pub mod logreader;
