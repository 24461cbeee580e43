//! The narrow output surface of the samplers.
//!
//! Samplers never format anything themselves: they hand typed scalars to an [`Emitter`]
//! together with the section/subsection they belong to, and the emitter decides how the
//! data leaves the process.

use std::io::Write;

/// A single emitted scalar.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value<'a> {
    U64(u64),
    F64(f64),
    Bool(bool),
    Str(&'a str),
}

/// Sink for sampled metrics.
pub trait Emitter {
    /// Emits `key = value` inside `section`, optionally nested in `subsection`.
    fn emit(&mut self, section: &str, subsection: Option<&str>, key: &str, value: Value<'_>);
}

impl<E: Emitter + ?Sized> Emitter for &mut E {
    fn emit(&mut self, section: &str, subsection: Option<&str>, key: &str, value: Value<'_>) {
        (**self).emit(section, subsection, key, value);
    }
}

#[derive(serde::Serialize)]
struct Record<'a> {
    timestamp: u64,
    section: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subsection: Option<&'a str>,
    key: &'a str,
    value: Value<'a>,
}

/// Writes one JSON object per emitted scalar, newline-delimited.
#[derive(Debug)]
pub struct JsonLinesEmitter<W: Write> {
    writer: W,
    /// Timestamp (in UNIX epoch seconds) stamped onto every record.
    timestamp: u64,
}

impl<W: Write> JsonLinesEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            timestamp: 0,
        }
    }

    /// Sets the timestamp used for all following records.
    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    /// Flushes the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns the writer's I/O error.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Emitter for JsonLinesEmitter<W> {
    fn emit(&mut self, section: &str, subsection: Option<&str>, key: &str, value: Value<'_>) {
        let record = Record {
            timestamp: self.timestamp,
            section,
            subsection,
            key,
            value,
        };
        let result = serde_json::to_writer(&mut self.writer, &record)
            .map_err(std::io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"));
        if let Err(err) = result {
            log::error!("failed to write record {section}/{key}: {err}");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Emitter, Value};

    /// Owned copy of an emitted [`Value`].
    #[derive(Debug, Clone, PartialEq)]
    pub enum Recorded {
        U64(u64),
        F64(f64),
        Bool(bool),
        Str(String),
    }

    /// Collects every emission in order.
    #[derive(Debug, Default)]
    pub struct RecordingEmitter {
        pub records: Vec<(String, Option<String>, String, Recorded)>,
    }

    impl RecordingEmitter {
        pub fn get(&self, section: &str, subsection: Option<&str>, key: &str) -> Option<&Recorded> {
            self.records
                .iter()
                .find(|(s, sub, k, _)| s == section && sub.as_deref() == subsection && k == key)
                .map(|(_, _, _, v)| v)
        }

        pub fn f64(&self, section: &str, subsection: Option<&str>, key: &str) -> f64 {
            match self.get(section, subsection, key) {
                Some(Recorded::F64(v)) => *v,
                other => panic!("expected f64 for {section}/{subsection:?}/{key}, got {other:?}"),
            }
        }

        pub fn u64(&self, section: &str, subsection: Option<&str>, key: &str) -> u64 {
            match self.get(section, subsection, key) {
                Some(Recorded::U64(v)) => *v,
                other => panic!("expected u64 for {section}/{subsection:?}/{key}, got {other:?}"),
            }
        }

        pub fn has_subsection(&self, section: &str, subsection: &str) -> bool {
            self.records
                .iter()
                .any(|(s, sub, _, _)| s == section && sub.as_deref() == Some(subsection))
        }

        pub fn clear(&mut self) {
            self.records.clear();
        }
    }

    impl Emitter for RecordingEmitter {
        fn emit(&mut self, section: &str, subsection: Option<&str>, key: &str, value: Value<'_>) {
            let value = match value {
                Value::U64(v) => Recorded::U64(v),
                Value::F64(v) => Recorded::F64(v),
                Value::Bool(v) => Recorded::Bool(v),
                Value::Str(v) => Recorded::Str(v.to_owned()),
            };
            self.records.push((
                section.to_owned(),
                subsection.map(str::to_owned),
                key.to_owned(),
                value,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_lines_emitter() {
        let mut emitter = JsonLinesEmitter::new(Vec::new());
        emitter.set_timestamp(1700000000);
        emitter.emit("cgroup_cpuacct_stats", Some("cpu0"), "user", Value::F64(0.5));
        emitter.emit("cgroup_config", None, "cpus", Value::Str("0,1"));

        let out = String::from_utf8(emitter.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["timestamp"], 1700000000);
        assert_eq!(lines[0]["section"], "cgroup_cpuacct_stats");
        assert_eq!(lines[0]["subsection"], "cpu0");
        assert_eq!(lines[0]["key"], "user");
        assert_eq!(lines[0]["value"], 0.5);
        assert!(lines[1].get("subsection").is_none());
        assert_eq!(lines[1]["value"], "0,1");
    }

    #[test]
    fn test_emit_through_mutable_reference() {
        fn emit_flag(mut out: impl Emitter) {
            out.emit("section", None, "key", Value::Bool(true));
        }

        let mut recorder = testing::RecordingEmitter::default();
        emit_flag(&mut recorder);
        assert_eq!(
            recorder.get("section", None, "key"),
            Some(&testing::Recorded::Bool(true))
        );
    }
}
