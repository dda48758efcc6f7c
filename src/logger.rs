use std::io::{self, Write};
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::process;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::constants::{FILE_DEV_LOG, SYSLOG_TAG};

const FACILITY_DAEMON: u8 = 3;

/// A destination for formatted log records.
pub trait Sink: Send + Sync {
    fn write(&self, level: Level, message: &str);
    fn flush(&self) {}
}

pub struct ConsoleSink;

impl Sink for ConsoleSink {
    fn write(&self, level: Level, message: &str) {
        let _ = writeln!(io::stdout(), "[{}] {}", level, message);
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

/// RFC 3164 datagrams to the local syslog socket.
pub struct SyslogSink {
    socket: UnixDatagram,
    hostname: String,
    tag: String,
    pid: u32,
}

impl SyslogSink {
    pub fn connect<P: AsRef<Path>>(path: P, tag: &str) -> io::Result<Self> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        let hostname = rustix::system::uname()
            .nodename()
            .to_string_lossy()
            .into_owned();
        Ok(Self {
            socket,
            hostname,
            tag: tag.to_string(),
            pid: process::id(),
        })
    }

    fn format(&self, level: Level, message: &str, now: DateTime<Utc>) -> String {
        format!(
            "<{}>{} {} {}[{}]: {}",
            priority(FACILITY_DAEMON, level),
            now.format("%b %e %H:%M:%S"),
            self.hostname,
            self.tag,
            self.pid,
            message
        )
    }
}

impl Sink for SyslogSink {
    fn write(&self, level: Level, message: &str) {
        let now: DateTime<Utc> = SystemTime::now().into();
        let _ = self.socket.send(self.format(level, message, now).as_bytes());
    }
}

fn severity(level: Level) -> u8 {
    match level {
        Level::Error => 3,
        Level::Warn => 4,
        Level::Info => 6,
        Level::Debug | Level::Trace => 7,
    }
}

fn priority(facility: u8, level: Level) -> u8 {
    facility * 8 + severity(level)
}

struct MultiLogger {
    level: LevelFilter,
    sinks: Vec<Box<dyn Sink>>,
}

impl Log for MultiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let message = record.args().to_string();
            for sink in &self.sinks {
                sink.write(record.level(), &message);
            }
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

pub fn init_logger_with_sinks(
    level: Level,
    sinks: Vec<Box<dyn Sink>>,
) -> Result<(), log::SetLoggerError> {
    let level = level.to_level_filter();
    log::set_boxed_logger(Box::new(MultiLogger { level, sinks }))?;
    log::set_max_level(level);
    Ok(())
}

/// Log to stdout and to syslog with the daemon facility. Falls back to stdout
/// only when the syslog socket is unavailable.
pub fn init_logger(level: Level) -> Result<(), log::SetLoggerError> {
    let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(ConsoleSink)];
    let syslog_error = match SyslogSink::connect(FILE_DEV_LOG, SYSLOG_TAG) {
        Ok(sink) => {
            sinks.push(Box::new(sink));
            None
        }
        Err(e) => Some(e),
    };
    init_logger_with_sinks(level, sinks)?;
    if let Some(e) = syslog_error {
        log::warn!("Unable to connect to {}, logging to console only: {}", FILE_DEV_LOG, e);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_priority() {
        assert_eq!(priority(FACILITY_DAEMON, Level::Error), 27);
        assert_eq!(priority(FACILITY_DAEMON, Level::Warn), 28);
        assert_eq!(priority(FACILITY_DAEMON, Level::Info), 30);
        assert_eq!(priority(FACILITY_DAEMON, Level::Debug), 31);
    }

    #[test]
    fn test_syslog_format() {
        let dir = std::env::temp_dir().join(format!("ec2-netconf-log-{}", process::id()));
        let _ = std::fs::remove_file(&dir);
        let server = UnixDatagram::bind(&dir).unwrap();
        let mut sink = SyslogSink::connect(&dir, "ec2-netconf").unwrap();
        sink.hostname = "ip-10-0-5-37".to_string();
        sink.pid = 42;

        let now = Utc.with_ymd_and_hms(2026, 3, 7, 9, 4, 5).unwrap();
        assert_eq!(
            sink.format(Level::Info, "Configuring eth1", now),
            "<30>Mar  7 09:04:05 ip-10-0-5-37 ec2-netconf[42]: Configuring eth1"
        );

        sink.write(Level::Error, "interface count mismatch");
        let mut buf = [0u8; 256];
        let n = server.recv(&mut buf).unwrap();
        let received = String::from_utf8_lossy(&buf[..n]);
        assert!(received.starts_with("<27>"));
        assert!(received.ends_with("ec2-netconf[42]: interface count mismatch"));
        let _ = std::fs::remove_file(&dir);
    }
}
