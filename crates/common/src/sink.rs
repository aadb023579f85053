//! Sink fan-out
//!
//! Every completed buffer is written to each configured sink, in full and in
//! arrival order, before the next buffer is handled. Diagnostics go through
//! tracing on stderr, never through the data sinks, so verbose counters and
//! piped stdout output can coexist.

use crate::error::{CaptureError, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{info, warn};

/// Which sinks a run writes to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkConfig {
    /// Write captured bytes to this file (created, truncating).
    pub file: Option<PathBuf>,
    /// Write captured bytes to the process's standard output.
    pub stdout: bool,
    /// Log per-chunk byte counts and the handshake to the diagnostic stream.
    pub verbose: bool,
}

impl SinkConfig {
    /// Apply the no-output fallback: with neither file nor stdout requested
    /// the run would produce nothing visible, so verbose counters are
    /// switched on.
    pub fn with_fallback(mut self) -> Self {
        if self.file.is_none() && !self.stdout && !self.verbose {
            warn!("no output configured, enabling verbose counters");
            self.verbose = true;
        }
        self
    }
}

/// Open sinks plus running totals.
pub struct SinkSet {
    file: Option<File>,
    stdout: bool,
    verbose: bool,
    chunks: u64,
    bytes: u64,
}

impl SinkSet {
    /// Open every configured sink. A file that cannot be created is fatal
    /// before any streaming starts, so no partial pipeline is left running.
    pub fn open(config: &SinkConfig) -> Result<Self> {
        let file = match &config.file {
            Some(path) => {
                let file = File::create(path).map_err(|source| CaptureError::FileOpen {
                    path: path.clone(),
                    source,
                })?;
                Some(file)
            }
            None => None,
        };

        Ok(Self {
            file,
            stdout: config.stdout,
            verbose: config.verbose,
            chunks: 0,
            bytes: 0,
        })
    }

    /// Write one buffer to every sink: stdout first, then the file, then the
    /// verbose counter. Buffers are never altered, truncated, or merged.
    pub fn dispatch(&mut self, buffer: &[u8]) -> Result<()> {
        if self.stdout {
            let mut out = io::stdout().lock();
            out.write_all(buffer)
                .and_then(|_| out.flush())
                .map_err(|source| CaptureError::SinkWrite {
                    sink: "stdout",
                    source,
                })?;
        }

        if let Some(file) = &mut self.file {
            file.write_all(buffer)
                .map_err(|source| CaptureError::SinkWrite {
                    sink: "file",
                    source,
                })?;
        }

        self.chunks += 1;
        self.bytes += buffer.len() as u64;

        if self.verbose {
            info!("received {} bytes", buffer.len());
        }

        Ok(())
    }

    /// Verbose note that the wake sequence went out.
    pub fn note_handshake(&self) {
        if self.verbose {
            info!("wake sequence sent");
        }
    }

    /// Total bytes delivered so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Total buffers delivered so far.
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Flush and close the file sink. Runs after the device side has shut
    /// down; a failure here still counts against the exit code.
    pub fn finish(mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all().map_err(|source| CaptureError::SinkWrite {
                sink: "file",
                source,
            })?;
        }

        if self.verbose {
            info!("capture finished: {} bytes in {} chunks", self.bytes, self.chunks);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_enables_verbose() {
        let config = SinkConfig::default().with_fallback();
        assert!(config.verbose);
    }

    #[test]
    fn test_fallback_leaves_explicit_sinks_alone() {
        let config = SinkConfig {
            stdout: true,
            ..Default::default()
        }
        .with_fallback();
        assert!(!config.verbose);
    }

    #[test]
    fn test_counters_track_dispatches() {
        let mut sinks = SinkSet::open(&SinkConfig {
            verbose: true,
            ..Default::default()
        })
        .unwrap();

        sinks.dispatch(&[0u8; 512]).unwrap();
        sinks.dispatch(&[0u8; 300]).unwrap();
        sinks.dispatch(&[]).unwrap();

        assert_eq!(sinks.chunks(), 3);
        assert_eq!(sinks.bytes(), 812);
    }
}
