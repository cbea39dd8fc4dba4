// crates/testkit-tls-probe/src/main.rs
// ============================================================================
// Module: tlsserver Entry Point
// Description: Command-line wrapper around the one-shot handshake probe.
// Purpose: Serve one TLS client and exit with the preamble verdict.
// Dependencies: clap, testkit-tls-probe, thiserror
// ============================================================================

//! ## Overview
//! `tlsserver` binds, prints one "listening" line once the socket is ready,
//! serves exactly one client and exits 0 when the client's preamble carries
//! the protocol signature. Any failure prints one diagnostic line on stderr
//! and exits 1. Harnesses wait for the first stdout line before connecting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use testkit_tls_probe::DEFAULT_BIND;
use testkit_tls_probe::ProbeConfig;
use testkit_tls_probe::ProbeEvent;
use testkit_tls_probe::ProbeObserver;
use testkit_tls_probe::ProbeServer;
use testkit_tls_probe::TlsVersionRange;
use testkit_tls_probe::config::DEFAULT_MAX_MINOR;
use testkit_tls_probe::config::DEFAULT_MIN_MINOR;
use testkit_tls_probe::events::protocol_label;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "tlsserver", about = "Serve one TLS client and check its protocol preamble")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_BIND)]
    bind: String,
    /// PEM certificate chain to present.
    #[arg(long, value_name = "PATH")]
    cert: PathBuf,
    /// PEM private key of the certificate.
    #[arg(long, value_name = "PATH")]
    key: PathBuf,
    /// Lowest accepted TLS minor version (0 = TLS 1.0 ... 3 = TLS 1.3).
    #[arg(long, alias = "minTls", default_value_t = DEFAULT_MIN_MINOR)]
    min_tls: u8,
    /// Highest accepted TLS minor version (0 = TLS 1.0 ... 3 = TLS 1.3).
    #[arg(long, alias = "maxTls", default_value_t = DEFAULT_MAX_MINOR)]
    max_tls: u8,
    /// Require client certificates chaining to this PEM file.
    #[arg(long, value_name = "PATH")]
    client_cert: Option<PathBuf>,
    /// Budget in milliseconds for the handshake and preamble read.
    #[arg(long, default_value_t = 1_000)]
    deadline_ms: u64,
}

impl Cli {
    /// Converts parsed flags into a validated probe configuration.
    fn into_config(self) -> CliResult<ProbeConfig> {
        let versions = TlsVersionRange::new(self.min_tls, self.max_tls)
            .map_err(|err| CliError::new(err.to_string()))?;
        let mut config = ProbeConfig::new(self.bind, self.cert, self.key)
            .with_versions(versions)
            .with_read_deadline(Duration::from_millis(self.deadline_ms));
        if let Some(path) = self.client_cert {
            config = config.with_client_ca(path);
        }
        config.validate().map_err(|err| CliError::new(err.to_string()))?;
        Ok(config)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for diagnostic messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Binds the probe and serves one client.
fn run() -> CliResult<ExitCode> {
    let config = Cli::parse().into_config()?;
    let server = ProbeServer::bind(&config).map_err(|err| CliError::new(err.to_string()))?;
    server.serve_once(&ConsoleObserver).map_err(|err| CliError::new(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Console Observer
// ============================================================================

/// Prints probe progress to stdout, one line per event.
struct ConsoleObserver;

impl ProbeObserver for ConsoleObserver {
    fn record(&self, event: &ProbeEvent) {
        let line = match event {
            ProbeEvent::Listening {
                addr,
                cert_path,
            } => format!("TLS, listening on {addr} with cert {}", cert_path.display()),
            ProbeEvent::Connected {
                peer,
            } => format!("TLS, client connected from {peer}, waiting for handshake"),
            ProbeEvent::HandshakeComplete {
                peer,
                protocol,
            } => format!("TLS, handshake with {peer} complete using {}", protocol_label(*protocol)),
            ProbeEvent::Verified {
                peer,
            } => format!("Client {peer} connected with correct protocol preamble"),
        };
        let _ = write_stdout_line(&line);
    }
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout and flushes it.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")?;
    stdout.flush()
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
