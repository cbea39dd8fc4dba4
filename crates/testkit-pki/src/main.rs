// crates/testkit-pki/src/main.rs
// ============================================================================
// Module: certgen Entry Point
// Description: Command-line wrapper around the fixture set generator.
// Purpose: Regenerate the TLS fixture set under a base directory.
// Dependencies: clap, testkit-pki, thiserror
// ============================================================================

//! ## Overview
//! `certgen <BASE_DIR>` writes the complete fixture set under
//! `<BASE_DIR>/certs`. The directory layout must already exist unless
//! `--create-dirs` is given. Every written file is listed on stdout; any
//! failure is reported as one line on stderr with a failing exit code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use testkit_pki::FixtureKind;
use testkit_pki::FixtureLayout;
use testkit_pki::FixtureManifest;
use testkit_pki::RootPlacement;
use testkit_pki::ValidityAnchors;
use testkit_pki::generate_fixture_set;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "certgen", about = "Generate TLS certificate chain fixtures")]
struct Cli {
    /// Directory under which `certs/` is written.
    #[arg(value_name = "BASE_DIR")]
    base_dir: PathBuf,
    /// Create the fixture directory layout before writing.
    #[arg(long)]
    create_dirs: bool,
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

/// Generates the fixture set described by the command line.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let layout = FixtureLayout::new(&cli.base_dir);
    if cli.create_dirs {
        layout.prepare().map_err(|err| CliError::new(err.to_string()))?;
    }

    let manifest = generate_fixture_set(&layout, &ValidityAnchors::now())
        .map_err(|err| CliError::new(format!("fixture generation failed: {err}")))?;
    report(&manifest)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Lists written files followed by a one-line summary.
fn report(manifest: &FixtureManifest) -> CliResult<()> {
    for file in &manifest.files {
        write_stdout_line(&format!("wrote {:<24} {}", kind_label(file.kind), file.path.display()))
            .map_err(|err| CliError::new(output_error(&err)))?;
    }
    let roots = manifest.paths_of(FixtureKind::RootKey).count();
    let leaves = manifest.paths_of(FixtureKind::ServerCertificate).count();
    let clients = manifest.paths_of(FixtureKind::ClientCertificate).count();
    write_stdout_line(&format!(
        "generated {roots} roots, {leaves} server certificates and {clients} client identities"
    ))
    .map_err(|err| CliError::new(output_error(&err)))
}

/// Short label of a fixture kind.
const fn kind_label(kind: FixtureKind) -> &'static str {
    match kind {
        FixtureKind::RootKey => "root key",
        FixtureKind::RootCertificate(placement) => match placement {
            RootPlacement::Trusted => "trusted root",
            RootPlacement::Custom => "custom root",
            RootPlacement::Untrusted => "untrusted root",
        },
        FixtureKind::ServerKey => "server key",
        FixtureKind::ServerCertificate => "server certificate",
        FixtureKind::ClientKey => "client key",
        FixtureKind::EncryptedClientKey => "encrypted client key",
        FixtureKind::ClientCertificate => "client certificate",
        FixtureKind::TrustedClientCertificate => "server-trusted client",
    }
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output stream failure.
fn output_error(error: &std::io::Error) -> String {
    format!("failed to write to stdout: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
