use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stream_mapper_core::{ConfigError, DiagnosticRecorder, DiagnosticReport, MappingConfig, UiEvent};
use stream_mapper_harness::{EndpointClient, EndpointConfig, EventPump, HarnessError, extract_field};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write output: {0}")]
    Write(#[from] std::io::Error),
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{}: {source}", path.display())]
    Mapping {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error(transparent)]
    Harness(#[from] HarnessError),
}

impl CliError {
    /// Exit status: 2 when a one-shot path found nothing, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Harness(HarnessError::NotFound { .. }) => 2,
            _ => 1,
        }
    }
}

/// Feed a captured response body through a mapping config.
#[derive(Debug, clap::Args)]
pub struct ReplayArgs {
    /// Mapping config JSON.
    #[arg(long)]
    pub config: PathBuf,
    /// Captured response body.
    #[arg(long)]
    pub input: PathBuf,
    /// Split the capture into chunks of this many bytes.
    #[arg(long)]
    pub chunk_size: Option<NonZeroUsize>,
    /// Print the diagnostic report to stderr.
    #[arg(long)]
    pub report: bool,
}

/// Send the configured request and print events as they arrive.
#[derive(Debug, clap::Args)]
pub struct ProbeArgs {
    /// Endpoint config JSON (url, method, headers, body, timeoutMs).
    #[arg(long)]
    pub endpoint: PathBuf,
    /// Mapping config JSON.
    #[arg(long)]
    pub config: PathBuf,
    /// Print the diagnostic report to stderr.
    #[arg(long)]
    pub report: bool,
}

/// Extract one field from a complete JSON body.
#[derive(Debug, clap::Args)]
pub struct ExtractArgs {
    /// JSON body file.
    #[arg(long)]
    pub input: PathBuf,
    /// Path expression, e.g. `choices[0].message.content`.
    #[arg(long)]
    pub path: String,
}

fn read(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn load_mapping(path: &Path) -> Result<Arc<MappingConfig>, CliError> {
    let raw = read(path)?;
    MappingConfig::from_json_slice(&raw)
        .map(Arc::new)
        .map_err(|source| CliError::Mapping {
            path: path.to_path_buf(),
            source,
        })
}

fn write_event<W: Write + ?Sized>(out: &mut W, event: &UiEvent) -> Result<(), CliError> {
    serde_json::to_writer(&mut *out, event)?;
    writeln!(out)?;
    Ok(())
}

fn write_report<W: Write + ?Sized>(err: &mut W, report: &DiagnosticReport) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *err, report)?;
    writeln!(err)?;
    Ok(())
}

pub fn replay<O, E>(args: &ReplayArgs, out: &mut O, err: &mut E) -> Result<(), CliError>
where
    O: Write + ?Sized,
    E: Write + ?Sized,
{
    let config = load_mapping(&args.config)?;
    let body = read(&args.input)?;
    let chunk_size = args
        .chunk_size
        .map_or(body.len().max(1), NonZeroUsize::get);

    let mut recorder = DiagnosticRecorder::from_config(config);
    for chunk in body.chunks(chunk_size) {
        for event in recorder.process(chunk) {
            write_event(out, &event.event)?;
        }
    }
    for event in recorder.close() {
        write_event(out, &event.event)?;
    }

    let report = recorder.into_report();
    info!(
        event = "cli.replay_completed",
        domain = "cli",
        total_frames = report.stats.total_frames,
        unmapped = report.stats.unmapped,
        resolver_errors = report.stats.resolver_errors
    );
    if args.report {
        write_report(err, &report)?;
    }
    Ok(())
}

pub async fn probe<O, E>(args: &ProbeArgs, out: &mut O, err: &mut E) -> Result<(), CliError>
where
    O: Write + ?Sized,
    E: Write + ?Sized,
{
    let mapping = load_mapping(&args.config)?;
    let raw = read(&args.endpoint)?;
    let endpoint = EndpointConfig::from_json_str(&String::from_utf8_lossy(&raw))?;
    let client = EndpointClient::new(endpoint)?;

    let bytes = client.open().await?;
    let mut pump = if args.report {
        EventPump::recording(mapping, bytes)
    } else {
        EventPump::new(mapping, bytes)
    };
    while let Some(event) = pump.next_event().await {
        write_event(out, &event?.event)?;
        out.flush()?;
    }
    if args.report {
        write_report(err, &pump.into_report())?;
    }
    Ok(())
}

pub fn extract<O>(args: &ExtractArgs, out: &mut O) -> Result<(), CliError>
where
    O: Write + ?Sized,
{
    let body = read(&args.input)?;
    let value = extract_field(&body, &args.path)?;
    serde_json::to_writer(&mut *out, &value)?;
    writeln!(out)?;
    Ok(())
}
