use crate::cli::Output;
use crate::config::WriterConfig;
use crate::writer::{AtomicWriter, Encoding, ErrorPolicy, OpenMode, OpenOptions, SessionState};
use anyhow::{Context, Result};
use clap::Args;
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct WriteArgs {
    /// File to replace
    pub target: PathBuf,

    /// Keep the existing content and add stdin after it
    #[arg(long)]
    pub append: bool,

    /// Reject output smaller than this many bytes
    #[arg(long, value_name = "BYTES")]
    pub min_size: Option<u64>,

    /// Reject output whose size differs from the current file by more than this percentage
    #[arg(long, value_name = "PERCENT", value_parser = parse_percent)]
    pub max_pct_change: Option<f64>,

    /// Reject output whose line count differs from the current file by more than this
    #[arg(long, value_name = "LINES")]
    pub max_line_change: Option<u64>,

    /// Replace the file even if the content is unchanged
    #[arg(long)]
    pub replace_equal: bool,

    /// Skip all checks for this write
    #[arg(long)]
    pub no_checks: bool,

    /// Validate and report, but leave the file alone
    #[arg(long)]
    pub dry_run: bool,

    /// Re-encode stdin (read as UTF-8) before writing
    #[arg(long)]
    pub encoding: Option<Encoding>,

    /// How to handle characters the encoding cannot represent
    #[arg(long, default_value = "strict")]
    pub errors: ErrorPolicy,
}

/// Rejected here so a bad limit never opens a session.
fn parse_percent(s: &str) -> Result<f64, String> {
    let pct: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !pct.is_finite() || pct < 0.0 {
        return Err("must be a finite non-negative percentage".to_string());
    }
    Ok(pct)
}

pub fn run(args: &WriteArgs, config: WriterConfig) -> Result<()> {
    let mut input = Vec::new();
    std::io::stdin()
        .lock()
        .read_to_end(&mut input)
        .context("Failed to read stdin")?;

    let mode = if args.append {
        OpenMode::Append
    } else {
        OpenMode::Write
    };
    let options = OpenOptions::new()
        .mode(mode)
        .encoding(args.encoding.unwrap_or_default())
        .errors(args.errors)
        .replace_equal(args.replace_equal);

    let writer = AtomicWriter::new(config)?;
    let mut session = writer
        .open(&args.target, &options)
        .with_context(|| format!("Failed to open {}", args.target.display()))?;

    if let Some(min_size) = args.min_size {
        session.set_min_size(min_size);
    }
    if let Some(pct) = args.max_pct_change {
        session.set_max_pct_change(pct)?;
    }
    if let Some(lines) = args.max_line_change {
        session.set_max_line_change(lines);
    }
    if args.no_checks {
        session.disable_checks();
    }

    if args.encoding.is_some() {
        let text = String::from_utf8(input).context("stdin is not valid UTF-8")?;
        session.write_text(&text)?;
    } else {
        session.write_all(&input)?;
    }

    let target = args.target.display();
    if args.dry_run {
        let dry_run = session
            .close_dry_run()
            .with_context(|| format!("Output for {} rejected", target))?;
        if dry_run.would_replace {
            Output::info(&format!("Dry run: {} would be replaced", target));
        } else {
            Output::info(&format!("Dry run: {} is unchanged", target));
        }
        return Ok(());
    }

    let state = session
        .close()
        .with_context(|| format!("Output for {} rejected", target))?;
    match state {
        SessionState::ClosedReplaced => Output::success(&format!("Wrote {}", target)),
        SessionState::ClosedDiscarded => Output::info(&format!("{} is unchanged", target)),
        SessionState::Open | SessionState::ClosedFailed => {
            anyhow::bail!("Write to {} did not complete", target)
        }
    }
    Ok(())
}
