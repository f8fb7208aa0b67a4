//! Generates a test file in which each chunk is serially numbered.
//!
//! The first 12 bytes of each chunk are the serial number in left-justified
//! ASCII, padded with NULs, followed by a newline; the rest of the chunk is
//! the serial number splatted down as a big-endian 32-bit integer. Copying
//! such a file through a pipeline that reorders or drops chunks is
//! immediately visible in the serials.
//!
//! Progress goes to stderr (the payload may be going to stdout): a live line
//! on `SIGINFO`/`SIGUSR1`, and a final summary when done.

use std::fs::File;
use std::io::{self, Write};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use clap::Parser;
use dd_pipeline::progress::{progress_line, PROGRESS_SIGNALS};
use dd_pipeline::{CopyError, DEFAULT_CHUNK_SIZE};
use signal_hook::iterator::Signals;

/// Generate a file of serially numbered chunks for copy testing.
#[derive(Parser, Debug)]
#[command(name = "mktest", version, about)]
struct Args {
    /// Size to generate: decimal, optional fractional part, optional binary
    /// suffix (k, m, g, t, e, p; each a power of 1024).
    #[arg(value_parser = parse_size)]
    size: u64,
    /// Output path, or "-" for standard output.
    output: String,
}

enum Output {
    File(File),
    Stdout(io::Stdout),
}

impl Output {
    fn open(path: &str) -> io::Result<Self> {
        if path == "-" {
            Ok(Output::Stdout(io::stdout()))
        } else {
            use std::fs::OpenOptions;
            use std::os::unix::fs::OpenOptionsExt;
            Ok(Output::File(
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .mode(0o644)
                    .open(path)?,
            ))
        }
    }

    fn truncate(&self, len: u64) {
        if let Output::File(file) = self {
            if let Err(err) = file.set_len(len) {
                log::warn!("could not truncate output to {len} bytes: {err}");
            }
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::File(file) => file.write(buf),
            Output::Stdout(stdout) => stdout.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::File(file) => file.flush(),
            Output::Stdout(stdout) => stdout.flush(),
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(err) = run(&args) {
        match err {
            // Reported with the failing block number at the write site.
            CopyError::Write(_) => {}
            _ => eprintln!("mktest: {err}"),
        }
        process::exit(err.exit_code());
    }
}

fn run(args: &Args) -> Result<(), CopyError> {
    let mut output = Output::open(&args.output).map_err(CopyError::CreateOutput)?;

    let mut block = Vec::new();
    block
        .try_reserve_exact(DEFAULT_CHUNK_SIZE)
        .map_err(|_| CopyError::Allocation(DEFAULT_CHUNK_SIZE))?;
    block.resize(DEFAULT_CHUNK_SIZE, 0);

    let total = Arc::new(AtomicU64::new(0));
    let started = Instant::now();

    let mut signals = Signals::new(PROGRESS_SIGNALS).map_err(CopyError::Os)?;
    let signals_handle = signals.handle();
    let signals_total = Arc::clone(&total);
    let progress_thread = thread::Builder::new()
        .name("Progress thread".to_string())
        .spawn(move || {
            for _ in signals.forever() {
                let num_seconds = started.elapsed().as_secs_f64();
                let copied = signals_total.load(Ordering::Acquire);
                eprintln!("{}", progress_line(copied, num_seconds, false));
            }
        })
        .map_err(CopyError::Os)?;

    let mut serial: u32 = 0;
    let mut copied: u64 = 0;
    let result = loop {
        if copied >= args.size {
            break Ok(());
        }
        fill_block(&mut block, serial);
        let remaining = args.size - copied;
        let amt = block.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if let Err(err) = output.write_all(&block[..amt]) {
            eprintln!("mktest: write of block #{serial} failed: {err}");
            break Err(CopyError::Write(err));
        }
        copied += amt as u64;
        total.store(copied, Ordering::Release);
        serial = serial.wrapping_add(1);
    };

    output.truncate(copied);
    let num_seconds = started.elapsed().as_secs_f64();

    signals_handle.close();
    let _ = progress_thread.join();

    eprintln!("{}", progress_line(copied, num_seconds, true));
    result
}

/// Parse a size like `1024`, `256m`, or `1.5g`. Suffixes multiply by 1024
/// cumulatively: k, m, g, t, e, p.
fn parse_size(arg: &str) -> Result<u64, String> {
    let (digits, suffix) = match arg.chars().last() {
        None => return Err("empty size".to_string()),
        Some(c) if c.is_ascii_alphabetic() => (&arg[..arg.len() - 1], Some(c)),
        Some(_) => (arg, None),
    };
    let multiplier: u64 = match suffix {
        None => 1,
        Some('k' | 'K') => 1 << 10,
        Some('m' | 'M') => 1 << 20,
        Some('g' | 'G') => 1 << 30,
        Some('t' | 'T') => 1 << 40,
        Some('e' | 'E') => 1 << 50,
        Some('p' | 'P') => 1 << 60,
        Some(other) => return Err(format!("unknown size suffix '{other}'")),
    };

    let (whole, fraction) = match digits.split_once('.') {
        None => (digits, ""),
        Some((whole, fraction)) => (whole, fraction),
    };
    let whole: u64 = whole.parse().map_err(|err| format!("bad size: {err}"))?;
    let mut size = whole
        .checked_mul(multiplier)
        .ok_or_else(|| "size too large".to_string())?;
    if !fraction.is_empty() {
        let fraction: f64 = format!("0.{fraction}")
            .parse()
            .map_err(|err| format!("bad size: {err}"))?;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            size = size.saturating_add((fraction * multiplier as f64) as u64);
        }
    }
    Ok(size)
}

/// Lay the serial down as a big-endian u32 lattice over the whole block,
/// then overwrite the head with the 12-byte NUL-padded ASCII serial and a
/// newline.
fn fill_block(block: &mut [u8], serial: u32) {
    let be = serial.to_be_bytes();
    let mut chunks = block.chunks_exact_mut(4);
    for chunk in chunks.by_ref() {
        chunk.copy_from_slice(&be);
    }
    let tail = chunks.into_remainder();
    tail.copy_from_slice(&be[..tail.len()]);

    let digits = serial.to_string();
    let header = &mut block[..13];
    header.fill(0);
    header[..digits.len()].copy_from_slice(digits.as_bytes());
    header[12] = b'\n';
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_plain_and_suffixed() {
        assert_eq!(parse_size("1024"), Ok(1024));
        assert_eq!(parse_size("1k"), Ok(1 << 10));
        assert_eq!(parse_size("1K"), Ok(1 << 10));
        assert_eq!(parse_size("3m"), Ok(3 << 20));
        assert_eq!(parse_size("2g"), Ok(2 << 30));
        assert_eq!(parse_size("1t"), Ok(1 << 40));
        assert_eq!(parse_size("1e"), Ok(1 << 50));
        assert_eq!(parse_size("1p"), Ok(1 << 60));
    }

    #[test]
    fn parse_size_fractional() {
        assert_eq!(parse_size("1.5k"), Ok(1536));
        assert_eq!(parse_size("0.25m"), Ok(256 * 1024));
        assert_eq!(parse_size("2.5"), Ok(2));
        assert_eq!(parse_size("1."), Ok(1));
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("q").is_err());
        assert!(parse_size("12q").is_err());
        assert!(parse_size("1.2.3k").is_err());
        assert!(parse_size("-5").is_err());
    }

    #[test]
    fn fill_block_header_layout() {
        let mut block = vec![0xffu8; 32];
        fill_block(&mut block, 5);

        assert_eq!(&block[..1], b"5");
        assert!(block[1..12].iter().all(|&b| b == 0));
        assert_eq!(block[12], b'\n');
        // The lattice survives past the header: bytes 13..16 are the tail of
        // the u32 at offset 12, then aligned repeats.
        assert_eq!(&block[13..16], &[0, 0, 5]);
        assert_eq!(&block[16..20], &[0, 0, 0, 5]);
        assert_eq!(&block[28..32], &[0, 0, 0, 5]);
    }

    #[test]
    fn fill_block_multi_digit_serial() {
        let mut block = vec![0u8; 32];
        fill_block(&mut block, 1234);

        assert_eq!(&block[..4], b"1234");
        assert!(block[4..12].iter().all(|&b| b == 0));
        assert_eq!(block[12], b'\n');
        assert_eq!(&block[16..20], &1234u32.to_be_bytes());
    }

    #[test]
    fn fill_block_unaligned_tail_keeps_lattice() {
        let mut block = vec![0u8; 30];
        fill_block(&mut block, 7);
        // 30 = 7 * 4 + 2: the tail carries the first two lattice bytes.
        assert_eq!(&block[28..30], &[0, 0]);
    }
}
