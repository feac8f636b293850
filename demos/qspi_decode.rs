//! Example: QSPI decoding of a simulated capture
//!
//! Simulates one transaction per known command, streams the edges to a decoder
//! running on its own thread and prints the decoded frames.
//!
//! Usage:
//!   cargo run --release --example qspi_decode -- --mode quad -n 50
//!
//! With CSV output:
//!   cargo run --release --example qspi_decode -- \
//!       --mode extended --dummy-cycles 10 --address-size 4 \
//!       --csv-output frames.csv

use clap::{Parser, ValueEnum};
use qspi::nodes::decoders::{ANALYZER_NAME, MIN_SAMPLE_RATE_HZ};
use qspi::runtime::{ChannelMessage, Receiver, Sender};
use qspi::{
    BitState, ChannelSink, Channels, CommandTable, DisplayBase, Frame, FrameFormatter, LineMode,
    ProcessNode, QspiDecoder, QspiError, QspiSettings, Scheduler, SimulationGenerator,
    SimulationSource, StreamCursor, WorkError, WorkResult,
};
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use tracing::info;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    Extended,
    Dual,
    Quad,
}

impl From<Mode> for LineMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Extended => LineMode::Extended,
            Mode::Dual => LineMode::Dual,
            Mode::Quad => LineMode::Quad,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Base {
    Bin,
    Dec,
    Hex,
}

impl From<Base> for DisplayBase {
    fn from(base: Base) -> Self {
        match base {
            Base::Bin => DisplayBase::Binary,
            Base::Dec => DisplayBase::Decimal,
            Base::Hex => DisplayBase::Hexadecimal,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bus line mode
    #[arg(long, value_enum, default_value = "extended")]
    mode: Mode,

    /// Dummy clock cycles (1-15)
    #[arg(long, default_value = "8")]
    dummy_cycles: u32,

    /// Address size in bytes (3 or 4)
    #[arg(long, default_value = "3")]
    address_size: u32,

    /// Clock idles high (CPOL = 1)
    #[arg(long)]
    clock_idle_high: bool,

    /// Samples per half clock period in the simulation
    #[arg(long, default_value = "5")]
    half_cycle: u64,

    /// Number of frames to print (0 = all)
    #[arg(short, long, default_value = "100")]
    n: usize,

    /// Value radix
    #[arg(long, value_enum, default_value = "hex")]
    base: Base,

    /// CSV output file path (optional)
    #[arg(long)]
    csv_output: Option<String>,
}

/// Sink that logs decoded frames
struct FramePrinter {
    input: Receiver<Frame>,
    formatter: FrameFormatter,
    count: usize,
    max_frames: usize,
}

impl ProcessNode for FramePrinter {
    fn name(&self) -> &str {
        "frame_printer"
    }

    fn work(&mut self) -> WorkResult<usize> {
        let frame = self.input.recv()?;
        self.count += 1;

        // Keep draining past the limit so the decoder never blocks on us
        if self.max_frames == 0 || self.count <= self.max_frames {
            info!(
                "Frame #{}: {} [{}..={}]",
                self.count,
                self.formatter.tabular_text(&frame),
                frame.start_sample,
                frame.end_sample
            );
        }

        Ok(1)
    }
}

/// Sink that collects frames and writes them as CSV at end of stream
struct CsvExporter {
    input: Receiver<Frame>,
    formatter: FrameFormatter,
    frames: Vec<Frame>,
    path: String,
    sample_rate_hz: u64,
}

impl ProcessNode for CsvExporter {
    fn name(&self) -> &str {
        "csv_exporter"
    }

    fn work(&mut self) -> WorkResult<usize> {
        match self.input.recv() {
            Ok(frame) => {
                self.frames.push(frame);
                Ok(1)
            }
            Err(WorkError::Shutdown) => {
                let file = File::create(&self.path)
                    .map_err(|e| WorkError::NodeError(format!("CSV create error: {}", e)))?;
                self.formatter
                    .export_csv(&self.frames, BufWriter::new(file), self.sample_rate_hz, 0)
                    .map_err(|e| WorkError::NodeError(format!("CSV write error: {}", e)))?;
                info!("[CsvExporter] Wrote {} frames to {}", self.frames.len(), self.path);
                Err(WorkError::Shutdown)
            }
            Err(e) => Err(e),
        }
    }
}

fn frame_channel() -> (
    crossbeam_channel::Sender<ChannelMessage<Frame>>,
    Receiver<Frame>,
) {
    let (tx, rx) = crossbeam_channel::bounded(1024);
    (tx, Receiver::new(rx))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let clock_idle = if args.clock_idle_high {
        BitState::High
    } else {
        BitState::Low
    };
    let settings = QspiSettings::default()
        .with_mode(args.mode.into())
        .with_dummy_cycles(args.dummy_cycles)
        .with_address_size(args.address_size)
        .with_clock_inactive_state(clock_idle);
    settings.validate()?;

    info!("=== {} Decode Example ===", ANALYZER_NAME);
    info!(
        "Mode: {}, dummy cycles: {}, address: {} bytes, clock idle {}",
        settings.mode, settings.dummy_cycles, settings.address_size, clock_idle
    );

    // Simulate one transaction per command
    let commands = Arc::new(CommandTable::default());
    let mut generator = SimulationGenerator::new(settings.clone(), Arc::clone(&commands))
        .with_half_cycle(args.half_cycle);
    generator.cycle_commands(0xBEADED, &[0xDE, 0xAD, 0xBE, 0xEF]);
    let capture = generator.finish();
    info!(
        "Simulated {} samples at {:.1} MHz (minimum {} Hz)",
        capture.num_samples(),
        capture.sample_rate_hz() as f64 / 1_000_000.0,
        MIN_SAMPLE_RATE_HZ
    );

    let formatter = FrameFormatter::new(Arc::clone(&commands), &settings).with_base(args.base.into());
    let mut scheduler = Scheduler::new();

    // Source first: stream cursors block until their initial level arrives
    let (source, mut receivers) = SimulationSource::new(&capture);
    scheduler.start_process(Box::new(source));

    let channels = Channels::open(capture.channel_map(), |channel| {
        let rx = receivers
            .remove(&channel)
            .ok_or_else(|| QspiError::MissingChannel(format!("channel {}", channel)))?;
        Ok(StreamCursor::new(rx)?)
    })?;

    let mut destinations = Vec::new();

    let (tx, rx) = frame_channel();
    destinations.push(tx);
    scheduler.start_process(Box::new(FramePrinter {
        input: rx,
        formatter: formatter.clone(),
        count: 0,
        max_frames: args.n,
    }));

    if let Some(path) = &args.csv_output {
        info!("CSV output: {}", path);
        let (tx, rx) = frame_channel();
        destinations.push(tx);
        scheduler.start_process(Box::new(CsvExporter {
            input: rx,
            formatter,
            frames: Vec::new(),
            path: path.clone(),
            sample_rate_hz: capture.sample_rate_hz(),
        }));
    }

    let sink = ChannelSink::new(Sender::new(destinations));
    let progress = sink.progress();
    let decoder = QspiDecoder::new(settings, commands, channels, sink)?;
    scheduler.start_process(Box::new(decoder));

    info!("Running...");
    scheduler.wait();

    info!(
        "Done! Decoded up to sample {}",
        progress.load(std::sync::atomic::Ordering::Relaxed)
    );

    Ok(())
}
