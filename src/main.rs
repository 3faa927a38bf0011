//! Command-line front end: inspect, play and re-time WAV files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::{error, info};

use pcmkit::config::{load_config, load_config_from};
use pcmkit::{
    resample_speed_with_pitch, wav_duration, write_wav, AudioSink, ChunkedPlayer,
    LogProgress, PhaseVocoder, PlayWindow, PlaybackConfig, ProgressReporter, Result,
    SampleBuffer, ScaledPlayer, SpeedChangeRequest, TextBar, WavSink, WavSource,
};

#[derive(Parser)]
#[command(name = "pcmkit")]
#[command(about = "Chunked WAV playback and speed changes", long_about = None)]
struct Cli {
    /// Config file to use instead of the per-user one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the format and length of a WAV file.
    Info { file: PathBuf },
    /// Play a WAV file, or part of one.
    Play(PlayArgs),
    /// Change the speed of a WAV file and write the result.
    Speed {
        input: PathBuf,
        output: PathBuf,
        /// Speed factor; 2.0 plays twice as fast.
        #[arg(long)]
        ratio: f64,
        /// Keep the pitch and only change the tempo.
        #[arg(long, conflicts_with = "resample")]
        preserve_pitch: bool,
        /// Resample so both tempo and pitch change.
        #[arg(long)]
        resample: bool,
    },
}

#[derive(Args)]
struct PlayArgs {
    file: PathBuf,
    /// Seconds into the file to start at.
    #[arg(long, default_value_t = 0.0)]
    start: f64,
    /// Seconds to play; the rest of the file when omitted.
    #[arg(long)]
    duration: Option<f64>,
    /// Seconds of audio per chunk.
    #[arg(long)]
    chunk_time: Option<f64>,
    /// Load the window into memory and play it through the scaled player.
    #[arg(long)]
    scaled: bool,
    /// Amplitude multiplier for scaled playback.
    #[arg(long, requires = "scaled")]
    dmax: Option<f64>,
    /// Write to this WAV file instead of the sound card.
    #[arg(long)]
    to: Option<PathBuf>,
    #[arg(long)]
    no_progress: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("pcmkit: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Commands::Info { file } => show_info(&file),
        Commands::Play(args) => play(args, config),
        Commands::Speed {
            input,
            output,
            ratio,
            preserve_pitch,
            resample,
        } => change_speed(&input, &output, ratio, preserve_pitch, resample, &config),
    }
}

fn show_info(path: &Path) -> Result<()> {
    let source = WavSource::open(path)?;
    let params = source.header().params();
    println!("{}", path.display());
    println!("  channels:    {}", params.channels);
    println!("  sample rate: {} Hz", params.sample_rate);
    println!("  bit depth:   {}", params.sample_width * 8);
    println!("  frames:      {}", params.frame_count);
    println!("  duration:    {:.3} sec.", wav_duration(path)?);
    Ok(())
}

fn output_sink(to: Option<&Path>) -> Result<Box<dyn AudioSink>> {
    match to {
        Some(path) => Ok(Box::new(WavSink::create(path)?)),
        #[cfg(feature = "device")]
        None => Ok(Box::new(pcmkit::DeviceSink::new())),
        #[cfg(not(feature = "device"))]
        None => Err(pcmkit::AudioError::Device(
            "built without sound card support; pass --to <file.wav>".into(),
        )),
    }
}

fn play(args: PlayArgs, mut config: PlaybackConfig) -> Result<()> {
    if let Some(chunk_time) = args.chunk_time {
        config.chunk_duration = chunk_time;
    }
    if args.dmax.is_some() {
        config.dmax = args.dmax;
    }
    if args.no_progress {
        config.show_progress = false;
    }
    config.validate()?;

    let window = PlayWindow::new(args.start, args.duration.unwrap_or(f64::INFINITY));
    let mut sink = output_sink(args.to.as_deref())?;
    let mut progress: Box<dyn ProgressReporter> = if config.show_progress {
        Box::new(TextBar::stderr())
    } else {
        Box::new(LogProgress::default())
    };

    let report = if args.scaled {
        let mut source = WavSource::open(&args.file)?;
        let range = window.resolve(&source.header().params())?;
        let loaded = source.read_range(range)?;
        // floats so that dmax applies
        let buffer = SampleBuffer::from_float(
            loaded.channels(),
            loaded.params().sample_width,
            loaded.sample_rate(),
            loaded.to_float(),
        )?;
        ScaledPlayer::new(config)?.play(&buffer, &mut sink, &mut progress)?
    } else {
        ChunkedPlayer::new(config)?.play_file(&args.file, &mut sink, &mut progress, window)?
    };

    info!(
        "done: {} frames in {} chunks",
        report.frames_written, report.chunks_written
    );
    Ok(())
}

fn change_speed(
    input: &Path,
    output: &Path,
    ratio: f64,
    preserve_pitch: bool,
    resample: bool,
    config: &PlaybackConfig,
) -> Result<()> {
    let mut source = WavSource::open(input)?;
    let buffer = source.read_times(0.0, f64::INFINITY)?;

    let changed = if resample {
        resample_speed_with_pitch(&buffer, ratio)?
    } else {
        let stretcher = PhaseVocoder::new(config.stretch_fft_size)?;
        SpeedChangeRequest::new(ratio, preserve_pitch)?.apply(&buffer, &stretcher)?
    };

    let params = write_wav(output, &changed)?;
    info!(
        "wrote {} ({:.2} sec. -> {:.2} sec.)",
        output.display(),
        buffer.duration_seconds(),
        params.duration_seconds()
    );
    Ok(())
}
