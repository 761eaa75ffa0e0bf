extern crate symphonia;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use beatscope::{load_config, AnalysisConfig, BeatAnalyzer, SampleBuffer, TempoEstimate};
use clap::Parser;
use symphonia::core::{
    audio::SampleBuffer as DecodeBuffer,
    codecs::{self, DecoderOptions},
    errors::Error,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

/// Estimate the tempo and beat times of an audio file.
#[derive(Parser, Debug)]
#[command(name = "beatscope", version)]
struct Cli {
    /// Audio file to analyze
    input: PathBuf,

    /// TOML file with analysis settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Track beats on the percussive part only
    #[arg(long)]
    hpss: bool,

    /// Cut leading and trailing silence first
    #[arg(long)]
    trim_silence: bool,

    /// Tempo search ceiling in bpm
    #[arg(long)]
    max_tempo: Option<f64>,

    #[arg(long)]
    frame_length: Option<usize>,

    #[arg(long)]
    hop_length: Option<usize>,

    /// Write beat times here, one "<seconds> sec" per line
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the dB spectrogram here as JSON
    #[arg(long)]
    spectrogram: Option<PathBuf>,

    /// Print the thinned-out annotation markers
    #[arg(long)]
    markers: bool,
}

impl Cli {
    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let config = load_config(path)
                    .with_context(|| format!("failed to load config from {}", path.display()))?;
                log::info!("Loaded config from {}", path.display());
                config
            }
            None => AnalysisConfig::default(),
        };

        config.harmonic_percussive |= self.hpss;
        config.trim_silence |= self.trim_silence;
        if let Some(max_tempo) = self.max_tempo {
            config.max_tempo = max_tempo;
            if config.min_tempo <= max_tempo && config.start_bpm > max_tempo {
                log::debug!("Lowering start bpm {} to {}", config.start_bpm, max_tempo);
                config.start_bpm = max_tempo;
            }
        }
        if let Some(frame_length) = self.frame_length {
            config.frame_length = frame_length;
        }
        if let Some(hop_length) = self.hop_length {
            config.hop_length = hop_length;
        }
        Ok(config)
    }
}

/// Decodes the first audio track of `path` and averages its channels to mono.
fn decode(path: &Path) -> Result<SampleBuffer> {
    // Open the media source.
    let src = std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    // Probe the media source.
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("unsupported format")?;
    let mut format = probed.format;

    // Find the first audio track with a known (decodeable) codec.
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != codecs::CODEC_TYPE_NULL)
        .context("no supported audio tracks")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("unsupported codec")?;

    // Store the track identifier, it will be used to filter packets.
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("track has no sample rate")?;

    let mut interleaved = Vec::new();
    let mut channels = 0;
    let mut sample_buf = None;

    // The decode loop.
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // Assume all IO errors are EOF.
            Err(Error::IoError(_)) => break,
            Err(Error::ResetRequired) => {
                log::warn!("Track list changed mid-stream, stopping at the first stream");
                break;
            }
            Err(err) => return Err(err).context("failed to read packet"),
        };

        // If the packet does not belong to the selected track, skip over it.
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                // Create a sample buffer matching the first decoded packet.
                if sample_buf.is_none() {
                    let spec = *decoded.spec();
                    channels = spec.channels.count();
                    sample_buf = Some(DecodeBuffer::<f32>::new(decoded.capacity() as u64, spec));
                }

                if let Some(buf) = &mut sample_buf {
                    buf.copy_interleaved_ref(decoded);
                    interleaved.extend_from_slice(buf.samples());
                }
            }
            // The packet failed to decode, skip it.
            Err(Error::IoError(_)) | Err(Error::DecodeError(_)) => continue,
            Err(err) => return Err(err).context("failed to decode packet"),
        }
    }

    log::debug!(
        "Decoded {} samples x {} channels at {} Hz",
        interleaved.len() / channels.max(1),
        channels,
        sample_rate
    );
    Ok(SampleBuffer::from_interleaved(&interleaved, channels.max(1), sample_rate)?)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = cli.analysis_config()?;
    let analyzer = BeatAnalyzer::new(config)?;

    let start = Instant::now();
    let buffer = decode(&cli.input)?;
    log::info!(
        "Loaded {} ({:.2} seconds at {} Hz)",
        cli.input.display(),
        buffer.duration_seconds(),
        buffer.sample_rate()
    );

    let analysis = analyzer
        .analyze(&buffer)
        .with_context(|| format!("failed to analyze {}", cli.input.display()))?;

    match analysis.tempo {
        TempoEstimate::Detected(bpm) => println!("Estimated tempo: {:.2} BPM", bpm),
        TempoEstimate::Undetermined => println!("Estimated tempo: undetermined"),
    }
    if let Some(bpm) = analysis.beat_tempo() {
        println!("Tempo from beat spacing: {:.2} BPM", bpm);
    }
    println!("Detected {} beats", analysis.beats.len());

    if cli.markers {
        match analyzer.markers(&analysis) {
            Ok(markers) => {
                let shown: Vec<String> = markers.iter().map(|t| format!("{:.3}", t)).collect();
                println!("Markers: {}", shown.join(", "));
            }
            Err(err) => log::warn!("No markers: {}", err),
        }
    }

    if let Some(path) = &cli.output {
        std::fs::write(path, analysis.export_text())
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("Wrote beat times to {}", path.display());
    }

    if let Some(path) = &cli.spectrogram {
        let json = analyzer.spectrogram_db(&analysis).to_json()?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("Wrote spectrogram to {}", path.display());
    }

    log::info!("Finished in {:.2} seconds", start.elapsed().as_secs_f64());
    Ok(())
}
