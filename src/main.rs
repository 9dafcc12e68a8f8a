//! voxhub command-line tool
//!
//! Lists the registered backends and their voices, speaks text through the
//! best available backend (or a named one), or renders speech to a WAV file.

use anyhow::{anyhow, bail, Context as _};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::Duration;
use voxhub::config::Config;
use voxhub::render::{synthesize, write_wav};
use voxhub::util::TrimParams;
use voxhub::{lock_backend, BackendError, Context, SharedBackend, TextToSpeechBackend};

const USAGE: &str = "\
Usage: voxhub [--debug] [--backend NAME] [--list] [--voices] [--wav FILE] [--no-trim] [TEXT...]

  -d, --debug         Log at debug level to voxhub.log
  -b, --backend NAME  Use the named backend instead of the best available
  -l, --list          List registered backends in priority order
      --voices        List the voices of the selected backend
  -w, --wav FILE      Render TEXT to FILE instead of speaking it
      --no-trim       Keep leading and trailing silence in rendered audio
  -h, --help          Show this help";

/// How often to check whether speech has finished
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct Options {
    debug: bool,
    backend: Option<String>,
    list: bool,
    voices: bool,
    wav: Option<PathBuf>,
    no_trim: bool,
    help: bool,
    text: Vec<String>,
}

impl Options {
    fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut opts = Options::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--debug" | "-d" => opts.debug = true,
                "--backend" | "-b" => {
                    opts.backend = Some(args.next().ok_or_else(|| anyhow!("{} needs a backend name", arg))?)
                }
                "--list" | "-l" => opts.list = true,
                "--voices" => opts.voices = true,
                "--wav" | "-w" => {
                    opts.wav = Some(args.next().ok_or_else(|| anyhow!("{} needs a file name", arg))?.into())
                }
                "--no-trim" => opts.no_trim = true,
                "--help" | "-h" => opts.help = true,
                "--" => {
                    opts.text.extend(args.by_ref());
                }
                flag if flag.starts_with('-') && flag.len() > 1 => bail!("Unknown option {}", flag),
                _ => opts.text.push(arg),
            }
        }
        Ok(opts)
    }
}

fn main() {
    let opts = match Options::parse(std::env::args().skip(1)) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", USAGE);
            process::exit(2);
        }
    };

    // Initialize logger
    if opts.debug {
        // Debug mode: write to voxhub.log file
        use std::fs::OpenOptions;
        match OpenOptions::new().create(true).append(true).open("voxhub.log") {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Warning: Failed to open voxhub.log for debug logging: {}", e);
                eprintln!("Continuing without file logging...");
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }

        info!(
            "voxhub version {} starting (debug mode, logging to voxhub.log)",
            voxhub::VERSION
        );
    } else {
        // Normal mode: only errors to stderr unless RUST_LOG says otherwise
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Error)
            .parse_default_env()
            .init();
    }

    if let Err(e) = run(opts) {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(opts: Options) -> anyhow::Result<()> {
    if opts.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load().context("Failed to load configuration")?;
    debug!("Config loaded from {:?}", config.path());
    let ctx = Context::new();

    if opts.list {
        list_backends(&ctx);
        if !opts.voices && opts.text.is_empty() {
            return Ok(());
        }
    }

    if !opts.voices && opts.text.is_empty() {
        println!("{}", USAGE);
        return Ok(());
    }

    let backend = select_backend(&ctx, opts.backend.clone().or_else(|| config.backend()))?;
    apply_settings(&backend, &config)?;

    if opts.voices {
        list_voices(&backend)?;
    }

    if opts.text.is_empty() {
        return Ok(());
    }
    let text = opts.text.join(" ");

    match &opts.wav {
        Some(path) => {
            let trim = config.trim_silence() && !opts.no_trim;
            render(&backend, &text, path, trim.then(|| config.trim_params()))
        }
        None => speak(&backend, &text),
    }
}

fn list_backends(ctx: &Context) {
    let registry = ctx.registry();
    for id in registry.list() {
        let name = registry.name(id).unwrap_or_default();
        let priority = registry.priority(id).unwrap_or_default();
        println!("{:>4}  {}  {}", priority, id, name);
    }
}

/// The named backend, initialized, or the best one that initializes
fn select_backend(ctx: &Context, name: Option<String>) -> anyhow::Result<SharedBackend> {
    let registry = ctx.registry();
    let Some(name) = name else {
        return registry
            .create_best()
            .ok_or_else(|| anyhow!("No speech backend is available on this system"));
    };

    let backend = registry
        .create(name.as_str())
        .ok_or_else(|| anyhow!("Unknown backend {:?} (see --list)", name))?;
    lock_backend(&backend)?
        .initialize()
        .with_context(|| format!("Backend {} failed to initialize", name))?;
    info!("Using backend {}", name);
    Ok(backend)
}

/// Apply configured parameters, skipping those the backend does not support
fn apply_settings(backend: &SharedBackend, config: &Config) -> anyhow::Result<()> {
    let mut b = lock_backend(backend)?;
    let settings: [(&str, Option<f32>, fn(&mut dyn TextToSpeechBackend, f32) -> voxhub::Result<()>); 3] = [
        ("rate", config.rate(), |b, v| b.set_rate(v)),
        ("volume", config.volume(), |b, v| b.set_volume(v)),
        ("pitch", config.pitch(), |b, v| b.set_pitch(v)),
    ];
    for (label, value, apply) in settings {
        let Some(value) = value else { continue };
        match apply(&mut *b, value) {
            Ok(()) => debug!("Set {} to {}", label, value),
            Err(e) if e.is_soft() => warn!("{} does not support {}", b.name(), label),
            Err(e) => return Err(e).with_context(|| format!("Failed to set {}", label)),
        }
    }
    if let Some(index) = config.voice() {
        match b.set_voice(index) {
            Ok(()) => debug!("Selected voice {}", index),
            Err(e) => warn!("Could not select voice {}: {}", index, e),
        }
    }
    Ok(())
}

fn list_voices(backend: &SharedBackend) -> anyhow::Result<()> {
    let mut b = lock_backend(backend)?;
    let count = b.count_voices()?;
    let current = b.voice().ok();
    for index in 0..count {
        let marker = if current == Some(index) { '*' } else { ' ' };
        let name = b.voice_name(index)?;
        let language = b.voice_language(index).unwrap_or_default();
        println!("{}{:>3}  {}  {}", marker, index, name, language);
    }
    Ok(())
}

/// Speak and wait until the backend reports it is done
fn speak(backend: &SharedBackend, text: &str) -> anyhow::Result<()> {
    lock_backend(backend)?.speak(text, true)?;
    loop {
        thread::sleep(POLL_INTERVAL);
        match lock_backend(backend)?.is_speaking() {
            Ok(true) => continue,
            Ok(false) => return Ok(()),
            Err(BackendError::NotImplemented) => {
                debug!("Backend cannot report progress; not waiting");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Synthesize to memory and write a 16-bit WAV file
fn render(backend: &SharedBackend, text: &str, path: &Path, trim: Option<TrimParams>) -> anyhow::Result<()> {
    let mut pcm = synthesize(&mut *lock_backend(backend)?, text)
        .context("Backend cannot synthesize to memory")?;
    if let Some(params) = trim {
        pcm.trim(&params);
    }
    write_wav(path, &pcm).with_context(|| format!("Failed to write WAV file: {:?}", path))?;
    println!("Wrote {}", path.display());
    Ok(())
}
