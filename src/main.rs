use clap::Parser;
use log::error;
use numeral_recognition::{Classifier, DEFAULT_PARAMS_DIR, ParamPaths, preprocess, render_ascii};
use std::{error::Error, path::Path, path::PathBuf, process::ExitCode};
use tracing_subscriber::EnvFilter;

/// Recognize handwritten digits in image files.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory holding the w1, b1, w2 and b2 parameter arrays (.npy or .npy.gz).
    #[arg(long, env = "NUMERAL_PARAMS_DIR", default_value = DEFAULT_PARAMS_DIR)]
    params: PathBuf,

    /// Print each image the way the network sees it.
    #[arg(long)]
    show: bool,

    /// Images to recognize. Any size works; they are scaled down to 28x28.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

fn main() -> ExitCode {
    // Log to stderr so that stdout only carries results. RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Without parameters there is nothing to run, so give up straight away.
    let classifier = match Classifier::load(&ParamPaths::in_dir(&args.params)) {
        Ok(classifier) => classifier,
        Err(err) => {
            error!("Cannot load network parameters: {err}");
            return ExitCode::FAILURE;
        }
    };

    // A bad image only costs its own result; keep going with the rest.
    let failures = args
        .images
        .iter()
        .filter(|path| {
            recognize_file(&classifier, path, args.show)
                .inspect_err(|err| error!("{}: {err}", path.display()))
                .is_err()
        })
        .count();

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn recognize_file(classifier: &Classifier, path: &Path, show: bool) -> Result<(), Box<dyn Error>> {
    let image = image::open(path)?;
    let features = preprocess(&image)?;

    if show {
        println!("{}", render_ascii(features.view()));
    }

    let recognition = classifier.recognize_features(features.view())?;
    println!(
        "{}: {} ({:.1}%)",
        path.display(),
        recognition.label,
        recognition.confidence() * 100.0
    );
    Ok(())
}
