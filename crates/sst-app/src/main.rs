use std::error::Error;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver};
use clap::Parser;
use log::warn;
use sst_app::{AppConfig, AppError, AppEvent, ExportFormat, LibraryLoader, Orchestrator};
use sst_core::{StoryLength, StoryRequest, Theme};

/// Write a silly children's story with an illustration, and optionally export it.
#[derive(Parser, Debug)]
#[command(name = "silly-story")]
struct Args {
    /// Name of the main character
    character: String,

    /// Where the story happens (e.g. "a treehouse")
    setting: String,

    /// Theme id: friendship, adventure, magic, animals, space, ocean, forest, school
    #[arg(long, default_value = "adventure")]
    theme: String,

    /// Lesson the story should end with
    #[arg(long)]
    moral: Option<String>,

    /// short, medium or long
    #[arg(long)]
    length: Option<StoryLength>,

    /// Another character joining the story; repeatable
    #[arg(long = "friend")]
    friends: Vec<String>,

    /// Export the story as PNG
    #[arg(long)]
    png: bool,

    /// Export the story as PDF
    #[arg(long)]
    pdf: bool,

    /// Where exports are written
    #[arg(long, env = "EXPORT_DIR")]
    out_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = AppConfig::load()?;
    if let Some(out_dir) = args.out_dir {
        config.export.out_dir = out_dir;
    }
    if Theme::from_id(&args.theme).is_none() {
        warn!("'{}' is not a known theme, the default image will be used", args.theme);
    }

    let (tx, rx) = channel();
    let orchestrator = Orchestrator::new(&config, LibraryLoader::global()).with_events(tx);
    let preload = orchestrator.start().await;

    let mut request = StoryRequest::new(args.character, args.setting, args.theme).with_participants(args.friends);
    if let Some(moral) = args.moral {
        request = request.with_moral(moral);
    }
    if let Some(length) = args.length {
        request = request.with_length(length);
    }

    let result = orchestrator.submit(request).await?;
    print_notices(&rx);

    println!("\n{}\n", result.text());
    if result.has_inline_image() {
        println!("Illustration: inline image ({} chars), {:?}", result.image_url().len(), result.source_of_image());
    } else {
        println!("Illustration: {} ({:?})", result.image_url(), result.source_of_image());
    }

    let formats = [(args.png, ExportFormat::Png), (args.pdf, ExportFormat::Pdf)];
    if formats.iter().any(|(wanted, _)| *wanted) {
        preload.await?;
    }

    for (_, format) in formats.into_iter().filter(|(wanted, _)| *wanted) {
        let path = match orchestrator.export(format).await {
            Ok(path) => path,
            Err(AppError::CapabilityUnavailable { capability, reason }) => {
                warn!("{} unavailable ({}), retrying once", capability, reason);
                orchestrator.retry_capability(capability).await?;
                orchestrator.export(format).await?
            }
            Err(e) => return Err(e.into()),
        };
        println!("Saved {} to {}", format, path.display());
    }
    print_notices(&rx);

    Ok(())
}

fn print_notices(rx: &Receiver<AppEvent>) {
    for event in rx.try_iter() {
        if let AppEvent::Notice(message) = event {
            println!("Note: {}", message);
        }
    }
}
