//! Gallery Viewer
//! Built with Rust + egui (eframe)

use std::path::Path;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gallery_viewer::ui::{GalleryApp, PageSurface};
use gallery_viewer::{Config, GalleryController, GalleryInfo, GallerySource, SessionParams};

#[cfg(feature = "mimalloc-allocator")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const USAGE: &str = "usage: gallery-viewer [--dir <path> | --archive <path> | --remote <gallery-url> | <path>]";

/// Exit status for unusable command lines.
const EXIT_USAGE: i32 = 2;

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gallery_viewer=info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let source = match parse_args(&args) {
        Ok(source) => source,
        Err(message) => {
            error!("{message}");
            eprintln!("{USAGE}");
            std::process::exit(EXIT_USAGE);
        }
    };

    let config = Config::load();
    let title = window_title(&source);
    let controller: GalleryController<PageSurface> = match GalleryController::open(source, &config) {
        Ok(controller) => controller,
        Err(err) => {
            error!(error = %err, "could not open gallery");
            std::process::exit(EXIT_USAGE);
        }
    };
    info!(%title, "starting viewer");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(&title)
            .with_min_inner_size([320.0, 240.0])
            .with_inner_size([900.0, 1200.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Gallery Viewer",
        options,
        Box::new(move |cc| Ok(Box::new(GalleryApp::new(cc, controller, config, title)))),
    )
}

/// Turn the command line into a gallery source.
fn parse_args(args: &[String]) -> Result<GallerySource, String> {
    let mut params = SessionParams::default();
    let mut bare: Option<&str> = None;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{flag} needs a value"))
        };
        match arg.as_str() {
            "--dir" | "-d" => params.directory = Some(value("--dir")?),
            "--archive" | "-a" => params.archive = Some(value("--archive")?),
            "--remote" | "-r" => {
                let url = value("--remote")?;
                let info = GalleryInfo::from_url(&url).map_err(|e| e.to_string())?;
                params.gallery = Some(info);
            }
            flag if flag.starts_with('-') => return Err(format!("unknown option {flag}")),
            path if bare.is_none() => bare = Some(path),
            extra => return Err(format!("unexpected argument {extra}")),
        }
    }

    let flagged = params.directory.is_some() || params.archive.is_some() || params.gallery.is_some();
    match (bare, flagged) {
        (Some(_), true) => Err("give either a path or one of --dir/--archive/--remote".to_string()),
        (Some(path), false) => Ok(GallerySource::from_path(path)),
        (None, _) => GallerySource::from_params(params).map_err(|e| e.to_string()),
    }
}

fn window_title(source: &GallerySource) -> String {
    let name = |path: &Path| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    };
    match source {
        GallerySource::Directory(path) | GallerySource::Archive(path) => name(path),
        GallerySource::Remote(info) => info
            .title()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Gallery {}", info.gid())),
    }
}
