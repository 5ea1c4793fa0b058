//! Directory and archive providers against real files in a temp dir.

use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use zip::write::SimpleFileOptions;

use gallery_viewer::{
    ArchiveProvider, Config, DirectoryProvider, GalleryProvider, GalleryProviderListener, GallerySize, PageImage,
    Progress, Ticket,
};

const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum Event {
    Size(GallerySize),
    Wait(Ticket),
    Percent(Ticket, Progress),
    Succeed(Ticket, (u32, u32)),
    Failed(Ticket, String),
}

struct Recorder {
    tx: Sender<Event>,
}

impl GalleryProviderListener for Recorder {
    fn on_data_changed(&self, size: GallerySize) {
        let _ = self.tx.send(Event::Size(size));
    }
    fn on_page_changed(&self, _index: usize) {}
    fn on_page_wait(&self, ticket: Ticket) {
        let _ = self.tx.send(Event::Wait(ticket));
    }
    fn on_page_percent(&self, ticket: Ticket, progress: Progress) {
        let _ = self.tx.send(Event::Percent(ticket, progress));
    }
    fn on_page_succeed(&self, ticket: Ticket, image: PageImage) {
        let _ = self.tx.send(Event::Succeed(ticket, (image.width, image.height)));
    }
    fn on_page_failed(&self, ticket: Ticket, error: String) {
        let _ = self.tx.send(Event::Failed(ticket, error));
    }
}

fn attach(provider: &dyn GalleryProvider) -> Receiver<Event> {
    let (tx, rx) = crossbeam_channel::unbounded();
    provider.set_listener(Some(Arc::new(Recorder { tx })));
    provider.start();
    rx
}

/// Receive events until `pick` accepts one.
fn wait_for<T>(rx: &Receiver<Event>, mut pick: impl FnMut(&Event) -> Option<T>) -> T {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let event = rx.recv_timeout(left).expect("timed out waiting for provider event");
        if let Some(value) = pick(&event) {
            return value;
        }
    }
}

fn wait_size(rx: &Receiver<Event>) -> GallerySize {
    wait_for(rx, |e| match e {
        Event::Size(size) => Some(*size),
        _ => None,
    })
}

/// Terminal outcome for `index`: image dimensions or error text.
fn wait_page(rx: &Receiver<Event>, index: usize) -> Result<(u32, u32), String> {
    wait_for(rx, |e| match e {
        Event::Succeed(t, dims) if t.index == index => Some(Ok(*dims)),
        Event::Failed(t, error) if t.index == index => Some(Err(error.clone())),
        _ => None,
    })
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn write_file(path: &Path, bytes: &[u8]) {
    File::create(path).unwrap().write_all(bytes).unwrap();
}

fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    zip.add_directory("extras/", options).unwrap();
    for (name, bytes) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

#[test]
fn directory_pages_follow_natural_order() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("page10.png"), &png_bytes(10, 3));
    write_file(&dir.path().join("page2.png"), &png_bytes(2, 3));
    write_file(&dir.path().join("page1.png"), &png_bytes(1, 3));
    write_file(&dir.path().join("notes.txt"), b"not a page");
    std::fs::create_dir(dir.path().join("nested.png")).unwrap();

    let provider = DirectoryProvider::new(dir.path(), &Config::default());
    let rx = attach(&provider);
    assert_eq!(wait_size(&rx), GallerySize::Ready(3));

    for index in 0..3 {
        provider.request(index).unwrap();
    }
    let widths: Vec<u32> = (0..3).map(|index| wait_page(&rx, index).unwrap().0).collect();
    assert_eq!(widths, vec![1, 2, 10]);
    provider.stop();
}

#[test]
fn directory_request_reports_wait_then_percent() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("a.png"), &png_bytes(4, 4));

    let provider = DirectoryProvider::new(dir.path(), &Config::default());
    let rx = attach(&provider);
    wait_size(&rx);

    let generation = provider.request(0).unwrap();
    let mut seen_wait = false;
    let mut percents = Vec::new();
    let outcome = wait_for(&rx, |e| match e {
        Event::Wait(t) => {
            assert_eq!(t.generation, generation);
            seen_wait = true;
            None
        }
        Event::Percent(_, Progress::Percent(p)) => {
            percents.push(*p);
            None
        }
        Event::Succeed(t, dims) => Some((*t, *dims)),
        Event::Failed(_, error) => panic!("page failed: {error}"),
        _ => None,
    });

    assert!(seen_wait);
    assert!(percents.iter().all(|p| *p < 100.0));
    assert_eq!(outcome, (Ticket::new(0, generation), (4, 4)));
}

#[test]
fn empty_or_missing_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("readme.md"), b"# nothing here");

    let provider = DirectoryProvider::new(dir.path(), &Config::default());
    let rx = attach(&provider);
    assert_eq!(wait_size(&rx), GallerySize::Error);
    assert!(provider.error().unwrap().contains("no supported images"));
    assert!(provider.request(0).is_err());

    let missing = DirectoryProvider::new(dir.path().join("absent"), &Config::default());
    let rx = attach(&missing);
    assert_eq!(wait_size(&rx), GallerySize::Error);
    assert!(missing.error().is_some());
}

#[test]
fn archive_pages_skip_directories_and_other_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.cbz");
    write_zip(
        &path,
        &[
            ("chapter/11.png", png_bytes(11, 2)),
            ("chapter/9.png", png_bytes(9, 2)),
            ("chapter/info.txt", b"credits".to_vec()),
        ],
    );

    let provider = ArchiveProvider::new(&path, &Config::default());
    let rx = attach(&provider);
    assert_eq!(wait_size(&rx), GallerySize::Ready(2));

    provider.request(1).unwrap();
    provider.request(0).unwrap();
    assert_eq!(wait_page(&rx, 0), Ok((9, 2)));
    assert_eq!(wait_page(&rx, 1), Ok((11, 2)));
}

#[test]
fn corrupt_archive_entry_fails_only_that_page() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.zip");
    write_zip(
        &path,
        &[("01.png", png_bytes(3, 3)), ("02.png", b"definitely not a png".to_vec())],
    );

    let provider = ArchiveProvider::new(&path, &Config::default());
    let rx = attach(&provider);
    wait_size(&rx);

    provider.request(1).unwrap();
    assert!(wait_page(&rx, 1).is_err());
    provider.request(0).unwrap();
    assert_eq!(wait_page(&rx, 0), Ok((3, 3)));
    assert_eq!(provider.size(), GallerySize::Ready(2));
}

#[test]
fn unreadable_archive_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fake.zip");
    write_file(&path, b"PK but not really");

    let provider = ArchiveProvider::new(&path, &Config::default());
    let rx = attach(&provider);
    assert_eq!(wait_size(&rx), GallerySize::Error);
    assert!(provider.error().unwrap().contains("archive error"));
}

#[test]
fn nothing_is_delivered_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..4 {
        write_file(&dir.path().join(format!("{i}.png")), &png_bytes(8, 8));
    }

    let provider = DirectoryProvider::new(dir.path(), &Config::default());
    let rx = attach(&provider);
    wait_size(&rx);
    for index in 0..4 {
        provider.request(index).unwrap();
    }
    provider.stop();
    provider.stop();

    while rx.try_recv().is_ok() {}
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    assert!(provider.request(0).is_err());
}
