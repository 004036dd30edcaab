//! Integration tests for the logo stamping library

use image::{Rgba, RgbaImage};
use lopdf::{dictionary, Document, Object, Stream};
use pdf_logo_stamp::batch::{
    run_batch, run_batch_with_cancel, watermark_pdf, BatchObserver, BatchResult, CancelToken,
    FailureKind, FileOutcome, OUTPUT_DIR_NAME,
};
use pdf_logo_stamp::pdf::{count_pages, extract_metadata, OverlayBuilder};
use pdf_logo_stamp::{Corner, Error, PageGeometry, WatermarkSpec};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write a PDF with one text page per MediaBox
fn write_pdf(path: &Path, media_boxes: &[[f32; 4]]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for (i, media_box) in media_boxes.iter().enumerate() {
        let text = format!("BT /F1 24 Tf 72 400 Td (Page {}) Tj ET", i + 1);
        let content_id = doc.add_object(Stream::new(dictionary! {}, text.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => media_box.iter().map(|&v| Object::Real(v)).collect::<Vec<_>>(),
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(path).expect("Failed to write fixture PDF");
}

const LETTER: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// 100×50 logo with a transparent border so it carries an alpha channel
fn write_logo(dir: &Path) -> PathBuf {
    let mut img = RgbaImage::from_pixel(100, 50, Rgba([20, 60, 160, 255]));
    for x in 0..100 {
        img.put_pixel(x, 0, Rgba([0, 0, 0, 0]));
    }
    let path = dir.join("logo.png");
    img.save(&path).expect("Failed to write logo");
    path
}

fn output_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir.join(OUTPUT_DIR_NAME))
        .expect("Output directory missing")
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Decompressed content of the overlay form on the given page
fn overlay_form_content(doc: &Document, page_number: u32) -> String {
    let page_id = doc.get_pages()[&page_number];
    let page = doc.get_dictionary(page_id).unwrap();
    let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
    let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
    let form_id = xobjects.get(b"WmLogo").unwrap().as_reference().unwrap();

    match doc.get_object(form_id).unwrap() {
        Object::Stream(stream) => {
            let bytes = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            String::from_utf8(bytes).unwrap()
        }
        other => panic!("expected form stream, got {:?}", other),
    }
}

#[derive(Default)]
struct Recorder {
    progress: Vec<(usize, usize)>,
    results: Vec<(String, FileOutcome)>,
    complete_calls: usize,
    final_counts: Option<(usize, usize)>,
}

impl BatchObserver for Recorder {
    fn on_progress(&mut self, completed: usize, total: usize) {
        self.progress.push((completed, total));
    }

    fn on_file_result(&mut self, filename: &str, outcome: &FileOutcome) {
        self.results.push((filename.to_string(), outcome.clone()));
    }

    fn on_batch_complete(&mut self, result: &BatchResult) {
        self.complete_calls += 1;
        self.final_counts = Some((result.completed(), result.total()));
    }
}

#[test]
fn test_two_files_two_corners() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let logo = write_logo(dir.path());
    write_pdf(&dir.path().join("a.pdf"), &[LETTER]);
    write_pdf(&dir.path().join("b.pdf"), &[LETTER, LETTER]);

    let spec = WatermarkSpec::new(logo, [Corner::TopRight, Corner::BottomLeft]);
    let result = run_batch(dir.path(), &spec, &mut ()).expect("Batch failed");

    assert_eq!(result.total(), 2);
    assert_eq!(result.succeeded(), 2);

    let out_a = dir.path().join(OUTPUT_DIR_NAME).join("a_watermarked.pdf");
    let out_b = dir.path().join(OUTPUT_DIR_NAME).join("b_watermarked.pdf");
    assert_eq!(count_pages(&out_a).unwrap(), 1);
    assert_eq!(count_pages(&out_b).unwrap(), 2);

    for (path, pages) in [(&out_a, 1u32), (&out_b, 2u32)] {
        let doc = Document::load(path).unwrap();
        for page in 1..=pages {
            let content = overlay_form_content(&doc, page);
            assert!(content.contains("100 0 0 50 512 742 cm"), "top-right missing: {}", content);
            assert!(content.contains("100 0 0 50 0 0 cm"), "bottom-left missing: {}", content);
            assert_eq!(content.matches("Do").count(), 2);
        }
    }

    match result.get("b.pdf") {
        Some(FileOutcome::Done { output, pages }) => {
            assert_eq!(output, &out_b);
            assert_eq!(*pages, 2);
        }
        other => panic!("expected b.pdf to succeed, got {:?}", other),
    }
}

#[test]
fn test_round_trip_preserves_page_count_and_sizes() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let logo = write_logo(dir.path());
    let boxes = [
        LETTER,
        [0.0, 0.0, 595.276, 841.89],
        [0.0, 0.0, 792.0, 612.0],
        [36.0, 36.0, 648.0, 828.0],
    ];
    write_pdf(&dir.path().join("mixed.pdf"), &boxes);

    let spec = WatermarkSpec::new(logo, Corner::ALL).with_margin(10.0);
    let result = run_batch(dir.path(), &spec, &mut ()).expect("Batch failed");
    assert!(result.is_success());

    let input = extract_metadata(&dir.path().join("mixed.pdf")).unwrap();
    let output = extract_metadata(
        &dir.path().join(OUTPUT_DIR_NAME).join("mixed_watermarked.pdf"),
    )
    .unwrap();

    assert_eq!(output.page_count, input.page_count);
    assert_eq!(output.pages, input.pages);
    assert_eq!(output.pages[3], PageGeometry { x: 36.0, y: 36.0, width: 612.0, height: 792.0 });
}

#[test]
fn test_original_content_survives_under_overlay() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let logo = write_logo(dir.path());
    let input = dir.path().join("single.pdf");
    let output = dir.path().join("single_out.pdf");
    write_pdf(&input, &[LETTER]);

    let spec = WatermarkSpec::new(&logo, [Corner::TopLeft]);
    let logo = spec.load_logo().unwrap();
    let builder = OverlayBuilder::new(&logo, &spec).unwrap();
    let pages = watermark_pdf(&input, &output, &builder).expect("Watermark failed");
    assert_eq!(pages, 1);

    let doc = Document::load(&output).unwrap();
    let page_id = doc.get_pages()[&1];
    let content = String::from_utf8(doc.get_page_content(page_id).unwrap()).unwrap();
    let text = content.find("(Page 1) Tj").expect("original text missing");
    let stamp = content.find("/WmLogo Do").expect("overlay invocation missing");
    assert!(text < stamp, "overlay must be drawn after the original content");

    let resources = doc
        .get_dictionary(page_id)
        .unwrap()
        .get(b"Resources")
        .unwrap()
        .as_dict()
        .unwrap();
    assert!(resources.get(b"Font").unwrap().as_dict().unwrap().has(b"F1"));
}

#[test]
fn test_rerun_is_idempotent() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let logo = write_logo(dir.path());
    write_pdf(&dir.path().join("one.pdf"), &[LETTER]);
    write_pdf(&dir.path().join("two.pdf"), &[LETTER, LETTER]);
    let spec = WatermarkSpec::new(logo, [Corner::BottomRight]);

    run_batch(dir.path(), &spec, &mut ()).expect("First run failed");
    let first_names = output_names(dir.path());
    let first_bytes = fs::read(dir.path().join(OUTPUT_DIR_NAME).join("two_watermarked.pdf")).unwrap();

    run_batch(dir.path(), &spec, &mut ()).expect("Second run failed");
    let second_names = output_names(dir.path());
    let second_bytes = fs::read(dir.path().join(OUTPUT_DIR_NAME).join("two_watermarked.pdf")).unwrap();

    assert_eq!(first_names, vec!["one_watermarked.pdf", "two_watermarked.pdf"]);
    assert_eq!(first_names, second_names);
    assert_eq!(first_bytes, second_bytes);
}

#[test]
fn test_corrupt_file_does_not_stop_batch() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let logo = write_logo(dir.path());
    write_pdf(&dir.path().join("first.pdf"), &[LETTER]);
    fs::write(dir.path().join("middle.pdf"), b"this is not really a pdf").unwrap();
    write_pdf(&dir.path().join("last.pdf"), &[LETTER, LETTER, LETTER]);

    let spec = WatermarkSpec::new(logo, [Corner::TopLeft]);
    let mut recorder = Recorder::default();
    let result = run_batch(dir.path(), &spec, &mut recorder).expect("Batch failed");

    assert_eq!(result.succeeded(), 2);
    assert_eq!(result.failed(), 1);
    assert!(matches!(
        result.get("middle.pdf"),
        Some(FileOutcome::Failed { kind: FailureKind::Read, .. })
    ));

    let failures: Vec<_> = result.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "middle.pdf");
    assert!(!failures[0].1.is_empty());

    let out = dir.path().join(OUTPUT_DIR_NAME);
    assert!(out.join("first_watermarked.pdf").exists());
    assert!(out.join("last_watermarked.pdf").exists());
    assert!(!out.join("middle_watermarked.pdf").exists());

    let order: Vec<&str> = recorder.results.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(order, vec!["first.pdf", "last.pdf", "middle.pdf"]);
}

#[test]
fn test_degenerate_page_fails_only_that_file() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let logo = write_logo(dir.path());
    write_pdf(&dir.path().join("flat.pdf"), &[LETTER, [0.0, 0.0, 612.0, 0.0]]);
    write_pdf(&dir.path().join("good.pdf"), &[LETTER]);

    let spec = WatermarkSpec::new(logo, [Corner::TopLeft]);
    let result = run_batch(dir.path(), &spec, &mut ()).expect("Batch failed");

    match result.get("flat.pdf") {
        Some(FileOutcome::Failed { kind, reason, .. }) => {
            assert_eq!(*kind, FailureKind::Page);
            assert!(reason.contains("Page 2"), "unexpected reason: {}", reason);
        }
        other => panic!("expected page failure, got {:?}", other),
    }
    assert!(result.get("good.pdf").unwrap().is_done());
    assert!(!dir.path().join(OUTPUT_DIR_NAME).join("flat_watermarked.pdf").exists());
}

#[test]
fn test_progress_is_monotonic_and_reaches_total_once() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let logo = write_logo(dir.path());
    for name in ["a.pdf", "b.pdf", "c.pdf"] {
        write_pdf(&dir.path().join(name), &[LETTER]);
    }

    let spec = WatermarkSpec::new(logo, [Corner::BottomLeft]);
    let mut recorder = Recorder::default();
    run_batch(dir.path(), &spec, &mut recorder).expect("Batch failed");

    assert_eq!(recorder.progress, vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!(recorder.complete_calls, 1);
    assert_eq!(recorder.final_counts, Some((3, 3)));
}

#[test]
fn test_empty_directory() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let logo = write_logo(dir.path());
    fs::write(dir.path().join("readme.txt"), b"no pdfs here").unwrap();

    let spec = WatermarkSpec::new(logo, [Corner::TopRight]);
    let mut recorder = Recorder::default();
    let result = run_batch(dir.path(), &spec, &mut recorder).expect("Batch failed");

    assert!(result.is_empty());
    assert_eq!(recorder.complete_calls, 1);
    assert_eq!(recorder.final_counts, Some((0, 0)));
    assert!(recorder.progress.is_empty());
}

#[test]
fn test_cancel_skips_remaining_files() {
    struct CancelAfterFirst(CancelToken);

    impl BatchObserver for CancelAfterFirst {
        fn on_progress(&mut self, _completed: usize, _total: usize) {
            self.0.cancel();
        }
    }

    let dir = TempDir::new().expect("Failed to create temp directory");
    let logo = write_logo(dir.path());
    for name in ["a.pdf", "b.pdf", "c.pdf"] {
        write_pdf(&dir.path().join(name), &[LETTER]);
    }

    let token = CancelToken::new();
    let mut observer = CancelAfterFirst(token.clone());
    let spec = WatermarkSpec::new(logo, [Corner::TopLeft]);
    let result = run_batch_with_cancel(dir.path(), &spec, &mut observer, &token).unwrap();

    assert!(result.get("a.pdf").unwrap().is_done());
    assert!(result.get("b.pdf").unwrap().is_skipped());
    assert!(result.get("c.pdf").unwrap().is_skipped());
    assert_eq!(result.completed(), 3);
    assert_eq!(output_names(dir.path()), vec!["a_watermarked.pdf"]);
}

#[test]
fn test_missing_logo_fails_before_touching_files() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    write_pdf(&dir.path().join("a.pdf"), &[LETTER]);

    let spec = WatermarkSpec::new(dir.path().join("missing.png"), [Corner::TopLeft]);
    let result = run_batch(dir.path(), &spec, &mut ());

    match result {
        Err(e) => {
            assert!(e.is_configuration());
            assert!(matches!(e, Error::LogoNotFound(_)));
        }
        Ok(_) => panic!("Should fail with missing logo"),
    }
    assert!(!dir.path().join(OUTPUT_DIR_NAME).exists());
}

#[test]
fn test_undecodable_logo_is_configuration_error() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let logo = dir.path().join("logo.png");
    fs::write(&logo, b"definitely not a png").unwrap();

    let spec = WatermarkSpec::new(logo, [Corner::TopLeft]);
    let result = run_batch(dir.path(), &spec, &mut ());

    assert!(matches!(result, Err(Error::LogoDecode { .. })));
}

#[test]
fn test_logo_is_embedded_once_per_document() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let logo = write_logo(dir.path());
    write_pdf(&dir.path().join("long.pdf"), &[LETTER; 10]);

    let spec = WatermarkSpec::new(logo, [Corner::TopLeft, Corner::BottomRight]);
    let result = run_batch(dir.path(), &spec, &mut ()).expect("Batch failed");
    assert!(result.is_success());

    let doc = Document::load(dir.path().join(OUTPUT_DIR_NAME).join("long_watermarked.pdf")).unwrap();
    let images = doc
        .objects
        .values()
        .filter(|obj| match obj {
            Object::Stream(stream) => stream
                .dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .map(|name| name == b"Image")
                .unwrap_or(false),
            _ => false,
        })
        .count();

    // The logo and its soft mask
    assert_eq!(images, 2);
}

#[test]
fn test_indirect_contents_array_keeps_page_text() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let logo = write_logo(dir.path());

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let text_id = doc.add_object(Stream::new(
        dictionary! {},
        b"BT /F1 12 Tf 72 720 Td (Hello) Tj ET".to_vec(),
    ));
    let contents_id = doc.add_object(Object::Array(vec![Object::Reference(text_id)]));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => contents_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => 1,
            "Kids" => vec![Object::Reference(page_id)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(dir.path().join("nested.pdf")).unwrap();

    let spec = WatermarkSpec::new(logo, [Corner::TopRight]);
    let result = run_batch(dir.path(), &spec, &mut ()).expect("Batch failed");
    assert!(result.get("nested.pdf").unwrap().is_done());

    let output = Document::load(dir.path().join(OUTPUT_DIR_NAME).join("nested_watermarked.pdf")).unwrap();
    let page_id = output.get_pages()[&1];
    let content = String::from_utf8(output.get_page_content(page_id).unwrap()).unwrap();
    let hello = content.find("(Hello) Tj").expect("original text lost from page content");
    let stamp = content.find("/WmLogo Do").expect("overlay invocation missing");
    assert!(hello < stamp);
}
