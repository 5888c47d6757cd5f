use anyhow::{Result, anyhow};
use image::{Rgb, RgbImage};
use std::path::Path;
use std::sync::{Arc, Mutex};

use manga_localizer::geometry::Quad;
use manga_localizer::grouping::GroupingConfig;
use manga_localizer::inpaint::DiffusionInpainter;
use manga_localizer::mapping::{MalformedResponse, OutputFormat};
use manga_localizer::ocr::{Detection, OcrEngine};
use manga_localizer::pipeline::{PipelineOptions, Typesetter, process_chapter};
use manga_localizer::providers::{ChatClient, ProviderFuture, ProviderResponse};
use manga_localizer::typeset::FontSizing;
use manga_localizer::{TranslateOptions, Translator};

struct FakeOcr;

impl OcrEngine for FakeOcr {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn detect(&self, image_path: &Path) -> Result<Vec<Detection>> {
        let name = image_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        match name {
            "001.png" => Ok(vec![
                Detection {
                    polygon: Quad::from_rect(20.0, 20.0, 120.0, 18.0),
                    text: "HELLO".to_string(),
                },
                Detection {
                    polygon: Quad::from_rect(20.0, 42.0, 120.0, 18.0),
                    text: "FRIEND".to_string(),
                },
            ]),
            "002.png" => Err(anyhow!("engine crashed")),
            _ => Ok(Vec::new()),
        }
    }
}

#[derive(Clone)]
struct TestProvider {
    response: String,
    calls: Arc<Mutex<usize>>,
}

impl ChatClient for TestProvider {
    fn append_system_input(self, _input: String) -> Self {
        self
    }

    fn append_user_input(self, _input: String) -> Self {
        self
    }

    fn complete(self, _json: bool) -> ProviderFuture {
        *self.calls.lock().unwrap() += 1;
        let text = self.response;
        Box::pin(async move {
            Ok(ProviderResponse {
                text,
                model: Some("test".to_string()),
                usage: None,
            })
        })
    }
}

fn write_page(dir: &Path, name: &str) {
    let mut image = RgbImage::from_pixel(160, 120, Rgb([255, 255, 255]));
    for x in 25..130 {
        for y in 24..34 {
            image.put_pixel(x, y, Rgb([0, 0, 0]));
        }
    }
    image.save(dir.join(name)).expect("write page");
}

fn translator(response: &str, calls: Arc<Mutex<usize>>) -> Translator<TestProvider> {
    Translator::new(
        TestProvider {
            response: response.to_string(),
            calls,
        },
        TranslateOptions {
            target_language: "Thai".to_string(),
            source_language: "auto".to_string(),
            format: OutputFormat::Keyed,
            extra_prompt: None,
        },
    )
}

#[tokio::test]
async fn chapter_is_cleaned_and_typeset_page_by_page() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_page(dir.path(), "001.png");
    write_page(dir.path(), "002.png");
    write_page(dir.path(), "003.png");
    std::fs::write(dir.path().join("notes.txt"), "not a page").expect("write notes");

    let calls = Arc::new(Mutex::new(0));
    let translator = translator(r#"{"Hello friend": "สวัสดีเพื่อน"}"#, calls.clone());
    let typesetter = Typesetter::new(None, "#000000".to_string(), FontSizing::default(), 2);
    let inpainter = DiffusionInpainter::default();
    let options = PipelineOptions {
        grouping: GroupingConfig::default(),
        dilation_iterations: 1,
        inpainter: &inpainter,
        typesetter: &typesetter,
        debug_groups: true,
    };

    let report = process_chapter(dir.path(), &FakeOcr, &translator, &options)
        .await
        .expect("chapter");

    assert_eq!(*calls.lock().unwrap(), 1);
    assert_eq!(report.sentences, 1);
    assert_eq!(report.translated, 1);
    assert!(!report.count_mismatch);
    assert_eq!(report.model.as_deref(), Some("test"));
    assert_eq!(report.pages.len(), 3);

    let first = &report.pages[0];
    assert_eq!(first.file_name, "001.png");
    assert_eq!(first.groups, 1);
    assert_eq!(first.rendered, 1);
    assert!(first.error.is_none());

    let translated = dir.path().join("translated");
    assert!(translated.join("cleaned_001.png").exists());
    assert!(translated.join("final_001.png").exists());
    assert!(translated.join("groups_001.png").exists());

    let cleaned = image::open(translated.join("cleaned_001.png"))
        .expect("cleaned page")
        .to_rgb8();
    assert_eq!(cleaned.dimensions(), (160, 120));
    // the text stroke is filled from the white surroundings
    let Rgb([r, g, b]) = *cleaned.get_pixel(70, 28);
    assert!(r > 200 && g > 200 && b > 200);

    let failed = &report.pages[1];
    assert!(failed.error.as_deref().unwrap_or_default().contains("engine crashed"));
    assert!(!translated.join("final_002.png").exists());

    let empty = &report.pages[2];
    assert_eq!(empty.groups, 0);
    assert!(empty.error.is_none());
    assert!(translated.join("final_003.png").exists());
}

#[tokio::test]
async fn malformed_translation_aborts_before_writing() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_page(dir.path(), "001.png");

    let translator = translator("sorry, I cannot help", Arc::new(Mutex::new(0)));
    let typesetter = Typesetter::new(None, "#000000".to_string(), FontSizing::Fixed(12), 0);
    let inpainter = DiffusionInpainter::default();
    let options = PipelineOptions {
        grouping: GroupingConfig::default(),
        dilation_iterations: 2,
        inpainter: &inpainter,
        typesetter: &typesetter,
        debug_groups: false,
    };

    let err = process_chapter(dir.path(), &FakeOcr, &translator, &options)
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<MalformedResponse>().is_some());
    assert!(!dir.path().join("translated").exists());
}

#[tokio::test]
async fn missing_folder_is_a_configuration_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let translator = translator("{}", Arc::new(Mutex::new(0)));
    let typesetter = Typesetter::new(None, "#000000".to_string(), FontSizing::default(), 0);
    let inpainter = DiffusionInpainter::default();
    let options = PipelineOptions {
        grouping: GroupingConfig::default(),
        dilation_iterations: 2,
        inpainter: &inpainter,
        typesetter: &typesetter,
        debug_groups: false,
    };

    let err = process_chapter(&dir.path().join("missing"), &FakeOcr, &translator, &options)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("folder not found"));
}
