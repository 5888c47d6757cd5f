use manga_localizer::geometry::Quad;
use manga_localizer::grouping::{GroupingConfig, group_detections};
use manga_localizer::mapping::{OutputFormat, map_translations, parse_payload};
use manga_localizer::ocr::Detection;
use manga_localizer::region::typeset_region;
use manga_localizer::sentences::SentenceBatch;
use manga_localizer::typeset::{EstimatedMetrics, FontSizing, TextMeasure, plan_region};

fn detection(x: f32, y: f32, w: f32, h: f32, text: &str) -> Detection {
    Detection {
        polygon: Quad::from_rect(x, y, w, h),
        text: text.to_string(),
    }
}

fn page() -> Vec<Detection> {
    // listed out of reading order on purpose
    vec![
        detection(400.0, 500.0, 110.0, 20.0, "WHO ARE YOU?"),
        detection(100.0, 150.0, 120.0, 20.0, "DERFUL DAY"),
        detection(100.0, 100.0, 120.0, 20.0, "HELLO THERE,"),
        detection(104.0, 125.0, 90.0, 20.0, "WON-"),
    ]
}

#[test]
fn detections_flow_into_fitted_render_plans() {
    let groups = group_detections(page(), &GroupingConfig::default());
    assert_eq!(groups.len(), 2);
    assert_eq!(
        groups[0].texts(),
        vec!["HELLO THERE,", "WON-", "DERFUL DAY"]
    );

    let batch = SentenceBatch::from_pages([groups.as_slice()]);
    assert_eq!(
        batch.sentences,
        vec!["Hello there, wonderful day", "Who are you?"]
    );

    let payload = parse_payload(
        r#"```json
{"Hello there, wonderful day": "สวัสดี วันที่ดี"}
```"#,
        OutputFormat::Keyed,
    )
    .expect("keyed payload");
    let mapped = map_translations(&batch.sentences, payload);
    assert!(mapped.count_matches);
    assert_eq!(mapped.fallbacks, 1);
    assert_eq!(mapped.texts, vec!["สวัสดี วันที่ดี", "Who are you?"]);

    let measure = EstimatedMetrics;
    for (group, text) in groups.iter().zip(&mapped.texts) {
        let region = typeset_region(&group.polygons(), 2).expect("region survives padding");
        let plan = plan_region(text, region, FontSizing::default(), &measure).expect("plan");
        assert!(!plan.overflow, "'{}' should fit {:?}", text, region);
        assert!(!plan.lines.is_empty());

        let font_size = plan.font_size as f32;
        let mut total_height = 0.0;
        for line in &plan.lines {
            let extent = measure.measure(&line.text, font_size);
            assert!(extent.width <= region.width() as f32);
            assert!(line.x >= region.min_x as f32);
            assert!(line.x + line.width <= region.max_x as f32 + 0.01);
            total_height += extent.height;
        }
        assert!(total_height <= region.height() as f32);
        let top = plan.lines[0].y;
        let bottom = top + total_height;
        let above = top - region.min_y as f32;
        let below = region.max_y as f32 - bottom;
        assert!((above - below).abs() < 0.01);
    }
}

#[test]
fn collapsed_regions_are_skipped_not_errors() {
    let groups = group_detections(page(), &GroupingConfig::default());
    // the first balloon is 70px tall, the second 20px
    assert!(typeset_region(&groups[0].polygons(), 30).is_some());
    assert!(typeset_region(&groups[1].polygons(), 10).is_none());
    assert!(typeset_region(&groups[0].polygons(), 35).is_none());
}

#[test]
fn short_line_reply_maps_positionally_across_pages() {
    let first = group_detections(page(), &GroupingConfig::default());
    let second = group_detections(
        vec![detection(10.0, 10.0, 50.0, 20.0, "AH!")],
        &GroupingConfig::default(),
    );
    let batch = SentenceBatch::from_pages([first.as_slice(), second.as_slice()]);
    assert_eq!(batch.len(), 3);

    let payload = parse_payload("หนึ่ง\n\nสอง\n", OutputFormat::Lines).expect("lines");
    let mapped = map_translations(&batch.sentences, payload);
    assert!(!mapped.count_matches);
    assert_eq!(batch.page_slice(0, &mapped.texts), ["หนึ่ง", "สอง"]);
    assert!(batch.page_slice(1, &mapped.texts).is_empty());
}
