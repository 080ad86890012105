//! End-to-end batch job processing tests

mod common;

use clean_watermarks::{
    CollectingProgressReporter, InpaintingMethod, ProcessingOptions, ProcessingStatus,
    ProgressEvent, WatermarkProcessor,
};
use common::{
    jpeg_bytes, png_bytes, text_box, FlatFillFactory, MissingModelFactory, PanickingModelFactory,
    ScriptedRecognizerFactory, Workspace,
};
use image::Rgb;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// OCR-only detection so results do not depend on the logo heuristics
fn ocr_options(method: InpaintingMethod) -> ProcessingOptions {
    ProcessingOptions {
        logo_detection: false,
        inpainting_method: method,
        ..Default::default()
    }
}

fn band_recognizer() -> ScriptedRecognizerFactory {
    ScriptedRecognizerFactory::new(vec![text_box(20.0, 20.0, 60.0, 10.0, "SAMPLE", 0.9)])
}

#[tokio::test]
async fn test_batch_of_three_is_cleaned() {
    let workspace = Workspace::new();
    let processor = WatermarkProcessor::with_factories(
        workspace.settings(),
        Box::new(band_recognizer()),
        Box::new(FlatFillFactory::new(Rgb([0, 255, 0]))),
    )
    .unwrap();

    let job = processor
        .create_job(vec!["a.png".into(), "b.jpg".into(), "c.png".into()])
        .await
        .unwrap();
    processor
        .save_uploaded_files(
            &job.id,
            vec![
                ("a.png".into(), png_bytes(100, 50)),
                ("b.jpg".into(), jpeg_bytes(100, 50)),
                ("c.png".into(), png_bytes(100, 50)),
            ],
        )
        .await
        .unwrap();

    let report = processor
        .process_job(&job.id, ocr_options(InpaintingMethod::Lama))
        .await
        .unwrap();

    assert_eq!(report.status, ProcessingStatus::Completed);
    assert_eq!(report.completed_images, 3);
    assert_eq!(report.failed_images, 0);
    assert!((report.progress - 100.0).abs() < f64::EPSILON);
    assert!(report.download_ready);

    for task in &report.tasks {
        assert_eq!(task.status, ProcessingStatus::Completed);
        assert_eq!(task.regions.len(), 1);
        assert_eq!(task.regions[0].text.as_deref(), Some("SAMPLE"));
        assert!(task.processing_time_ms.is_some());
        assert!(task.completed_at.is_some());

        let output = task.processed_path.as_ref().unwrap();
        assert!(output.exists());
        assert!(output
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("cleaned_"));
        assert_eq!(
            processor.processed_image_path(&job.id, &task.id).await.as_ref(),
            Some(output)
        );
    }

    // PNG output is lossless, so the learned fill is visible exactly
    let png_task = report.tasks.iter().find(|t| t.filename == "a.png").unwrap();
    let cleaned = image::open(png_task.processed_path.as_ref().unwrap())
        .unwrap()
        .to_rgb8();
    assert_eq!(cleaned.dimensions(), (100, 50));
    assert_eq!(*cleaned.get_pixel(50, 25), Rgb([0, 255, 0]));
    assert_eq!(*cleaned.get_pixel(2, 2), Rgb([40, 50, 60]));
}

#[tokio::test]
async fn test_corrupt_upload_fails_alone() {
    let workspace = Workspace::new();
    let processor = workspace.processor();

    let job = processor
        .create_job(vec!["good.png".into(), "bad.png".into()])
        .await
        .unwrap();
    processor
        .save_uploaded_files(
            &job.id,
            vec![
                ("good.png".into(), png_bytes(40, 40)),
                ("bad.png".into(), b"definitely not a png".to_vec()),
            ],
        )
        .await
        .unwrap();

    let report = processor
        .process_job(&job.id, ocr_options(InpaintingMethod::Telea))
        .await
        .unwrap();

    assert_eq!(report.status, ProcessingStatus::Completed);
    assert_eq!(report.completed_images, 1);
    assert_eq!(report.failed_images, 1);
    assert!((report.progress - 100.0).abs() < f64::EPSILON);

    let bad = report.tasks.iter().find(|t| t.filename == "bad.png").unwrap();
    assert_eq!(bad.status, ProcessingStatus::Failed);
    assert!(bad.error.as_ref().unwrap().contains("Failed to load image"));
    assert!(bad.processed_path.is_none());

    let good = report.tasks.iter().find(|t| t.filename == "good.png").unwrap();
    assert_eq!(good.status, ProcessingStatus::Completed);
    // No detections and no manual regions: the image is saved unchanged
    assert!(good.regions.is_empty());
    assert!(good.processed_path.as_ref().unwrap().exists());
}

#[tokio::test]
async fn test_job_fails_when_every_task_fails() {
    let workspace = Workspace::new();
    let processor = workspace.processor();

    let job = processor
        .create_job(vec!["x.png".into(), "y.png".into()])
        .await
        .unwrap();
    processor
        .save_uploaded_files(
            &job.id,
            vec![("x.png".into(), vec![0; 16]), ("y.png".into(), vec![1; 16])],
        )
        .await
        .unwrap();

    let report = processor
        .process_job(&job.id, ProcessingOptions::default())
        .await
        .unwrap();

    assert_eq!(report.status, ProcessingStatus::Failed);
    assert_eq!(report.failed_images, 2);
    assert_eq!(report.completed_images, 0);
    assert!(!report.download_ready);
    assert!(report.tasks.iter().all(|t| t.error.is_some()));

    let stored = processor.get_job(&job.id).await.unwrap();
    assert_eq!(stored.status, ProcessingStatus::Failed);
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn test_reporter_receives_lifecycle_events() {
    let workspace = Workspace::new();
    let reporter = Arc::new(CollectingProgressReporter::new());
    let processor = workspace.processor().with_reporter(reporter.clone());

    let job = processor
        .create_job(vec!["one.png".into(), "two.png".into()])
        .await
        .unwrap();
    processor
        .save_uploaded_files(
            &job.id,
            vec![
                ("one.png".into(), png_bytes(30, 30)),
                ("two.png".into(), b"broken".to_vec()),
            ],
        )
        .await
        .unwrap();
    processor
        .process_job(&job.id, ocr_options(InpaintingMethod::Ns))
        .await
        .unwrap();

    let events = reporter.events();
    assert!(matches!(
        events.first(),
        Some(ProgressEvent::JobStarted { total_images: 2, .. })
    ));
    match events.last() {
        Some(ProgressEvent::JobCompleted(report)) => {
            assert_eq!(report.job_id, job.id);
            assert_eq!(report.completed_images, 1);
            assert_eq!(report.failed_images, 1);
        },
        other => panic!("expected JobCompleted last, got {other:?}"),
    }

    let started = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::TaskStarted { .. }))
        .count();
    assert_eq!(started, 2);
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::TaskCompleted(outcome) if outcome.filename == "one.png"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::TaskFailed { filename, .. } if filename == "two.png"
    )));
}

#[tokio::test]
async fn test_lama_falls_back_when_model_missing() {
    let workspace = Workspace::new();
    let model_factory = MissingModelFactory::new();
    let attempts = Arc::clone(&model_factory.attempts);
    let processor = WatermarkProcessor::with_factories(
        workspace.settings(),
        Box::new(band_recognizer()),
        Box::new(model_factory),
    )
    .unwrap();

    let job = processor
        .create_job(vec!["p.png".into(), "q.png".into()])
        .await
        .unwrap();
    processor
        .save_uploaded_files(
            &job.id,
            vec![
                ("p.png".into(), png_bytes(100, 50)),
                ("q.png".into(), png_bytes(100, 50)),
            ],
        )
        .await
        .unwrap();

    let report = processor
        .process_job(&job.id, ocr_options(InpaintingMethod::Lama))
        .await
        .unwrap();

    assert_eq!(report.status, ProcessingStatus::Completed);
    assert_eq!(report.completed_images, 2);
    // A failed load is remembered rather than retried per image
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(!processor.models_loaded().inpainting);

    let task = &report.tasks[0];
    let cleaned = image::open(task.processed_path.as_ref().unwrap())
        .unwrap()
        .to_rgb8();
    // The classical fill pulls the bright band towards the dark surroundings
    assert!(cleaned.get_pixel(50, 25)[0] < 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_model_panic_fails_one_image_and_disables_model() {
    let workspace = Workspace::new();
    let processor = WatermarkProcessor::with_factories(
        workspace.settings(),
        Box::new(band_recognizer()),
        Box::new(PanickingModelFactory),
    )
    .unwrap();

    let job = processor
        .create_job(vec!["p.png".into(), "q.png".into()])
        .await
        .unwrap();
    processor
        .save_uploaded_files(
            &job.id,
            vec![
                ("p.png".into(), png_bytes(100, 50)),
                ("q.png".into(), png_bytes(100, 50)),
            ],
        )
        .await
        .unwrap();

    let report = processor
        .process_job(&job.id, ocr_options(InpaintingMethod::Lama))
        .await
        .unwrap();

    assert_eq!(report.status, ProcessingStatus::Completed);
    assert_eq!(report.completed_images, 1);
    assert_eq!(report.failed_images, 1);
    let failed = report
        .tasks
        .iter()
        .find(|t| t.status == ProcessingStatus::Failed)
        .unwrap();
    assert!(failed.error.as_ref().unwrap().contains("worker failed"));
    let cleaned = report
        .tasks
        .iter()
        .find(|t| t.status == ProcessingStatus::Completed)
        .unwrap();
    assert!(cleaned.processed_path.as_ref().unwrap().exists());
    assert!(!processor.models_loaded().inpainting);
}

#[tokio::test]
async fn test_ocr_engine_created_once_per_processor() {
    let workspace = Workspace::new();
    let recognizer_factory = band_recognizer();
    let created = Arc::clone(&recognizer_factory.created);
    let processor = WatermarkProcessor::with_factories(
        workspace.settings(),
        Box::new(recognizer_factory),
        Box::new(FlatFillFactory::new(Rgb([0, 0, 255]))),
    )
    .unwrap();
    assert!(!processor.models_loaded().ocr);

    let names: Vec<String> = (0..4).map(|i| format!("img{i}.png")).collect();
    let job = processor.create_job(names.clone()).await.unwrap();
    processor
        .save_uploaded_files(
            &job.id,
            names.iter().map(|n| (n.clone(), png_bytes(100, 50))).collect(),
        )
        .await
        .unwrap();
    let report = processor
        .process_job(&job.id, ocr_options(InpaintingMethod::Lama))
        .await
        .unwrap();

    assert_eq!(report.completed_images, 4);
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(processor.models_loaded().ocr);
    assert!(processor.models_loaded().inpainting);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_jobs_run_concurrently_on_shared_pool() {
    let workspace = Workspace::new();
    let processor = Arc::new(workspace.processor());

    let mut job_ids = Vec::new();
    for batch in 0..2 {
        let names: Vec<String> = (0..3).map(|i| format!("b{batch}_{i}.png")).collect();
        let job = processor.create_job(names.clone()).await.unwrap();
        processor
            .save_uploaded_files(
                &job.id,
                names.iter().map(|n| (n.clone(), png_bytes(32, 32))).collect(),
            )
            .await
            .unwrap();
        job_ids.push(job.id);
    }

    let first = {
        let processor = Arc::clone(&processor);
        let id = job_ids[0].clone();
        tokio::spawn(async move {
            processor
                .process_job(&id, ocr_options(InpaintingMethod::Telea))
                .await
        })
    };
    let second = {
        let processor = Arc::clone(&processor);
        let id = job_ids[1].clone();
        tokio::spawn(async move {
            processor
                .process_job(&id, ocr_options(InpaintingMethod::Advanced))
                .await
        })
    };

    let (first, second) = tokio::join!(first, second);
    for report in [first.unwrap().unwrap(), second.unwrap().unwrap()] {
        assert_eq!(report.status, ProcessingStatus::Completed);
        assert_eq!(report.completed_images, 3);
    }

    let mut listed = processor.list_jobs().await;
    listed.sort();
    job_ids.sort();
    assert_eq!(listed, job_ids);
}

#[tokio::test]
async fn test_duplicate_upload_names_are_kept_apart() {
    let workspace = Workspace::new();
    let processor = workspace.processor();

    let job = processor
        .create_job(vec!["dup.png".into(), "dup.png".into()])
        .await
        .unwrap();
    let stored = processor
        .save_uploaded_files(
            &job.id,
            vec![
                ("dup.png".into(), png_bytes(20, 20)),
                ("dup.png".into(), png_bytes(24, 24)),
            ],
        )
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert_ne!(stored[0], stored[1]);

    let report = processor
        .process_job(&job.id, ocr_options(InpaintingMethod::Telea))
        .await
        .unwrap();
    assert_eq!(report.completed_images, 2);

    let outputs: Vec<_> = report
        .tasks
        .iter()
        .map(|t| t.processed_path.clone().unwrap())
        .collect();
    assert_ne!(outputs[0], outputs[1]);
    let sizes: Vec<_> = outputs
        .iter()
        .map(|p| image::image_dimensions(p).unwrap())
        .collect();
    assert!(sizes.contains(&(20, 20)));
    assert!(sizes.contains(&(24, 24)));
}

#[tokio::test]
async fn test_cleanup_removes_files_and_registry_entry() {
    let workspace = Workspace::new();
    let processor = workspace.processor();

    let job = processor.create_job(vec!["z.png".into()]).await.unwrap();
    processor
        .save_uploaded_files(&job.id, vec![("z.png".into(), png_bytes(16, 16))])
        .await
        .unwrap();
    processor
        .process_job(&job.id, ocr_options(InpaintingMethod::Telea))
        .await
        .unwrap();

    let upload_dir = processor.storage().upload_dir(&job.id);
    let output_dir = processor.storage().output_dir(&job.id);
    assert!(upload_dir.exists());
    assert!(output_dir.exists());

    assert!(processor.cleanup_job(&job.id).await.unwrap());
    assert!(!upload_dir.exists());
    assert!(!output_dir.exists());
    assert!(processor.get_job(&job.id).await.is_none());

    assert!(!processor.cleanup_job(&job.id).await.unwrap());
}
