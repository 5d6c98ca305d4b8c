//! Run the pipeline end to end with synthetic frames and stub engines.
//!
//! Usage: cargo run --example basic_pipeline

use anyhow::Result;
use bytes::Bytes;
use drishti_cns::{EngineRegistry, PerceptionPipeline, PipelineConfig};
use drishti_core::{Frame, ModelFamily, OperatingMode, PipelineEvent};
use drishti_alert::LogPlaybackSink;
use drishti_percept::{
    EngineFault, InferenceEngine, RawDetection, RawOutput, StaticDeviceStatus, Tensor, TensorShape,
};
use std::sync::Arc;
use std::time::Duration;

/// Pretend detector: a person drifting from left to right.
struct DriftingPersonDetector {
    step: std::sync::atomic::AtomicU32,
}

impl InferenceEngine for DriftingPersonDetector {
    fn infer(&self, _input: &Tensor) -> Result<RawOutput, EngineFault> {
        let step = self
            .step
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let x = (step as f32 * 0.08) % 0.8;
        Ok(RawOutput {
            boxes: vec![RawDetection {
                class_id: 0,
                score: 0.91,
                x,
                y: 0.25,
                width: 0.18,
                height: 0.55,
            }],
            ..Default::default()
        })
    }

    fn input_shape(&self) -> TensorShape {
        TensorShape::image(64, 64, 3)
    }

    fn name(&self) -> &str {
        "drifting-person"
    }
}

fn synthetic_frame(tick: u32) -> Frame {
    let width = 64u32;
    let height = 64u32;
    let mut data = vec![0u8; (width * height * 3) as usize];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = ((i as u32 + tick * 7) % 200) as u8 + 20;
    }
    Frame::new(width, height, vec![Bytes::from(data)])
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = PipelineConfig::default();
    config.percept.fps_profile = drishti_percept::FpsProfile::High;
    config.alert.drain_interval_ms = 200;

    let device = Arc::new(StaticDeviceStatus::new(90, true));
    let pipeline = PerceptionPipeline::new(config, device.clone(), Arc::new(LogPlaybackSink))?;

    let mut registry = EngineRegistry::new();
    registry.register_engine(
        ModelFamily::Detector,
        Arc::new(DriftingPersonDetector {
            step: Default::default(),
        }),
    );
    pipeline.start(registry).await?;
    pipeline.set_mode(OperatingMode::ObjectDetection).await?;

    let mut events = pipeline.subscribe_events();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                PipelineEvent::Detections { detections, .. } => {
                    for d in detections {
                        println!(
                            "detected {} ({:.0}%) at {:?}",
                            d.label,
                            d.confidence * 100.0,
                            d.distance_feet
                        );
                    }
                }
                PipelineEvent::AlertPlayed(alert) => {
                    println!("alert: {}", alert.message);
                }
                other => println!("event: {:?}", other),
            }
        }
    });

    // Push camera frames faster than the target rate so the single-slot
    // handoff sheds some load, like a real camera would.
    for tick in 0..60 {
        pipeline.push_frame(synthetic_frame(tick));
        tokio::time::sleep(Duration::from_millis(50)).await;
        if tick == 30 {
            // Battery drops mid-run; the pipeline slows itself down
            device.set_battery_percent(12);
        }
    }

    let snapshot = pipeline.metrics_snapshot();
    println!(
        "processed {}/{} frames, {} dropped, {} alerts filtered, {:.1} fps",
        snapshot.frames_processed,
        snapshot.frames_received,
        snapshot.frames_dropped,
        snapshot.duplicates_filtered,
        snapshot.current_fps
    );

    pipeline.stop().await?;
    watcher.abort();
    Ok(())
}
