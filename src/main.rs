// Example runner for the `left_things` library.
//
// Usage: left_things [config.json] [frame_count]
//
// Feeds a synthetic scene into two streams of a `StreamPool`: an empty room
// for a while, then a bright box that is put down and never picked up. Time is
// simulated at one frame per second, so the learning phase and the supervision
// interval elapse without waiting. Reports that contain objects are printed as
// JSON.

use chrono::{DateTime, Duration, Utc};
use image::{Rgb, RgbImage};
use left_things::core_modules::clock::ManualClock;
use left_things::core_modules::context::AnalysisContext;
use left_things::{DetectorConfig, Frame, LeftThingsDetector, Report, StreamPool};
use std::env;
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

const FRAME_WIDTH: u32 = 160;
const FRAME_HEIGHT: u32 = 120;
const DEFAULT_FRAME_COUNT: u32 = 40;
const OBJECT_APPEARS_AT: u32 = 15;

fn synthetic_frame(index: u32, timestamp: DateTime<Utc>) -> Frame {
    let mut image = RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgb([70, 72, 75]));
    if index >= OBJECT_APPEARS_AT {
        for y in 40..80 {
            for x in 40..80 {
                image.put_pixel(x, y, Rgb([230, 200, 40]));
            }
        }
    }
    Frame::new(image, timestamp)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let config: DetectorConfig = match args.get(1) {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => DetectorConfig::default(),
    };
    let frame_count: u32 = args
        .get(2)
        .map(|raw| raw.parse())
        .transpose()?
        .unwrap_or(DEFAULT_FRAME_COUNT);

    let start = Utc::now();
    let clock = ManualClock::new(start);

    // The second stream analyses frames at half resolution.
    let mut minified = config.clone();
    minified.context = AnalysisContext {
        frame_minification: 2,
        ..config.context
    };
    let streams = [("lobby", config), ("platform", minified)];

    let mut pool = StreamPool::new();
    for (stream_id, stream_config) in &streams {
        let detector =
            LeftThingsDetector::new(stream_config.clone()).with_clock(Box::new(clock.clone()));
        pool.register(*stream_id, detector)?;
        pool.on(stream_id).await?;
    }

    info!(frames = frame_count, streams = pool.len(), "Left Things Engine - Example Runner");

    for index in 0..frame_count {
        let timestamp = start + Duration::seconds(index as i64);
        clock.set(timestamp);

        for (stream_id, _) in &streams {
            let report = pool
                .process_frame(stream_id, synthetic_frame(index, timestamp))
                .await?;
            match &report {
                Report::LeftThings(data) if !data.objects.is_empty() => {
                    println!("[{}] frame {}: {}", stream_id, index, report.to_json()?);
                }
                Report::Error(message) => {
                    println!("[{}] frame {}: error: {}", stream_id, index, message);
                }
                _ => {}
            }
        }
    }

    for (stream_id, _) in &streams {
        let settings = pool.get_settings(stream_id).await?;
        info!(stream = stream_id, ?settings, "final settings");
    }
    pool.shutdown().await;
    Ok(())
}
