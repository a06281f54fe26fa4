//! Print the dominant expression once per second from the default camera.
//!
//! Usage: watch_camera [model-dir] [device]

use anyhow::Result;
use moodmirror_vision::{Analyzer, Camera, DetectorOptions, ModelSet};

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let model_dir = args.next().unwrap_or_else(|| "models".to_string());
    let device = args.next().unwrap_or_else(|| "/dev/video0".to_string());

    let models = ModelSet::load(model_dir.as_ref())?;
    let mut analyzer = Analyzer::new(models, DetectorOptions::default());
    let mut camera = Camera::open(&device)?;

    loop {
        let frame = camera.frame()?;
        let img = image::DynamicImage::ImageRgb8(frame);
        match analyzer.detect_single_face(&img) {
            Ok(Some(analysis)) => {
                let (expression, score) = analysis.expressions.dominant();
                println!("{expression} ({:.0}%)", score * 100.0);
            }
            Ok(None) => println!("no face"),
            Err(err) => eprintln!("cycle failed: {err}"),
        }
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
}
