//! Run the full analysis on a still image and write the overlay next to it.
//!
//! Usage: analyze_image <model-dir> <image> [overlay-out.png]

use anyhow::{Context, Result};
use moodmirror_vision::draw::{self, Overlay};
use moodmirror_vision::{Analyzer, DetectorOptions, ModelSet};

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let model_dir = args.next().unwrap_or_else(|| "models".to_string());
    let image_path = args.next().unwrap_or_else(|| "face.png".to_string());
    let out_path = args.next().unwrap_or_else(|| "overlay.png".to_string());

    let models = ModelSet::load(model_dir.as_ref())?;
    let mut analyzer = Analyzer::new(models, DetectorOptions::default());

    let img = image::open(&image_path).with_context(|| format!("opening {image_path}"))?;
    println!("image: {}x{}", img.width(), img.height());

    let Some(analysis) = analyzer.detect_single_face(&img)? else {
        println!("no face detected");
        return Ok(());
    };

    let bbox = analysis.detection.bbox;
    println!(
        "face at [{:.1}, {:.1}, {:.1}, {:.1}] score {:.3}",
        bbox.x, bbox.y, bbox.width, bbox.height, analysis.detection.score
    );
    println!("expressions (ranked):");
    for (expression, score) in analysis.expressions.ranked() {
        println!("  {expression:<10} {score:.3}");
    }

    let mut overlay = Overlay::new(analysis.dimensions);
    overlay.clear();
    draw::draw_detection(overlay.image_mut(), &analysis);
    draw::draw_landmarks(overlay.image_mut(), &analysis);
    draw::draw_expression_scores(overlay.image_mut(), &analysis);
    overlay.image().save(&out_path)?;
    println!("overlay written to {out_path}");

    Ok(())
}
