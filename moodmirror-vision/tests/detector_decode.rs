use moodmirror_vision::face::{decode_detections, nms, Detection, DetectorOptions, Dimensions, FaceBox};

fn options(score: f32, iou: f32) -> DetectorOptions {
    DetectorOptions {
        score_threshold: score,
        iou_threshold: iou,
    }
}

const FRAME: Dimensions = Dimensions {
    width: 640,
    height: 480,
};

#[test]
fn empty_tensors_decode_to_nothing() {
    let detections = decode_detections(&[], &[], &options(0.5, 0.3), FRAME).unwrap();
    assert!(detections.is_empty());
}

#[test]
fn below_threshold_rows_are_dropped() {
    // score pairs are (background, face)
    let scores = vec![0.6, 0.4, 0.2, 0.8];
    let boxes = vec![
        0.1, 0.1, 0.3, 0.3, //
        0.5, 0.5, 0.9, 0.9,
    ];
    let detections = decode_detections(&scores, &boxes, &options(0.5, 0.3), FRAME).unwrap();
    assert_eq!(detections.len(), 1);
    assert!((detections[0].score - 0.8).abs() < 1e-6);
    assert!((detections[0].bbox.x - 0.5 * 640.0).abs() < 1e-3);
    assert!((detections[0].bbox.y - 0.5 * 480.0).abs() < 1e-3);
}

#[test]
fn degenerate_boxes_are_dropped() {
    // confident but zero-area box
    let scores = vec![0.05, 0.95];
    let boxes = vec![0.4, 0.4, 0.4, 0.6];
    let detections = decode_detections(&scores, &boxes, &options(0.5, 0.3), FRAME).unwrap();
    assert!(detections.is_empty());
}

#[test]
fn coordinates_are_clamped_to_the_frame() {
    let scores = vec![0.1, 0.9];
    let boxes = vec![-0.2, -0.1, 1.4, 1.2];
    let detections = decode_detections(&scores, &boxes, &options(0.5, 0.3), FRAME).unwrap();
    assert_eq!(detections.len(), 1);
    let bbox = detections[0].bbox;
    assert_eq!(bbox.x, 0.0);
    assert_eq!(bbox.y, 0.0);
    assert!((bbox.width - 640.0).abs() < 1e-3);
    assert!((bbox.height - 480.0).abs() < 1e-3);
}

#[test]
fn results_come_out_sorted_by_confidence() {
    let scores = vec![0.3, 0.7, 0.1, 0.9];
    let boxes = vec![
        0.05, 0.05, 0.25, 0.25, //
        0.6, 0.6, 0.9, 0.9,
    ];
    let detections = decode_detections(&scores, &boxes, &options(0.5, 0.3), FRAME).unwrap();
    assert_eq!(detections.len(), 2);
    assert!(detections[0].score > detections[1].score);
}

#[test]
fn nms_keeps_the_strongest_of_a_cluster() {
    let at = |x: f32, score: f32| Detection {
        bbox: FaceBox {
            x,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        },
        score,
    };
    let kept = nms(vec![at(0.0, 0.6), at(5.0, 0.9), at(10.0, 0.7)], 0.3);
    assert_eq!(kept.len(), 1);
    assert!((kept[0].score - 0.9).abs() < 1e-6);
}
