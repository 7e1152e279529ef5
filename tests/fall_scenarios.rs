//! 端到端场景: 合成轮廓 → FallDetector → FallEvent

use falldetector_rs::detection::{Detection, Pose};
use falldetector_rs::pipeline::{self, Frame, FrameObject};
use falldetector_rs::{FallDetector, FallDetectorConfig, FallEvent};
use imageproc::point::Point;

const FRAME_MS: u64 = 40;
const FRAME_SIZE: (u32, u32) = (640, 480);

/// 以 (中心x, 底边y, 宽, 高) 描述的矩形轮廓
fn body(cx: i32, bottom: i32, w: i32, h: i32) -> Vec<Point<i32>> {
    let x = cx - w / 2;
    let y = bottom - h;
    vec![
        Point::new(x, y),
        Point::new(x + w, y),
        Point::new(x + w, y + h / 2),
        Point::new(x + w, y + h),
        Point::new(x, y + h),
        Point::new(x, y + h / 2),
    ]
}

/// 站立 1500ms, 400ms 内倒下, 之后一直躺着
fn falling_body(cx: i32, t: u64) -> Vec<Point<i32>> {
    const FALL_START: u64 = 1480;
    const FALL_MS: u64 = 400;
    if t <= FALL_START {
        body(cx, 200, 40, 100)
    } else if t < FALL_START + FALL_MS {
        let k = (t - FALL_START) as f32 / FALL_MS as f32;
        let w = 40.0 + 70.0 * k;
        let h = 100.0 - 65.0 * k;
        body(cx, 200, w.round() as i32, h.round() as i32)
    } else {
        body(cx, 200, 110, 35)
    }
}

fn detection(fd: &FallDetector, contour: Vec<Point<i32>>, human: bool) -> Detection {
    fd.detection(contour, FRAME_SIZE, None).with_label(Some(human))
}

/// 运行到 `end_ms`, 返回 (帧时间, 事件) 列表
fn run(
    fd: &mut FallDetector,
    end_ms: u64,
    mut objects: impl FnMut(&FallDetector, u64) -> Vec<Detection>,
) -> Vec<(u64, FallEvent)> {
    let mut events = Vec::new();
    let mut t = 0;
    while t <= end_ms {
        let detections = objects(fd, t);
        for event in fd.process_frame(detections, t) {
            events.push((t, event));
        }
        t += FRAME_MS;
    }
    events
}

#[test]
fn test_single_person_fall_is_reported_once() {
    let mut fd = FallDetector::new(&FallDetectorConfig::default()).unwrap();
    let events = run(&mut fd, 6000, |fd, t| {
        vec![detection(fd, falling_body(220, t), true)]
    });

    assert_eq!(events.len(), 1, "events: {:?}", events);
    let (frame_t, event) = events[0];
    assert_eq!(event.track_id, 0);
    // 事件时间为躺倒稳定窗口的起点
    assert_eq!(frame_t - event.timestamp, 1000);
    assert!(event.timestamp > 1480 && event.timestamp <= 1880, "{}", event.timestamp);

    assert_eq!(fd.scene().len(), 1);
    assert_eq!(fd.human_count(), 1);
    assert_eq!(fd.poses(), vec![(0, Pose::Lying)]);
    assert_eq!(
        fd.scene().get(0).unwrap().fallen().timestamp(),
        Some(event.timestamp)
    );
}

#[test]
fn test_person_lying_from_start_is_not_a_fall() {
    let mut fd = FallDetector::new(&FallDetectorConfig::default()).unwrap();
    let events = run(&mut fd, 5000, |fd, _| {
        vec![detection(fd, body(300, 300, 110, 35), true)]
    });
    assert!(events.is_empty());
    assert_eq!(fd.poses(), vec![(0, Pose::Lying)]);
}

#[test]
fn test_walking_person_keeps_identity() {
    let mut fd = FallDetector::new(&FallDetectorConfig::default()).unwrap();
    let events = run(&mut fd, 4000, |fd, t| {
        let cx = 100 + (t / FRAME_MS) as i32 * 3;
        vec![detection(fd, body(cx, 300, 40, 100), true)]
    });
    assert!(events.is_empty());
    assert_eq!(fd.scene().len(), 1);
    assert_eq!(fd.scene().tracks().next().unwrap().id, 0);
    assert_eq!(fd.poses(), vec![(0, Pose::Standing)]);
}

#[test]
fn test_only_the_faller_is_reported() {
    let mut fd = FallDetector::new(&FallDetectorConfig::default()).unwrap();
    let events = run(&mut fd, 5000, |fd, t| {
        vec![
            detection(fd, body(500, 300, 40, 100), true),
            detection(fd, falling_body(200, t), true),
        ]
    });

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1.track_id, 1);
    assert_eq!(fd.scene().len(), 2);
    assert_eq!(fd.poses(), vec![(0, Pose::Standing), (1, Pose::Lying)]);
}

#[test]
fn test_non_human_objects_never_fall() {
    let mut fd = FallDetector::new(&FallDetectorConfig::default()).unwrap();
    let events = run(&mut fd, 5000, |fd, t| {
        vec![detection(fd, falling_body(220, t), false)]
    });
    assert!(events.is_empty());
    assert_eq!(fd.human_count(), 0);
    assert!(!fd.scene().get(0).unwrap().is_human());
}

#[test]
fn test_person_leaving_the_scene_expires() {
    let config = FallDetectorConfig::default();
    let expire = config.expire_after_frames as u64;
    let mut fd = FallDetector::new(&config).unwrap();

    let events = run(&mut fd, 2000 + (expire + 1) * FRAME_MS, |fd, t| {
        if t <= 2000 {
            vec![detection(fd, body(220, 300, 40, 100), true)]
        } else {
            Vec::new()
        }
    });
    assert!(events.is_empty());
    assert!(fd.scene().is_empty());
}

#[test]
fn test_pipeline_reports_fall() {
    let config = FallDetectorConfig::default();
    let (tx, rx, handle) = pipeline::spawn(&config, 8).unwrap();

    let mut t = 0;
    while t <= 4000 {
        let frame = Frame {
            timestamp: t,
            width: FRAME_SIZE.0,
            height: FRAME_SIZE.1,
            pixels: None,
            objects: vec![FrameObject {
                contour: falling_body(220, t),
                human: Some(true),
            }],
        };
        // 每帧重复发送一次, 重复时间戳的帧会被丢弃
        tx.send(frame.clone()).unwrap();
        tx.send(frame).unwrap();
        t += FRAME_MS;
    }
    drop(tx);

    let stats = handle.join().unwrap();
    let events: Vec<FallEvent> = rx.iter().collect();

    assert_eq!(stats.frames_processed, 101);
    assert_eq!(stats.duplicates_skipped, 101);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].track_id, 0);
}
