//! End-to-end planning scenarios over the public API.

use stickerpress::config::BatchConfig;
use stickerpress::planner::{plan, NormalizationStep};
use stickerpress::probe::ProbeResult;
use stickerpress::prompt::PromptGate;

fn probe(width: u32, height: u32, duration_secs: f64, frame_rate: f64) -> ProbeResult {
    ProbeResult {
        width,
        height,
        duration_secs,
        frame_rate,
    }
}

fn yes_gate() -> PromptGate {
    PromptGate::with_reader(true, &b""[..])
}

#[tokio::test]
async fn landscape_clip_scales_and_speeds_up_without_fps_cap() {
    // 1024x768 at 25 fps for 5 seconds: scale on width, speed up, and no
    // frame-rate cap since 25 <= 30.
    let config = BatchConfig {
        assume_yes: true,
        nearest: Some(false),
        ..Default::default()
    };

    let plan = plan("clip", &probe(1024, 768, 5.0, 25.0), &config, &yes_gate())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        plan.steps,
        vec![
            NormalizationStep::Scale {
                width: 512,
                height: -1,
                nearest: false,
            },
            NormalizationStep::SpeedUp { factor: 0.6 },
        ]
    );
    assert_eq!(plan.reassembly_fps, 25.0);
    assert_eq!(
        plan.filter_chain().unwrap(),
        "scale=512:-1,setpts=0.6*PTS"
    );
}

#[tokio::test]
async fn high_fps_square_clip_only_gets_a_frame_rate_cap() {
    let config = BatchConfig {
        assume_yes: true,
        ..Default::default()
    };

    let plan = plan("clip", &probe(512, 512, 2.0, 60.0), &config, &yes_gate())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(plan.steps, vec![NormalizationStep::CapFrameRate { fps: 30 }]);
    assert_eq!(plan.reassembly_fps, 30.0);
}

#[tokio::test]
async fn conformant_clip_needs_no_transforms() {
    let config = BatchConfig {
        assume_yes: true,
        ..Default::default()
    };

    let plan = plan("clip", &probe(512, 512, 3.0, 30.0), &config, &yes_gate())
        .await
        .unwrap()
        .unwrap();

    assert!(plan.steps.is_empty());
}

#[tokio::test]
async fn portrait_clips_scale_on_height() {
    let config = BatchConfig {
        assume_yes: true,
        nearest: Some(false),
        ..Default::default()
    };

    let plan = plan("clip", &probe(768, 1024, 1.0, 24.0), &config, &yes_gate())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        plan.steps,
        vec![NormalizationStep::Scale {
            width: -1,
            height: 512,
            nearest: false,
        }]
    );
}

#[tokio::test]
async fn square_but_wrong_size_scales_on_height() {
    // Equal dimensions take the height branch.
    let config = BatchConfig {
        assume_yes: true,
        nearest: Some(false),
        ..Default::default()
    };

    let plan = plan("clip", &probe(256, 256, 1.0, 24.0), &config, &yes_gate())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        plan.steps,
        vec![NormalizationStep::Scale {
            width: -1,
            height: 512,
            nearest: false,
        }]
    );
}

#[tokio::test]
async fn capped_rate_feeds_the_speed_up_stage() {
    // 60 fps and 6 seconds: the cap lands before the speed-up and the
    // reassembly rate is the capped one.
    let config = BatchConfig {
        assume_yes: true,
        ..Default::default()
    };

    let plan = plan("clip", &probe(512, 512, 6.0, 60.0), &config, &yes_gate())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        plan.steps,
        vec![
            NormalizationStep::CapFrameRate { fps: 30 },
            NormalizationStep::SpeedUp { factor: 0.5 },
        ]
    );
    assert_eq!(plan.reassembly_fps, 30.0);
}

#[tokio::test]
async fn any_declined_gate_means_no_plan_at_all() {
    let config = BatchConfig::default();

    // Decline at the speed-up stage after accepting scale and fps cap
    // (nearest prompt answered in between).
    let gate = PromptGate::with_reader(false, &b"y\nn\ny\nn\n"[..]);
    let declined = plan("clip", &probe(1024, 768, 6.0, 60.0), &config, &gate)
        .await
        .unwrap();

    assert_eq!(declined, None);
}
