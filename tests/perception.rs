//! Template search against replayed screens.

mod common;

use common::{init_logging, noise, paste};
use image::GrayImage;
use std::sync::Arc;
use tapflow::prelude::*;
use tapflow::{PerceptionError, Region};

/// A copy of `patch` with a few pixels inverted: still a good match, never a perfect one.
fn smudged(patch: &GrayImage) -> GrayImage {
    let mut out = patch.clone();
    for (x, y) in [(1, 1), (5, 7), (9, 3)] {
        let px = out.get_pixel_mut(x, y);
        px.0[0] = 255 - px.0[0];
    }
    out
}

struct Scene {
    screen: GrayImage,
    first: GrayImage,
    second: GrayImage,
}

/// Two distinct 12x12 patches on a noisy 120x80 screen, at (10, 10) and (80, 50).
fn scene() -> Scene {
    let first = noise(12, 12, 11);
    let second = noise(12, 12, 22);
    let screen = paste(&paste(&noise(120, 80, 33), &first, 10, 10), &second, 80, 50);
    Scene {
        screen,
        first,
        second,
    }
}

fn actuator(target: &str, screens: Vec<GrayImage>) -> (PerceptionActuator, Arc<ReplayTransport>) {
    let transport = Arc::new(ReplayTransport::new(screens));
    (PerceptionActuator::new(target, transport.clone()), transport)
}

#[test]
fn test_first_listed_template_wins_over_better_later_one() {
    init_logging();
    let scene = scene();
    let (actuator, _) = actuator("find-1", vec![scene.screen.clone()]);

    let weaker = Template::image("first-smudged", smudged(&scene.first));
    let perfect = Template::image("second", scene.second.clone());

    let hit = actuator.find(&[weaker.clone(), perfect.clone()], 0.8, None).unwrap();
    assert!(hit.found);
    assert_eq!(hit.position(), Some((16, 16)));
    assert!(hit.score < 1.0);

    let hit = actuator.find(&[perfect, weaker], 0.8, None).unwrap();
    assert_eq!(hit.position(), Some((86, 56)));
    assert!(hit.score > 0.999);
}

#[test]
fn test_falls_through_to_second_template() {
    init_logging();
    let scene = scene();
    let (actuator, transport) = actuator("find-2", vec![scene.screen.clone()]);

    let absent = Template::image("absent", noise(12, 12, 99));
    let present = Template::image("second", scene.second.clone());

    let hit = actuator.find(&[absent, present], 0.85, None).unwrap();
    assert_eq!(hit.position(), Some((86, 56)));
    // one screenshot serves every template of the call
    assert_eq!(transport.capture_count(), 1);
}

#[test]
fn test_miss_is_not_an_error() {
    init_logging();
    let scene = scene();
    let (actuator, transport) = actuator("find-3", vec![scene.screen.clone()]);

    let clicked = actuator
        .find_and_click(&[Template::image("absent", noise(12, 12, 7))], 0.85)
        .unwrap();
    assert!(!clicked);
    assert!(transport.taps().is_empty());
}

#[test]
fn test_region_limits_search_and_keeps_screen_coordinates() {
    init_logging();
    let scene = scene();
    let (actuator, _) = actuator("find-4", vec![scene.screen.clone()]);
    let first = Template::image("first", scene.first.clone());

    let hit = actuator.find(&[first.clone()], 0.85, Some(Region::new(0, 0, 40, 40))).unwrap();
    assert_eq!(hit.position(), Some((16, 16)));

    let miss = actuator.find(&[first.clone()], 0.85, Some(Region::new(60, 0, 120, 80))).unwrap();
    assert!(!miss.found);

    // smaller than the template
    let tiny = actuator.find(&[first], 0.85, Some(Region::new(10, 10, 15, 15))).unwrap();
    assert!(!tiny.found);
}

#[test]
fn test_find_and_click_taps_match_center() {
    init_logging();
    let scene = scene();
    let blank = noise(120, 80, 33);
    let (actuator, transport) = actuator("click-1", vec![blank, scene.screen.clone()]);
    let second = [Template::image("second", scene.second.clone())];

    assert!(!actuator.find_and_click(&second, 0.85).unwrap());
    assert!(actuator.find_and_click(&second, 0.85).unwrap());
    assert_eq!(transport.taps(), vec![(86, 56)]);
}

#[test]
fn test_capture_failure_is_an_error() {
    init_logging();
    let (actuator, _) = actuator("cap-1", Vec::new());

    let err = actuator.find_img(Template::image("t", noise(4, 4, 1))).unwrap_err();
    assert!(matches!(err, PerceptionError::Capture(_)));
}

#[test]
fn test_missing_template_file_is_an_error() {
    init_logging();
    let (actuator, _) = actuator("tpl-1", vec![noise(20, 20, 1)]);

    let err = actuator.find_img("/no/such/template.png").unwrap_err();
    assert!(matches!(err, PerceptionError::Template(_)));
}
