use super::*;

use crate::deck::SlideDescriptor;

fn slide(id: &str, clips: &[&str], hands: &[u8]) -> SlideDescriptor {
    SlideDescriptor {
        id: id.to_string(),
        title: Some(format!("Slide {id}")),
        reactions: vec!["🧡".into(), "😎".into()],
        background: None,
        show_live_reactions: id == "b",
        audio_transitions: clips.iter().map(|c| c.to_string()).collect(),
        hand_actions: hands.to_vec(),
    }
}

fn navigator() -> Navigator {
    let mut navigator = Navigator::new(Deck::new(vec![
        slide("a", &[], &[]),
        slide("b", &["audio/one.mp3", "audio/two.mp3"], &[1, 15]),
        slide("c", &[], &[]),
    ]));
    navigator.start();
    navigator
}

fn expect_change(step: NavigationStep) -> usize {
    match step {
        NavigationStep::ChangeSlide { index, request } => {
            assert_eq!(request.index, index as f64);
            index
        }
        other => panic!("expected slide change, got {other:?}"),
    }
}

#[test]
fn start_announces_first_slide() {
    let mut navigator = navigator();
    let request = navigator.start().expect("first slide");
    assert_eq!(request.index, 0.0);
    assert_eq!(request.options.title.as_deref(), Some("Slide a"));
    assert_eq!(navigator.current(), 0);
}

#[test]
fn forward_plays_clips_before_leaving_slide() {
    let mut navigator = navigator();
    assert_eq!(expect_change(navigator.step(Direction::Forward)), 1);

    let step = navigator.step(Direction::Forward);
    assert_eq!(
        step,
        NavigationStep::PlayClip {
            slide: 1,
            clip: 0,
            source: "audio/one.mp3".into(),
            hand_action: Some(1),
        }
    );
    assert!(navigator.is_playing());
    assert_eq!(navigator.step(Direction::Forward), NavigationStep::Ignored);
    navigator.clip_finished();
    assert_eq!(navigator.progress(1), 1);

    let NavigationStep::PlayClip { hand_action, .. } = navigator.step(Direction::Forward) else {
        panic!("expected second clip");
    };
    assert_eq!(hand_action, Some(15));
    navigator.clip_finished();

    assert_eq!(expect_change(navigator.step(Direction::Forward)), 2);
    assert_eq!(navigator.step(Direction::Forward), NavigationStep::Ignored);
    assert_eq!(navigator.current(), 2);
}

#[test]
fn backward_enters_previous_slide_at_its_last_clip() {
    let mut navigator = navigator();
    navigator.step(Direction::Forward);
    navigator.step(Direction::Forward);
    navigator.clip_finished();
    navigator.step(Direction::Forward);
    navigator.clip_finished();
    navigator.step(Direction::Forward);
    assert_eq!(navigator.current(), 2);

    assert_eq!(expect_change(navigator.step(Direction::Backward)), 1);
    assert_eq!(navigator.progress(1), 2);

    let step = navigator.step(Direction::Backward);
    assert_eq!(
        step,
        NavigationStep::PlayClip {
            slide: 1,
            clip: 1,
            source: "audio/two.mp3".into(),
            hand_action: None,
        }
    );
    navigator.clip_finished();
    assert_eq!(navigator.progress(1), 1);
}

#[test]
fn failed_clip_leaves_progress_untouched() {
    let mut navigator = navigator();
    navigator.step(Direction::Forward);
    navigator.step(Direction::Forward);
    navigator.clip_failed();
    assert!(!navigator.is_playing());
    assert_eq!(navigator.progress(1), 0);
}

#[test]
fn backward_at_first_slide_is_ignored() {
    let mut navigator = navigator();
    assert_eq!(navigator.step(Direction::Backward), NavigationStep::Ignored);
    assert_eq!(navigator.current(), 0);
}

#[test]
fn empty_deck_never_moves() {
    let mut navigator = Navigator::new(Deck::default());
    assert!(navigator.start().is_none());
    assert_eq!(navigator.step(Direction::Forward), NavigationStep::Ignored);
    assert_eq!(navigator.step(Direction::Backward), NavigationStep::Ignored);
}

#[test]
fn emitted_indices_stay_inside_the_deck() {
    let total = 3;
    for mask in 0u32..(1 << 10) {
        let mut navigator = navigator();
        for bit in 0..10 {
            let direction = if mask & (1 << bit) == 0 {
                Direction::Forward
            } else {
                Direction::Backward
            };
            match navigator.step(direction) {
                NavigationStep::ChangeSlide { index, .. } => assert!(index < total),
                NavigationStep::PlayClip { .. } => navigator.clip_finished(),
                NavigationStep::Ignored => {}
            }
            assert!(navigator.current() < total);
        }
    }
}
