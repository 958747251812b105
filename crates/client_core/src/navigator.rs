//! Presenter-side stepping through a [`Deck`].
//!
//! Audio transitions behave like fragments: each forward press plays the
//! next clip of the current slide, and only once every clip has played does
//! the deck move on. Going backward replays the previous clip before leaving
//! the slide, and entering a slide from behind lands on its last clip.

use std::collections::HashMap;

use shared::{domain::Direction, protocol::SetSlideRequest};
use tracing::debug;

use crate::deck::Deck;

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationStep {
    /// Nothing to do: a clip is playing, or the deck edge was reached.
    Ignored,
    PlayClip {
        slide: usize,
        clip: usize,
        source: String,
        hand_action: Option<u8>,
    },
    ChangeSlide {
        index: usize,
        request: SetSlideRequest,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlayingClip {
    slide: usize,
    progress_after: usize,
}

#[derive(Debug, Clone)]
pub struct Navigator {
    deck: Deck,
    current: usize,
    progress: HashMap<usize, usize>,
    playing: Option<PlayingClip>,
}

impl Navigator {
    pub fn new(deck: Deck) -> Self {
        Self {
            deck,
            current: 0,
            progress: HashMap::new(),
            playing: None,
        }
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Clips of `slide` already consumed.
    pub fn progress(&self, slide: usize) -> usize {
        self.progress.get(&slide).copied().unwrap_or(0)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.is_some()
    }

    /// Rewinds to the first slide and returns the call announcing it.
    pub fn start(&mut self) -> Option<SetSlideRequest> {
        self.current = 0;
        self.playing = None;
        self.progress.clear();
        self.progress.insert(0, 0);
        self.deck.set_slide_request(0)
    }

    pub fn step(&mut self, direction: Direction) -> NavigationStep {
        if self.deck.is_empty() {
            return NavigationStep::Ignored;
        }
        if let Some(playing) = self.playing {
            debug!(slide = playing.slide, "navigation ignored while a clip plays");
            return NavigationStep::Ignored;
        }

        let progressed = self.progress(self.current);
        match direction {
            Direction::Forward => {
                if progressed < self.clip_count(self.current) {
                    return self.play(self.current, progressed, progressed + 1, true);
                }
                let next = (self.current + 1).min(self.deck.len() - 1);
                if next == self.current {
                    return NavigationStep::Ignored;
                }
                self.progress.entry(next).or_insert(0);
                self.change_slide(next)
            }
            Direction::Backward => {
                if progressed > 0 {
                    return self.play(self.current, progressed - 1, progressed - 1, false);
                }
                let Some(previous) = self.current.checked_sub(1) else {
                    return NavigationStep::Ignored;
                };
                let clips = self.clip_count(previous);
                self.progress.insert(previous, clips);
                self.change_slide(previous)
            }
        }
    }

    /// The clip returned by the last [`NavigationStep::PlayClip`] ended.
    pub fn clip_finished(&mut self) {
        if let Some(PlayingClip {
            slide,
            progress_after,
        }) = self.playing.take()
        {
            self.progress.insert(slide, progress_after);
        }
    }

    /// Playback never started; progress stays where it was.
    pub fn clip_failed(&mut self) {
        self.playing = None;
    }

    fn clip_count(&self, slide: usize) -> usize {
        self.deck
            .get(slide)
            .map_or(0, |slide| slide.audio_transitions.len())
    }

    fn play(
        &mut self,
        slide: usize,
        clip: usize,
        progress_after: usize,
        fire_hand: bool,
    ) -> NavigationStep {
        let Some(descriptor) = self.deck.get(slide) else {
            return NavigationStep::Ignored;
        };
        let source = descriptor
            .audio_transitions
            .get(clip)
            .cloned()
            .unwrap_or_default();
        if source.trim().is_empty() {
            return NavigationStep::Ignored;
        }
        let hand_action = if fire_hand {
            descriptor.hand_actions.get(clip).copied()
        } else {
            None
        };
        self.playing = Some(PlayingClip {
            slide,
            progress_after,
        });
        NavigationStep::PlayClip {
            slide,
            clip,
            source,
            hand_action,
        }
    }

    fn change_slide(&mut self, index: usize) -> NavigationStep {
        self.current = index;
        match self.deck.set_slide_request(index) {
            Some(request) => NavigationStep::ChangeSlide { index, request },
            None => NavigationStep::Ignored,
        }
    }
}

#[cfg(test)]
#[path = "tests/navigator_tests.rs"]
mod tests;
