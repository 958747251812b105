use std::collections::{BTreeMap, HashMap, HashSet};

use shared::{
    domain::{Direction, MAX_SYMBOL_BYTES},
    protocol::{PresentationState, SetSlideRequest},
};

/// Synchronous transitions over one [`PresentationState`].
///
/// The machine never touches the reaction store. Whenever live display is on
/// it resets `reaction_counts` to zeros for the current vocabulary; the
/// endpoint overlays recorded counts with [`PresentationMachine::apply_counts`].
#[derive(Debug, Clone)]
pub struct PresentationMachine {
    state: PresentationState,
    slide_limit: Option<u32>,
}

impl PresentationMachine {
    /// `slide_limit` is the number of slides in the deck, when known. The
    /// index is then clamped to `slide_limit - 1` as well as to 0.
    pub fn new(slide_limit: Option<u32>) -> Self {
        Self::from_state(PresentationState::default(), slide_limit)
    }

    pub fn from_state(state: PresentationState, slide_limit: Option<u32>) -> Self {
        let mut machine = Self { state, slide_limit };
        machine.state.current_slide_index = machine.clamp(machine.state.current_slide_index);
        machine
    }

    pub fn state(&self) -> &PresentationState {
        &self.state
    }

    pub fn current_index(&self) -> u32 {
        self.state.current_slide_index
    }

    pub fn show_live_reactions(&self) -> bool {
        self.state.show_live_reactions
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.state.current_slide.available_reactions
    }

    pub fn advance(&mut self, direction: Direction) -> u32 {
        let index = self.state.current_slide_index;
        let next = match direction {
            Direction::Forward => index.saturating_add(1),
            Direction::Backward => index.saturating_sub(1),
        };
        self.state.current_slide_index = self.clamp(next);
        self.reset_counts();
        self.state.current_slide_index
    }

    pub fn set_slide(&mut self, request: SetSlideRequest) -> u32 {
        let SetSlideRequest {
            index,
            available_reactions,
            options,
        } = request;

        self.state.current_slide_index = self.clamp(coerce_slide_index(index));
        if let Some(vocabulary) = normalize_vocabulary(available_reactions) {
            self.state.current_slide.available_reactions = vocabulary;
        }
        if let Some(title) = options.title {
            self.state.current_slide.title = Some(title);
        }
        self.state.show_live_reactions = options.show_live_reactions;
        self.reset_counts();
        self.state.current_slide_index
    }

    pub fn accepts(&self, symbol: &str) -> bool {
        self.vocabulary().iter().any(|s| s == symbol)
    }

    /// Overlays counts recorded for the current slide. Does nothing while
    /// live display is off, so counts stay empty in that mode.
    pub fn apply_counts(&mut self, recorded: &HashMap<String, u64>) {
        if self.state.show_live_reactions {
            self.state.reaction_counts = tally(self.vocabulary(), recorded);
        }
    }

    fn reset_counts(&mut self) {
        self.state.reaction_counts = if self.state.show_live_reactions {
            tally(self.vocabulary(), &HashMap::new())
        } else {
            BTreeMap::new()
        };
    }

    fn clamp(&self, index: u32) -> u32 {
        match self.slide_limit {
            Some(limit) => index.min(limit.saturating_sub(1)),
            None => index,
        }
    }
}

/// Zero-initialised counts keyed exactly by `vocabulary`, overlaid with
/// `recorded`. Recorded symbols outside the vocabulary are dropped.
pub fn tally(vocabulary: &[String], recorded: &HashMap<String, u64>) -> BTreeMap<String, u64> {
    vocabulary
        .iter()
        .map(|symbol| (symbol.clone(), recorded.get(symbol).copied().unwrap_or(0)))
        .collect()
}

/// NaN and non-positive indices become 0, anything past `u32::MAX`
/// (`+inf` included) saturates, everything else is floored.
pub fn coerce_slide_index(raw: f64) -> u32 {
    if raw.is_nan() || raw <= 0.0 {
        return 0;
    }
    let floored = raw.floor();
    if floored >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        floored as u32
    }
}

/// Deduplicates while keeping order. `None` means the caller should keep the
/// previous vocabulary: the list was empty or held an unusable symbol.
pub fn normalize_vocabulary(symbols: Vec<String>) -> Option<Vec<String>> {
    if symbols.is_empty()
        || symbols
            .iter()
            .any(|s| s.trim().is_empty() || s.len() > MAX_SYMBOL_BYTES)
    {
        return None;
    }
    let mut seen = HashSet::new();
    Some(
        symbols
            .into_iter()
            .filter(|s| seen.insert(s.clone()))
            .collect(),
    )
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
