use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::{
    domain::default_reactions,
    protocol::{SetSlideOptions, SetSlideRequest},
};

/// One slide as authored in a deck file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideDescriptor {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_reactions")]
    pub reactions: Vec<String>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub show_live_reactions: bool,
    /// Clips played one per forward press before the deck moves on.
    #[serde(default)]
    pub audio_transitions: Vec<String>,
    /// Prop command fired with the clip at the same position.
    #[serde(default)]
    pub hand_actions: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct DeckFile {
    #[serde(default)]
    slides: Vec<SlideDescriptor>,
}

/// Ordered slide sequence. Slides are sorted by id; ids starting with `_`
/// are drafts and never shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deck {
    slides: Vec<SlideDescriptor>,
}

impl Deck {
    pub fn new(slides: Vec<SlideDescriptor>) -> Self {
        let mut slides: Vec<_> = slides
            .into_iter()
            .filter(|slide| !slide.id.starts_with('_'))
            .collect();
        slides.sort_by(|a, b| a.id.cmp(&b.id));
        Self { slides }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: DeckFile = toml::from_str(raw).context("invalid deck file")?;
        Ok(Self::new(file.slides))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read deck '{}'", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("failed to parse deck '{}'", path.display()))
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SlideDescriptor> {
        self.slides.get(index)
    }

    pub fn slides(&self) -> &[SlideDescriptor] {
        &self.slides
    }

    /// The `set_slide` call announcing slide `index` to the session.
    pub fn set_slide_request(&self, index: usize) -> Option<SetSlideRequest> {
        let slide = self.get(index)?;
        let index = u32::try_from(index).ok()?;
        Some(SetSlideRequest::new(
            index,
            slide.reactions.clone(),
            SetSlideOptions {
                show_live_reactions: slide.show_live_reactions,
                title: slide.title.clone(),
            },
        ))
    }
}
