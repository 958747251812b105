use std::{collections::BTreeMap, io::ErrorKind, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One audience member's own taps, kept on their device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionJournal {
    #[serde(default)]
    by_slide: BTreeMap<u32, BTreeMap<String, u64>>,
}

impl ReactionJournal {
    pub fn record(&mut self, slide: u32, symbol: &str) {
        *self
            .by_slide
            .entry(slide)
            .or_default()
            .entry(symbol.to_string())
            .or_default() += 1;
    }

    pub fn slide_counts(&self, slide: u32) -> Option<&BTreeMap<String, u64>> {
        self.by_slide.get(&slide)
    }

    pub fn slides(&self) -> impl Iterator<Item = (u32, &BTreeMap<String, u64>)> {
        self.by_slide.iter().map(|(slide, counts)| (*slide, counts))
    }

    pub fn overall(&self) -> BTreeMap<String, u64> {
        let mut overall = BTreeMap::new();
        for counts in self.by_slide.values() {
            for (symbol, count) in counts {
                *overall.entry(symbol.clone()).or_default() += count;
            }
        }
        overall
    }

    /// Most-tapped symbol overall. Ties go to the symbol that sorts first.
    pub fn top(&self) -> Option<(String, u64)> {
        top_entry(&self.overall())
    }

    pub fn top_for_slide(&self, slide: u32) -> Option<(String, u64)> {
        self.slide_counts(slide).and_then(top_entry)
    }

    pub fn total(&self) -> u64 {
        self.by_slide.values().flat_map(|counts| counts.values()).sum()
    }

    pub fn clear(&mut self) {
        self.by_slide.clear();
    }

    /// A missing or unreadable journal starts empty.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read journal '{}'", path.display()))
            }
        };
        match serde_json::from_str(&raw) {
            Ok(journal) => Ok(journal),
            Err(err) => {
                warn!(path = %path.display(), %err, "discarding corrupt reaction journal");
                Ok(Self::default())
            }
        }
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("failed to write journal '{}'", path.display()))
    }
}

fn top_entry(counts: &BTreeMap<String, u64>) -> Option<(String, u64)> {
    counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .fold(None, |best: Option<(&String, u64)>, (symbol, count)| match best {
            Some((_, best_count)) if best_count >= *count => best,
            _ => Some((symbol, *count)),
        })
        .map(|(symbol, count)| (symbol.clone(), count))
}
