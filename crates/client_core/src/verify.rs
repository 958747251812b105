//! Offline checks of a deck against the static asset directory.

use std::{
    fmt,
    path::{Component, Path, PathBuf},
};

use thiserror::Error;

use crate::deck::Deck;

pub const MIN_BACKGROUND_WIDTH: u32 = 1920;
pub const MIN_BACKGROUND_HEIGHT: u32 = 1080;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyIssue {
    #[error("audio_transitions ({audio}) and hand_actions ({hand}) length mismatch")]
    LengthMismatch { audio: usize, hand: usize },
    #[error("audio_transitions[{index}] must be a non-empty string")]
    EmptyAudio { index: usize },
    #[error("{field} references path outside public/: {value}")]
    OutsidePublic { field: String, value: String },
    #[error("{field} missing asset {value} (looked for {})", .path.display())]
    MissingAsset {
        field: String,
        value: String,
        path: PathBuf,
    },
    #[error("background must be a non-empty string when provided")]
    EmptyBackground,
    #[error("background resolution could not be determined for {}", .path.display())]
    UnknownResolution { path: PathBuf },
    #[error(
        "background resolution {width}x{height} below recommended {}x{} ({})",
        MIN_BACKGROUND_WIDTH,
        MIN_BACKGROUND_HEIGHT,
        .path.display()
    )]
    LowResolution {
        width: u32,
        height: u32,
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideIssue {
    pub slide_id: String,
    pub issue: VerifyIssue,
}

impl fmt::Display for SlideIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :: {}", self.slide_id, self.issue)
    }
}

/// `data:` URIs, `scheme://` URLs and protocol-relative `//` refs.
pub fn is_remote_asset(value: &str) -> bool {
    let value = value.trim();
    if value.starts_with("data:") || value.starts_with("//") {
        return true;
    }
    match value.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

/// Every issue in `deck`, in slide order. An empty result means the deck is
/// ready to present.
pub fn verify_deck(deck: &Deck, public_dir: &Path) -> Vec<SlideIssue> {
    let mut issues = Vec::new();
    for slide in deck.slides() {
        let mut push = |issue| {
            issues.push(SlideIssue {
                slide_id: slide.id.clone(),
                issue,
            })
        };

        let audio = slide.audio_transitions.len();
        let hand = slide.hand_actions.len();
        if audio != hand {
            push(VerifyIssue::LengthMismatch { audio, hand });
        }

        for (index, entry) in slide.audio_transitions.iter().enumerate() {
            if entry.trim().is_empty() {
                push(VerifyIssue::EmptyAudio { index });
                continue;
            }
            let field = format!("audio_transitions[{index}]");
            if let Err(issue) = locate_asset(public_dir, entry, &field) {
                push(issue);
            }
        }

        let Some(background) = &slide.background else {
            continue;
        };
        if background.trim().is_empty() {
            push(VerifyIssue::EmptyBackground);
            continue;
        }
        match locate_asset(public_dir, background, "background") {
            Err(issue) => push(issue),
            Ok(None) => {}
            Ok(Some(path)) => match image::image_dimensions(&path) {
                Ok((width, height)) if width > 0 && height > 0 => {
                    if width < MIN_BACKGROUND_WIDTH || height < MIN_BACKGROUND_HEIGHT {
                        push(VerifyIssue::LowResolution {
                            width,
                            height,
                            path,
                        });
                    }
                }
                _ => push(VerifyIssue::UnknownResolution { path }),
            },
        }
    }
    issues
}

/// Resolves a local asset ref under `public_dir`. Remote refs resolve to
/// `None` and are not checked.
fn locate_asset(
    public_dir: &Path,
    value: &str,
    field: &str,
) -> Result<Option<PathBuf>, VerifyIssue> {
    let value = value.trim();
    if is_remote_asset(value) {
        return Ok(None);
    }
    let Some(path) = resolve_under(public_dir, value.trim_start_matches('/')) else {
        return Err(VerifyIssue::OutsidePublic {
            field: field.to_string(),
            value: value.to_string(),
        });
    };
    if !path.exists() {
        return Err(VerifyIssue::MissingAsset {
            field: field.to_string(),
            value: value.to_string(),
            path,
        });
    }
    Ok(Some(path))
}

fn resolve_under(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.into_iter().fold(root.to_path_buf(), |path, part| path.join(part)))
}

#[cfg(test)]
#[path = "tests/verify_tests.rs"]
mod tests;
