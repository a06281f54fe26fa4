//! Expression label → emoji glyph and localized caption.
//!
//! Pure lookups over the classifier vocabulary. Unknown labels yield no
//! glyph and echo back unchanged as the caption, so a stray label can
//! never break the view.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Pt,
    En,
}

impl std::str::FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pt" => Ok(Locale::Pt),
            "en" => Ok(Locale::En),
            other => anyhow::bail!("unknown locale {other:?} (expected pt or en)"),
        }
    }
}

/// Fixed glyph per known label; `None` for anything else, including the
/// empty pre-detection state.
pub fn emoji_for(label: &str) -> Option<&'static str> {
    Some(match label {
        "neutral" => "😐",
        "happy" => "😄",
        "sad" => "☹️",
        "angry" => "😡",
        "fearful" => "😨",
        "disgusted" => "🤢",
        "surprised" => "😮",
        _ => return None,
    })
}

/// Localized caption for a known label; unknown labels are echoed back
/// unchanged.
pub fn caption_for(label: &str, locale: Locale) -> &str {
    match locale {
        Locale::Pt => match label {
            "neutral" => "Neutra",
            "happy" => "Feliz",
            "sad" => "Triste",
            "angry" => "Com Raiva",
            "fearful" => "Com Medo",
            "disgusted" => "Com Nojo",
            "surprised" => "Surpresa",
            other => other,
        },
        Locale::En => match label {
            "neutral" => "Neutral",
            "happy" => "Happy",
            "sad" => "Sad",
            "angry" => "Angry",
            "fearful" => "Fearful",
            "disgusted" => "Disgusted",
            "surprised" => "Surprised",
            other => other,
        },
    }
}
