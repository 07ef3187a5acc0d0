//! Classification types delivered by the external emotion classifier.
//!
//! A classifier produces one `(label, confidence)` pair per detected face per
//! processed frame. Labels are kept as plain strings so unknown categories pass
//! through untouched; [`Emotion`] names the closed set the classifier is trained on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of emotion categories, in classifier output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Neutral,
    Sad,
    Surprise,
}

impl Emotion {
    /// All categories, indexed the same way as the classifier's probability vector.
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Neutral,
        Emotion::Sad,
        Emotion::Surprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgust => "Disgust",
            Emotion::Fear => "Fear",
            Emotion::Happy => "Happy",
            Emotion::Neutral => "Neutral",
            Emotion::Sad => "Sad",
            Emotion::Surprise => "Surprise",
        }
    }

    /// Parse a stored label. Matching is exact; anything else is `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.as_str() == label)
    }

    pub fn polarity(&self) -> Polarity {
        match self {
            Emotion::Happy => Polarity::Positive,
            Emotion::Sad | Emotion::Angry | Emotion::Fear | Emotion::Disgust => Polarity::Negative,
            Emotion::Neutral | Emotion::Surprise => Polarity::Neither,
        }
    }

    /// Chart colour used by dashboard consumers.
    pub fn color_hex(&self) -> &'static str {
        match self {
            Emotion::Happy => "#2ca02c",
            Emotion::Neutral => "#1f77b4",
            Emotion::Sad => "#ff7f0e",
            Emotion::Angry => "#d62728",
            Emotion::Fear => "#9467bd",
            Emotion::Disgust => "#8c564b",
            Emotion::Surprise => "#e377c2",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a label counts toward the happy or the stress tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
    Neither,
}

impl Polarity {
    /// Polarity of a raw label. Unrecognized labels are `Neither`.
    pub fn of(label: &str) -> Self {
        Emotion::from_label(label)
            .map(|e| e.polarity())
            .unwrap_or(Polarity::Neither)
    }
}

/// A single face classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Emotion label (expected to be one of [`Emotion`], not enforced)
    pub label: String,
    /// Top-class probability
    pub confidence: f64,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Map a classifier probability vector to its top class.
    ///
    /// The vector is indexed in [`Emotion::ALL`] order. Returns `None` for an
    /// empty vector or one containing NaN.
    pub fn from_probabilities(probabilities: &[f32]) -> Option<Self> {
        let (index, max) = probabilities
            .iter()
            .copied()
            .enumerate()
            .try_fold(None::<(usize, f32)>, |best, (i, p)| {
                if p.is_nan() {
                    return None;
                }
                Some(match best {
                    Some((_, bp)) if bp >= p => best,
                    _ => Some((i, p)),
                })
            })??;

        let label = Emotion::ALL
            .get(index)
            .map(|e| e.as_str().to_string())
            .unwrap_or_else(|| format!("class_{index}"));

        Some(Self::new(label, f64::from(max)))
    }

    pub fn emotion(&self) -> Option<Emotion> {
        Emotion::from_label(&self.label)
    }
}

/// All classifications for one processed frame. Empty when no face was found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationBatch {
    pub faces: Vec<Classification>,
}

impl ClassificationBatch {
    pub fn new(faces: Vec<Classification>) -> Self {
        Self { faces }
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }
}
