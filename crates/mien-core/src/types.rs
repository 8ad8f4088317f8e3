use serde::{Deserialize, Serialize};

/// The closed set of expression categories the classifier scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionCategory {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl ExpressionCategory {
    /// Fixed enumeration order. Ties in a score scan are broken by the
    /// first category in this order, never by input ordering.
    pub const ALL: [ExpressionCategory; 7] = [
        ExpressionCategory::Neutral,
        ExpressionCategory::Happy,
        ExpressionCategory::Sad,
        ExpressionCategory::Angry,
        ExpressionCategory::Fearful,
        ExpressionCategory::Disgusted,
        ExpressionCategory::Surprised,
    ];

    /// Human-readable label for UI display.
    pub fn label(&self) -> &'static str {
        match self {
            ExpressionCategory::Neutral => "Neutral",
            ExpressionCategory::Happy => "Happy",
            ExpressionCategory::Sad => "Sad",
            ExpressionCategory::Angry => "Angry",
            ExpressionCategory::Fearful => "Fearful",
            ExpressionCategory::Disgusted => "Disgusted",
            ExpressionCategory::Surprised => "Surprised",
        }
    }

    /// Emoji glyph for UI display.
    pub fn emoji(&self) -> &'static str {
        match self {
            ExpressionCategory::Neutral => "\u{1F610}",
            ExpressionCategory::Happy => "\u{1F600}",
            ExpressionCategory::Sad => "\u{1F622}",
            ExpressionCategory::Angry => "\u{1F620}",
            ExpressionCategory::Fearful => "\u{1F628}",
            ExpressionCategory::Disgusted => "\u{1F922}",
            ExpressionCategory::Surprised => "\u{1F62E}",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Per-category scores in [0, 1]. Scores are independent model outputs
/// and do not necessarily sum to 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpressionScores {
    values: [f32; 7],
}

impl ExpressionScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from (category, score) pairs; unmentioned categories stay 0.
    pub fn from_pairs(pairs: &[(ExpressionCategory, f32)]) -> Self {
        let mut scores = Self::default();
        for &(category, score) in pairs {
            scores.set(category, score);
        }
        scores
    }

    pub fn score(&self, category: ExpressionCategory) -> f32 {
        self.values[category.index()]
    }

    pub fn set(&mut self, category: ExpressionCategory, score: f32) {
        self.values[category.index()] = score;
    }

    /// Iterate (category, score) in the fixed enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (ExpressionCategory, f32)> + '_ {
        ExpressionCategory::ALL
            .iter()
            .map(|&category| (category, self.score(category)))
    }
}

/// Bounding box for a detected face, in frame pixel space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector confidence that this box contains a face.
    pub confidence: f32,
}

/// A single-frame detection result: the top face plus its expression scores.
#[derive(Debug, Clone)]
pub struct Detection {
    pub face: FaceBox,
    pub expressions: ExpressionScores,
}

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct VideoFrame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl VideoFrame {
    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Options forwarded to the classifier for a single-frame detection.
#[derive(Debug, Clone, Copy)]
pub struct DetectOptions {
    /// Square input size the detector resizes frames to.
    pub input_size: u32,
    /// Minimum detector confidence for a face to be reported at all.
    pub face_score_threshold: f32,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            input_size: 224,
            face_score_threshold: 0.5,
        }
    }
}
