//! On-screen keyboard detection
//!
//! Finds keyboard bands in portrait screenshots by clustering keyboard-like
//! tokens (single keys, key runs such as "qwerty", UI keys such as "space")
//! into horizontal rows and keeping groups of rows that look like a keyboard.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use super::BoundingBox;

/// Letter rows of a QWERTY layout
const QWERTY_ROWS: [&str; 3] = ["qwertyuiop", "asdfghjkl", "zxcvbnm"];

/// Labels of non-letter keys
const UI_ELEMENTS: &[&str] = &[
    "space", "return", "enter", "shift", "delete", "backspace", "go", "send", "search", "next",
    "done", "abc", "123", "@", "#+=", ".?123", "emoji", "?123", "english",
];

const NUMBER_KEYS: &[&str] = &["?123", ".?123", "123"];
const ENTER_KEYS: &[&str] = &["return", "enter", "go", "search"];

/// Weak rows this close to an anchor row (fraction of height) are promoted
const ANCHOR_PROXIMITY: f64 = 0.15;
/// Rows closer than this (fraction of height) belong to the same keyboard
const ROW_SPACING: f64 = 0.12;
/// Padding added above and below a detected band (fraction of height)
const BAND_PADDING: f64 = 0.02;

/// Keyboard detector tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardDetectorConfig {
    /// Bottom fraction of the image that is scanned for keys
    pub scan_fraction: f64,
    /// Rows needed to accept a keyboard without a strong UI row
    pub min_rows: usize,
    /// Key characters that make a row an anchor on its own
    pub min_chars_per_row: usize,
    /// Vertical tolerance in pixels when grouping tokens into rows
    pub row_threshold: f64,
}

impl Default for KeyboardDetectorConfig {
    fn default() -> Self {
        Self {
            scan_fraction: 0.50,
            min_rows: 2,
            min_chars_per_row: 4,
            row_threshold: 60.0,
        }
    }
}

/// A token that could be part of a keyboard
#[derive(Debug, Clone)]
struct Candidate {
    text: String,
    y_center: f64,
    y_top: f64,
    y_bottom: f64,
    is_ui: bool,
    key_count: usize,
}

/// Horizontal row of candidates
#[derive(Debug)]
struct KeyRow {
    y_start: f64,
    y_end: f64,
    y_center: f64,
    key_count: usize,
    ui_count: usize,
    texts: HashSet<String>,
}

impl KeyRow {
    fn from_cluster(cluster: &[Candidate]) -> Self {
        let key_count = cluster.iter().map(|c| c.key_count).sum();
        let ui_count = cluster.iter().filter(|c| c.is_ui).count();

        Self {
            y_start: cluster.iter().map(|c| c.y_top).fold(f64::INFINITY, f64::min),
            y_end: cluster.iter().map(|c| c.y_bottom).fold(f64::NEG_INFINITY, f64::max),
            y_center: cluster.iter().map(|c| c.y_center).sum::<f64>() / cluster.len() as f64,
            key_count,
            ui_count,
            texts: cluster.iter().map(|c| c.text.to_lowercase()).collect(),
        }
    }

    fn char_count(&self) -> usize {
        self.key_count + self.ui_count
    }

    /// Key combinations that only appear on a keyboard's bottom row
    fn is_strong_ui(&self) -> bool {
        let has = |t: &str| self.texts.contains(t);
        let has_english = has("english");
        let has_space = has("space");
        let has_numbers = NUMBER_KEYS.iter().any(|t| has(t));
        let has_enter = ENTER_KEYS.iter().any(|t| has(t));

        (has_english && has_numbers)
            || (has_english && has_enter)
            || (has_space && has_enter)
            || (has_space && has_numbers)
    }
}

/// Keyboard detector over a single image's fragments
#[derive(Debug, Clone)]
pub struct KeyboardDetector {
    config: KeyboardDetectorConfig,
    sequences: HashSet<String>,
}

impl KeyboardDetector {
    pub fn new(config: KeyboardDetectorConfig) -> Self {
        let sequences = QWERTY_ROWS
            .iter()
            .flat_map(|row| {
                let chars: Vec<char> = row.chars().collect();
                chars
                    .windows(3)
                    .map(|w| w.iter().collect::<String>())
                    .collect::<Vec<_>>()
            })
            .collect();

        Self { config, sequences }
    }

    fn is_keyboard_char(c: char) -> bool {
        c.is_ascii_digit() || QWERTY_ROWS.iter().any(|row| row.contains(c))
    }

    fn is_keyboard_key(text: &str) -> bool {
        let lower = text.to_lowercase();
        let mut chars = lower.chars();
        matches!((chars.next(), chars.next()), (Some(c), None) if Self::is_keyboard_char(c))
    }

    fn is_ui_element(text: &str) -> bool {
        UI_ELEMENTS.contains(&text.to_lowercase().as_str())
    }

    /// Length of a grouped key run such as "qwerty", or 0 for ordinary text
    fn key_sequence_length(&self, text: &str) -> usize {
        let cleaned: Vec<char> = text.to_lowercase().chars().filter(|c| *c != ' ').collect();

        if cleaned.len() < 3 || cleaned.len() > 10 {
            return 0;
        }
        if !cleaned.iter().all(|c| Self::is_keyboard_char(*c)) {
            return 0;
        }

        let has_row_run = cleaned
            .windows(3)
            .any(|w| self.sequences.contains(&w.iter().collect::<String>()));

        if has_row_run {
            cleaned.len()
        } else {
            0
        }
    }

    fn candidates(&self, fragments: &[(&str, BoundingBox)], image_height: f64) -> Vec<Candidate> {
        let scan_start = image_height * (1.0 - self.config.scan_fraction);

        fragments
            .iter()
            .filter_map(|(text, bbox)| {
                let y_center = bbox.center_y();
                if y_center < scan_start {
                    return None;
                }

                let text = text.trim();
                let is_key = Self::is_keyboard_key(text);
                let is_ui = Self::is_ui_element(text);

                let key_count = if is_key || is_ui || text.chars().count() <= 2 {
                    usize::from(is_key)
                } else {
                    match self.key_sequence_length(text) {
                        0 => return None,
                        n => n,
                    }
                };

                Some(Candidate {
                    text: text.to_string(),
                    y_center,
                    y_top: bbox.top,
                    y_bottom: bbox.bottom,
                    is_ui,
                    key_count,
                })
            })
            .collect()
    }

    /// Group candidates into rows by the median center of the row so far
    fn cluster_rows(&self, mut candidates: Vec<Candidate>) -> Vec<KeyRow> {
        candidates.sort_by(|a, b| a.y_center.total_cmp(&b.y_center));

        let mut rows = Vec::new();
        let mut current: Vec<Candidate> = Vec::new();

        for candidate in candidates {
            if let Some(median) = median_center(&current) {
                if (candidate.y_center - median).abs() > self.config.row_threshold {
                    rows.push(KeyRow::from_cluster(&current));
                    current.clear();
                }
            }
            current.push(candidate);
        }

        if !current.is_empty() {
            rows.push(KeyRow::from_cluster(&current));
        }

        rows
    }

    /// Keyboard bands as (start, end) fractions of the image height
    pub fn detect_regions(&self, fragments: &[(&str, BoundingBox)], image_height: f64) -> Vec<(f64, f64)> {
        if image_height <= 0.0 {
            return Vec::new();
        }

        let rows = self.cluster_rows(self.candidates(fragments, image_height));
        if rows.is_empty() {
            return Vec::new();
        }

        let is_anchor: Vec<bool> = rows
            .iter()
            .map(|r| r.is_strong_ui() || r.char_count() >= self.config.min_chars_per_row)
            .collect();
        if !is_anchor.iter().any(|a| *a) {
            return Vec::new();
        }

        let proximity = image_height * ANCHOR_PROXIMITY;
        let anchors: Vec<&KeyRow> = rows.iter().zip(&is_anchor).filter(|(_, a)| **a).map(|(r, _)| r).collect();

        let mut valid: Vec<&KeyRow> = anchors.clone();
        for (row, anchor) in rows.iter().zip(&is_anchor) {
            if *anchor {
                continue;
            }
            let near_anchor = anchors.iter().any(|a| (row.y_center - a.y_center).abs() <= proximity);
            if near_anchor && (row.key_count >= 2 || row.ui_count > 0) {
                valid.push(row);
            }
        }
        valid.sort_by(|a, b| a.y_center.total_cmp(&b.y_center));

        let spacing = image_height * ROW_SPACING;
        let mut groups: Vec<Vec<&KeyRow>> = Vec::new();
        for row in valid {
            let starts_group = groups
                .last()
                .and_then(|group| group.last())
                .map_or(true, |last| row.y_center - last.y_center > spacing);

            match groups.last_mut() {
                Some(group) if !starts_group => group.push(row),
                _ => groups.push(vec![row]),
            }
        }

        let padding = image_height * BAND_PADDING;
        let regions: Vec<(f64, f64)> = groups
            .iter()
            .filter(|group| group.len() >= self.config.min_rows || group.iter().any(|r| r.is_strong_ui()))
            .map(|group| {
                let min_y = group.iter().map(|r| r.y_start).fold(f64::INFINITY, f64::min);
                let max_y = group.iter().map(|r| r.y_end).fold(f64::NEG_INFINITY, f64::max);
                (
                    ((min_y - padding) / image_height).max(0.0),
                    ((max_y + padding) / image_height).min(1.0),
                )
            })
            .collect();

        debug!("Keyboard detection: {} rows, {} band(s)", rows.len(), regions.len());
        regions
    }
}

fn median_center(cluster: &[Candidate]) -> Option<f64> {
    if cluster.is_empty() {
        return None;
    }
    let mut centers: Vec<f64> = cluster.iter().map(|c| c.y_center).collect();
    centers.sort_by(f64::total_cmp);
    Some(centers[centers.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &'static str, x: f64, y_center: f64) -> (&'static str, BoundingBox) {
        (
            text,
            BoundingBox {
                left: x,
                top: y_center - 20.0,
                right: x + 40.0,
                bottom: y_center + 20.0,
            },
        )
    }

    fn keyboard_tokens() -> Vec<(&'static str, BoundingBox)> {
        let mut tokens = Vec::new();
        for (i, key) in ["q", "w", "e", "r", "t"].iter().enumerate() {
            tokens.push(token(key, 50.0 + i as f64 * 90.0, 1500.0));
        }
        for (i, key) in ["a", "s", "d", "f"].iter().enumerate() {
            tokens.push(token(key, 80.0 + i as f64 * 90.0, 1600.0));
        }
        tokens.push(token("space", 300.0, 1700.0));
        tokens.push(token("return", 800.0, 1700.0));
        tokens
    }

    #[test]
    fn test_key_sequence_length() {
        let detector = KeyboardDetector::new(KeyboardDetectorConfig::default());

        assert_eq!(detector.key_sequence_length("qwerty"), 6);
        assert_eq!(detector.key_sequence_length("A S D F"), 4);
        // No three-key run from a single row
        assert_eq!(detector.key_sequence_length("qaz"), 0);
        // Too long for a key group
        assert_eq!(detector.key_sequence_length("qwertyuiopasdf"), 0);
        // Not made only of keys
        assert_eq!(detector.key_sequence_length("qwe!"), 0);
    }

    #[test]
    fn test_key_and_ui_tokens() {
        assert!(KeyboardDetector::is_keyboard_key("Q"));
        assert!(KeyboardDetector::is_keyboard_key("7"));
        assert!(!KeyboardDetector::is_keyboard_key("qw"));
        assert!(KeyboardDetector::is_ui_element("Space"));
        assert!(KeyboardDetector::is_ui_element("?123"));
        assert!(!KeyboardDetector::is_ui_element("hello"));
    }

    #[test]
    fn test_detects_keyboard_band() {
        let detector = KeyboardDetector::new(KeyboardDetectorConfig::default());
        let mut fragments = keyboard_tokens();
        fragments.push(token("Hello there, how are you?", 40.0, 300.0));

        let regions = detector.detect_regions(&fragments, 2000.0);

        assert_eq!(regions.len(), 1);
        let (start, end) = regions[0];
        assert!((start - 0.72).abs() < 1e-9);
        assert!((end - 0.88).abs() < 1e-9);
    }

    #[test]
    fn test_no_keyboard_in_plain_text() {
        let detector = KeyboardDetector::new(KeyboardDetectorConfig::default());
        let fragments = vec![
            token("Meeting moved to Thursday", 40.0, 1200.0),
            token("See you then", 40.0, 1400.0),
            token("ok", 40.0, 1600.0),
        ];

        assert!(detector.detect_regions(&fragments, 2000.0).is_empty());
    }

    #[test]
    fn test_keys_above_scan_region_ignored() {
        let detector = KeyboardDetector::new(KeyboardDetectorConfig::default());
        let fragments: Vec<_> = keyboard_tokens()
            .into_iter()
            .map(|(text, mut b)| {
                b.top -= 1200.0;
                b.bottom -= 1200.0;
                (text, b)
            })
            .collect();

        assert!(detector.detect_regions(&fragments, 2000.0).is_empty());
    }

    #[test]
    fn test_strong_ui_row_alone_is_keyboard() {
        let detector = KeyboardDetector::new(KeyboardDetectorConfig::default());
        let fragments = vec![token("English", 100.0, 1800.0), token("?123", 20.0, 1805.0)];

        let regions = detector.detect_regions(&fragments, 2000.0);
        assert_eq!(regions.len(), 1);
    }
}
