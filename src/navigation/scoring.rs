//! Candidate scoring.
//!
//! An element is scored by an ordered list of weighted rules evaluated over a
//! normalized blob of its text and attributes. Every visible element is
//! scored; any element with a positive total is a candidate.

use super::model::{DocumentSnapshot, ElementRef, ElementSnapshot};
use crate::config::ScoreWeights;
use serde::Serialize;

/// Forward-navigation vocabulary.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    // English
    "next",
    "continue",
    "forward",
    "proceed",
    "go on",
    "next page",
    "next slide",
    // German
    "weiter",
    "nächste",
    "vorwärts",
    // French
    "suivant",
    "suivante",
    "continuer",
    // Spanish / Portuguese
    "siguiente",
    "continuar",
    "próximo",
    "próxima",
    "avançar",
    // Italian
    "avanti",
    "successivo",
    "continua",
    // Dutch
    "volgende",
    "verder",
    // Polish
    "dalej",
    "następny",
    // Russian
    "далее",
    "дальше",
    "вперёд",
    // Japanese / Chinese / Korean
    "次へ",
    "下一步",
    "下一页",
    "继续",
    "다음",
];

/// Arrow glyphs used on unlabeled forward buttons.
pub const ARROW_SYMBOLS: &[&str] = &["→", "›", "»", "❯", "▶", "►", "⟩", "⇨", "➔", "➜", ">"];

/// Class/id tokens that suggest a navigation control.
const NAV_CLASS_HINTS: &[&str] = &[
    "next",
    "nav",
    "navigation",
    "forward",
    "continue",
    "arrow",
    "pager",
    "pagination",
    "advance",
];

/// Class tokens that mark a control as disabled.
const DISABLED_CLASS_HINTS: &[&str] = &["disabled", "inactive", "is-disabled", "locked"];

/// Longest visible text that still counts as an exact label.
const EXACT_TEXT_MAX_CHARS: usize = 24;

/// Condition of a scoring rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Weighted once per distinct matched keyword or symbol.
    Keyword,
    /// Visible text is exactly a keyword or an arrow.
    ExactShortText,
    /// `<button>`, `<a>` or an ARIA button/link.
    NativeControl,
    /// Class or id looks navigation-related.
    NavClass,
    /// Horizontal center right of the viewport center.
    RightOfCenter,
    /// Disabled by attribute, ARIA or class.
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreRule {
    pub predicate: Predicate,
    pub weight: i32,
}

/// Best-scoring element across all documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub target: ElementRef,
    pub score: i32,
    pub text: String,
}

/// Normalized text of an element.
struct Blob {
    /// Lowercase raw text and attributes.
    raw: String,
    /// Alphanumeric tokens, space separated with a leading and trailing space.
    tokens: String,
}

impl Blob {
    fn new(parts: &[&str]) -> Self {
        let raw = parts.join(" ").to_lowercase();
        Self {
            tokens: tokenize(&raw),
            raw,
        }
    }

    fn matches(&self, keyword: &Keyword) -> bool {
        match keyword {
            Keyword::Words(tokens) => self.tokens.contains(tokens.as_str()),
            Keyword::Substring(s) => self.raw.contains(s.as_str()),
        }
    }
}

fn tokenize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        out.push_str(token);
        out.push(' ');
    }
    out
}

#[derive(Debug, Clone)]
enum Keyword {
    /// Matched on token boundaries.
    Words(String),
    /// Matched anywhere; for symbols and scripts written without spaces.
    Substring(String),
}

impl Keyword {
    fn new(word: &str) -> Self {
        let lower = word.trim().to_lowercase();
        let has_alnum = lower.chars().any(char::is_alphanumeric);
        let unspaced_script = lower.chars().any(|c| c as u32 >= 0x2E80);
        if !has_alnum || unspaced_script {
            Keyword::Substring(lower)
        } else {
            Keyword::Words(tokenize(&lower))
        }
    }
}

/// Rule-based element scorer.
#[derive(Debug, Clone)]
pub struct Scorer {
    rules: Vec<ScoreRule>,
    keywords: Vec<Keyword>,
    exact_labels: Vec<String>,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(&ScoreWeights::default(), &[])
    }
}

impl Scorer {
    pub fn new(weights: &ScoreWeights, extra_keywords: &[String]) -> Self {
        let rules = vec![
            ScoreRule {
                predicate: Predicate::Keyword,
                weight: weights.keyword,
            },
            ScoreRule {
                predicate: Predicate::ExactShortText,
                weight: weights.exact_text,
            },
            ScoreRule {
                predicate: Predicate::NativeControl,
                weight: weights.native_control,
            },
            ScoreRule {
                predicate: Predicate::NavClass,
                weight: weights.nav_class,
            },
            ScoreRule {
                predicate: Predicate::RightOfCenter,
                weight: weights.right_of_center,
            },
            ScoreRule {
                predicate: Predicate::Disabled,
                weight: weights.disabled,
            },
        ];

        let words: Vec<&str> = DEFAULT_KEYWORDS
            .iter()
            .copied()
            .chain(extra_keywords.iter().map(String::as_str))
            .collect();

        let keywords = words
            .iter()
            .copied()
            .chain(ARROW_SYMBOLS.iter().copied())
            .map(Keyword::new)
            .collect();

        let exact_labels = words.iter().map(|w| w.trim().to_lowercase()).collect();

        Self {
            rules,
            keywords,
            exact_labels,
        }
    }

    pub fn rules(&self) -> &[ScoreRule] {
        &self.rules
    }

    /// Score one element by summing the weights of the rules it satisfies.
    pub fn score(&self, element: &ElementSnapshot, viewport_width: f64) -> i32 {
        let blob = Blob::new(&[
            &element.text,
            &element.class_name,
            &element.id,
            &element.aria_label,
            &element.title,
            &element.tooltip,
        ]);

        let keyword_hits = self.keywords.iter().filter(|k| blob.matches(k)).count() as i32;

        self.rules
            .iter()
            .map(|rule| match rule.predicate {
                Predicate::Keyword => rule.weight * keyword_hits,
                predicate if self.holds(predicate, element, viewport_width) => rule.weight,
                _ => 0,
            })
            .sum()
    }

    fn holds(&self, predicate: Predicate, element: &ElementSnapshot, viewport_width: f64) -> bool {
        match predicate {
            Predicate::Keyword => false,
            Predicate::ExactShortText => self.is_exact_label(&element.text),
            Predicate::NativeControl => {
                matches!(element.tag.as_str(), "button" | "a")
                    || matches!(element.role.as_str(), "button" | "link")
                    || (element.tag == "input"
                        && element.role.is_empty()
                        && !element.text.is_empty())
            }
            Predicate::NavClass => {
                let tokens = tokenize(&format!("{} {}", element.class_name, element.id).to_lowercase());
                NAV_CLASS_HINTS
                    .iter()
                    .any(|hint| tokens.contains(&format!(" {} ", hint)))
            }
            Predicate::RightOfCenter => {
                viewport_width > 0.0 && element.rect.center_x() > viewport_width / 2.0
            }
            Predicate::Disabled => {
                let classes = format!(" {} ", element.class_name.to_lowercase());
                element.disabled
                    || element.aria_disabled
                    || classes
                        .split_whitespace()
                        .any(|c| DISABLED_CLASS_HINTS.contains(&c))
            }
        }
    }

    fn is_exact_label(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || text.chars().count() > EXACT_TEXT_MAX_CHARS {
            return false;
        }

        let lower = text.to_lowercase();
        let label = ARROW_SYMBOLS
            .iter()
            .fold(lower, |acc, arrow| acc.replace(arrow, ""));
        let label = label.trim();

        label.is_empty() || self.exact_labels.iter().any(|k| k == label)
    }

    /// Highest-scoring visible element with a positive score.
    ///
    /// Documents and elements are visited in order; ties keep the first.
    pub fn best(&self, documents: &[DocumentSnapshot]) -> Option<ScoredCandidate> {
        let mut best: Option<ScoredCandidate> = None;

        for doc in documents {
            for element in doc.elements.iter().filter(|e| e.is_visible()) {
                let score = self.score(element, doc.viewport_width);
                if score <= 0 {
                    continue;
                }
                if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(ScoredCandidate {
                        target: doc.element_ref(element.node_id),
                        score,
                        text: element.text.trim().to_string(),
                    });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::model::Rect;

    fn button(node_id: u32, text: &str) -> ElementSnapshot {
        ElementSnapshot {
            node_id,
            tag: "button".to_string(),
            text: text.to_string(),
            rect: Rect {
                x: 100.0,
                y: 100.0,
                width: 80.0,
                height: 30.0,
            },
            ..Default::default()
        }
    }

    fn doc(elements: Vec<ElementSnapshot>) -> DocumentSnapshot {
        DocumentSnapshot {
            doc_id: "0".to_string(),
            viewport_width: 1280.0,
            elements,
            ..Default::default()
        }
    }

    #[test]
    fn exact_next_outscores_unrelated_text() {
        let scorer = Scorer::default();
        let exact = scorer.score(&button(1, "Next"), 1280.0);
        let filler = scorer.score(&button(2, "Learn more about this topic"), 1280.0);
        assert!(exact > filler, "{exact} <= {filler}");
        assert!(filler > 0);

        let best = scorer
            .best(&[doc(vec![
                button(2, "Learn more about this topic"),
                button(1, "Next"),
            ])])
            .unwrap();
        assert_eq!(best.target.node_id, 1);
    }

    #[test]
    fn positive_score_without_keyword_is_a_candidate() {
        let scorer = Scorer::default();
        let mut open = button(3, "Open");
        open.rect.x = 1000.0;

        let w = ScoreWeights::default();
        assert_eq!(scorer.score(&open, 1280.0), w.native_control + w.right_of_center);

        let best = scorer.best(&[doc(vec![open])]).unwrap();
        assert_eq!(best.target.node_id, 3);
        assert_eq!(best.score, w.native_control + w.right_of_center);
    }

    #[test]
    fn zero_score_is_not_a_candidate() {
        let scorer = Scorer::default();
        let plain = ElementSnapshot {
            node_id: 4,
            tag: "div".to_string(),
            text: "Some paragraph".to_string(),
            rect: Rect {
                x: 10.0,
                y: 10.0,
                width: 200.0,
                height: 30.0,
            },
            ..Default::default()
        };
        assert_eq!(scorer.score(&plain, 1280.0), 0);
        assert!(scorer.best(&[doc(vec![plain])]).is_none());
    }

    #[test]
    fn keyword_requires_word_boundary() {
        let scorer = Scorer::default();
        let w = ScoreWeights::default();
        assert_eq!(scorer.score(&button(1, "Context menu"), 1280.0), w.native_control);
        assert!(scorer.score(&button(1, "Next slide"), 1280.0) >= w.keyword + w.native_control);
    }

    #[test]
    fn multilingual_and_symbol_labels() {
        let scorer = Scorer::default();
        let w = ScoreWeights::default();
        for label in ["Weiter", "Suivant", "Siguiente", "次へ", "→", "Next ›"] {
            let score = scorer.score(&button(1, label), 1280.0);
            assert!(score >= w.keyword, "no match for {label}");
        }
        assert_eq!(scorer.score(&button(1, "Menu"), 1280.0), w.native_control);
    }

    #[test]
    fn attributes_count() {
        let scorer = Scorer::default();
        let el = ElementSnapshot {
            tag: "div".to_string(),
            class_name: "nav-next".to_string(),
            aria_label: "Next page".to_string(),
            rect: Rect {
                x: 1100.0,
                y: 10.0,
                width: 40.0,
                height: 40.0,
            },
            ..Default::default()
        };
        let score = scorer.score(&el, 1280.0);
        // next, next page, nav class, right of center
        let w = ScoreWeights::default();
        assert_eq!(score, 2 * w.keyword + w.nav_class + w.right_of_center);
    }

    #[test]
    fn disabled_is_penalized() {
        let scorer = Scorer::default();
        let mut disabled = button(1, "Next");
        disabled.aria_disabled = true;
        assert!(scorer.score(&disabled, 1280.0) < 0);

        let mut by_class = button(2, "Next");
        by_class.class_name = "btn disabled".to_string();
        assert!(scorer.score(&by_class, 1280.0) < 0);

        assert!(scorer.best(&[doc(vec![disabled, by_class])]).is_none());
    }

    #[test]
    fn invisible_elements_are_skipped() {
        let scorer = Scorer::default();
        let mut hidden = button(1, "Next");
        hidden.display = "none".to_string();
        let visible = button(2, "Continue");
        let best = scorer.best(&[doc(vec![hidden, visible])]).unwrap();
        assert_eq!(best.target.node_id, 2);
    }

    #[test]
    fn ties_keep_document_order() {
        let scorer = Scorer::default();
        let best = scorer
            .best(&[doc(vec![button(1, "Next"), button(2, "Next")])])
            .unwrap();
        assert_eq!(best.target.node_id, 1);
    }

    #[test]
    fn extra_keywords_from_config() {
        let scorer = Scorer::new(&ScoreWeights::default(), &["Onward".to_string()]);
        let w = ScoreWeights::default();
        assert!(scorer.score(&button(1, "Onward"), 1280.0) >= w.keyword);
    }
}
