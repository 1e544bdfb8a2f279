//! Edit strategy classification
//!
//! Maps detected element labels onto prioritized edit actions and renders
//! them into a natural-language instruction for the generative editor.
//!
//! Classification is driven by a rule table ([`StrategyRule`]): the first
//! rule whose keyword appears as a whole word (or word sequence) in the
//! label wins. Labels that match nothing become [`StrategyType::Unknown`]
//! and are routed to manual review instead of being dropped.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Instruction used when no actionable strategy was derived
pub const GENERIC_INSTRUCTION: &str = "Remove all visible brand elements from this product photo: \
logos, brand marks, printed text, wordmarks, and signature patterns. \
Preserve the product's shape, colors, materials, lighting, and background. \
Do not add any new logos or text.";

const INSTRUCTION_HEADER: &str = "Edit this product photo to remove brand identifiers:";

const INSTRUCTION_FOOTER: &str = "Preserve the product's shape, colors, materials, lighting, \
and background. Do not add any new logos or text.";

/// Placeholder replaced by the element label in rule templates
const LABEL_PLACEHOLDER: &str = "{label}";

// ============================================================
// Types
// ============================================================

/// Kind of brand element a strategy targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    /// Curved brand-mark stripes blended into the material
    Swoosh,
    Logo,
    Text,
    Pattern,
    /// Product shape; never edited
    Silhouette,
    /// No rule matched
    Unknown,
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyType::Swoosh => "swoosh",
            StrategyType::Logo => "logo",
            StrategyType::Text => "text",
            StrategyType::Pattern => "pattern",
            StrategyType::Silhouette => "silhouette",
            StrategyType::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Strategy priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Sort rank (lower first)
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

/// What to do with the element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approach {
    Remove,
    Subtle,
    /// Leave in place; kept for audit only
    Ignore,
    /// Needs a human decision; kept out of the instruction
    Review,
}

impl Approach {
    /// Sort rank within a priority (lower first)
    pub fn rank(&self) -> u8 {
        match self {
            Approach::Remove => 0,
            Approach::Subtle => 1,
            Approach::Review => 2,
            Approach::Ignore => 3,
        }
    }

    /// Whether strategies with this approach go into the edit instruction
    pub fn is_active(&self) -> bool {
        matches!(self, Approach::Remove | Approach::Subtle)
    }
}

/// Edit action derived from one detected label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditStrategy {
    #[serde(rename = "type")]
    pub strategy_type: StrategyType,
    pub priority: Priority,
    pub approach: Approach,
    /// Label the strategy was derived from
    pub label: String,
    /// Instruction line for this element (empty when inactive)
    pub instruction: String,
}

impl EditStrategy {
    pub fn is_active(&self) -> bool {
        self.approach.is_active()
    }
}

/// One row of the classification table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyRule {
    pub strategy_type: StrategyType,
    /// Lowercase words or word sequences
    pub keywords: Vec<String>,
    pub priority: Priority,
    pub approach: Approach,
    /// Instruction template; `{label}` is replaced by the element label
    pub template: String,
}

impl StrategyRule {
    pub fn new(
        strategy_type: StrategyType,
        keywords: &[&str],
        priority: Priority,
        approach: Approach,
        template: &str,
    ) -> Self {
        Self {
            strategy_type,
            keywords: keywords.iter().map(|k| normalize_words(k)).collect(),
            priority,
            approach,
            template: template.to_string(),
        }
    }

    /// Whether any keyword occurs in the (normalized) label
    fn matches(&self, normalized_label: &str) -> bool {
        self.keywords
            .iter()
            .filter(|k| !k.is_empty())
            .any(|k| normalized_label.contains(&format!(" {} ", k)))
    }

    fn render(&self, label: &str) -> String {
        self.template.replace(LABEL_PLACEHOLDER, label)
    }
}

/// Built-in rule table, evaluated in order
pub fn default_rules() -> Vec<StrategyRule> {
    vec![
        StrategyRule::new(
            StrategyType::Swoosh,
            &["swoosh", "swooshes", "checkmark", "check mark", "brand mark blend", "jumpman"],
            Priority::Medium,
            Approach::Subtle,
            "Subtly blend the brand mark \"{label}\" into the surrounding material so it is no \
             longer recognizable, keeping the panel's shape and stitching.",
        ),
        StrategyRule::new(
            StrategyType::Text,
            &[
                "text", "wordmark", "word mark", "lettering", "typography", "inscription",
                "writing", "printed name", "slogan",
            ],
            Priority::High,
            Approach::Remove,
            "Remove the text \"{label}\" completely and fill the area with the surrounding \
             material.",
        ),
        StrategyRule::new(
            StrategyType::Logo,
            &[
                "logo", "logos", "emblem", "emblems", "badge", "badges", "brand", "trademark",
                "insignia", "crest", "symbol", "icon",
            ],
            Priority::High,
            Approach::Remove,
            "Remove the logo \"{label}\" and reconstruct the underlying surface.",
        ),
        StrategyRule::new(
            StrategyType::Pattern,
            &[
                "stripe", "stripes", "monogram", "monograms", "pattern", "patterns", "plaid",
                "tartan", "checkerboard", "camo",
            ],
            Priority::Medium,
            Approach::Remove,
            "Replace the signature pattern \"{label}\" with a plain texture in the same colors.",
        ),
        StrategyRule::new(
            StrategyType::Silhouette,
            &["silhouette", "shape", "design", "outline", "profile", "form factor"],
            Priority::Low,
            Approach::Ignore,
            "",
        ),
    ]
}

/// Lowercase, turn every non-alphanumeric run into one space
fn normalize_words(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================
// Classifier
// ============================================================

/// Classified strategies plus the instruction derived from them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPlan {
    /// All strategies, sorted; inactive ones included for audit
    pub strategies: Vec<EditStrategy>,
    /// Instruction for the generative editor (never empty)
    pub instruction: String,
}

impl EditPlan {
    /// Strategies that feed the instruction
    pub fn active(&self) -> impl Iterator<Item = &EditStrategy> {
        self.strategies.iter().filter(|s| s.is_active())
    }

    /// Labels no rule recognized
    pub fn unmatched_labels(&self) -> Vec<String> {
        self.strategies
            .iter()
            .filter(|s| s.strategy_type == StrategyType::Unknown)
            .map(|s| s.label.clone())
            .collect()
    }

    /// Whether the generic fallback instruction is in use
    pub fn is_generic(&self) -> bool {
        self.active().next().is_none()
    }
}

/// Rule-table classifier
#[derive(Debug, Clone)]
pub struct StrategyClassifier {
    rules: Vec<StrategyRule>,
}

impl Default for StrategyClassifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl StrategyClassifier {
    pub fn new(rules: Vec<StrategyRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[StrategyRule] {
        &self.rules
    }

    /// Classify one label
    pub fn classify_label(&self, label: &str) -> EditStrategy {
        let label = label.trim();
        let normalized = format!(" {} ", normalize_words(label));

        match self.rules.iter().find(|r| r.matches(&normalized)) {
            Some(rule) => EditStrategy {
                strategy_type: rule.strategy_type,
                priority: rule.priority,
                approach: rule.approach,
                label: label.to_string(),
                instruction: if rule.approach.is_active() {
                    rule.render(label)
                } else {
                    String::new()
                },
            },
            None => EditStrategy {
                strategy_type: StrategyType::Unknown,
                priority: Priority::Low,
                approach: Approach::Review,
                label: label.to_string(),
                instruction: String::new(),
            },
        }
    }

    /// Classify labels and sort by priority, then approach
    ///
    /// Blank and duplicate labels (case-insensitive) are skipped. The sort is
    /// stable, so equal strategies keep detection order.
    pub fn classify(&self, labels: &[String]) -> Vec<EditStrategy> {
        let mut seen = std::collections::HashSet::new();
        let mut strategies: Vec<EditStrategy> = labels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && seen.insert(l.to_lowercase()))
            .map(|l| self.classify_label(l))
            .collect();

        strategies.sort_by_key(|s| (s.priority.rank(), s.approach.rank()));
        strategies
    }

    /// Classify and build the edit instruction
    pub fn plan(&self, labels: &[String]) -> EditPlan {
        let strategies = self.classify(labels);
        let instruction = build_instruction(&strategies);
        EditPlan {
            strategies,
            instruction,
        }
    }
}

/// Render active strategies as a numbered instruction block
///
/// Falls back to [`GENERIC_INSTRUCTION`] when nothing is active.
pub fn build_instruction(strategies: &[EditStrategy]) -> String {
    let lines: Vec<String> = strategies
        .iter()
        .filter(|s| s.is_active() && !s.instruction.is_empty())
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s.instruction))
        .collect();

    if lines.is_empty() {
        return GENERIC_INSTRUCTION.to_string();
    }

    format!(
        "{}\n{}\n{}",
        INSTRUCTION_HEADER,
        lines.join("\n"),
        INSTRUCTION_FOOTER
    )
}
