//! Rich text trees for chat and UI output.
//!
//! Chat messages, titles, and disconnect reasons are trees of
//! [`TextComponent`] nodes serialized to the wire's structured-text JSON.
//! The serde attributes keep the wire shape exact: absent fields are
//! omitted, children live under `extra`.

use serde::{Deserialize, Serialize};

/// What happens when the player clicks a text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickAction {
    OpenUrl,
    RunCommand,
    SuggestCommand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub action: ClickAction,
    pub value: String,
}

/// Hover tooltip; only text tooltips are modeled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoverEvent {
    pub action: HoverAction,
    pub value: Box<TextComponent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoverAction {
    ShowText,
}

/// One node of a rich text tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextComponent {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underlined: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strikethrough: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obfuscated: Option<bool>,
    #[serde(rename = "clickEvent", skip_serializing_if = "Option::is_none")]
    pub click_event: Option<ClickEvent>,
    #[serde(rename = "hoverEvent", skip_serializing_if = "Option::is_none")]
    pub hover_event: Option<HoverEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<TextComponent>,
}

impl TextComponent {
    /// A plain text run with no formatting.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn colored(text: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: Some(color.into()),
            ..Default::default()
        }
    }

    pub fn with_bold(mut self, bold: bool) -> Self {
        self.bold = Some(bold);
        self
    }

    /// Makes the run a clickable link.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.click_event = Some(ClickEvent {
            action: ClickAction::OpenUrl,
            value: url.into(),
        });
        self
    }

    pub fn with_hover_text(mut self, tooltip: TextComponent) -> Self {
        self.hover_event = Some(HoverEvent {
            action: HoverAction::ShowText,
            value: Box::new(tooltip),
        });
        self
    }

    pub fn append(mut self, child: TextComponent) -> Self {
        self.extra.push(child);
        self
    }

    /// Flattens the tree to its visible text, children included, formatting
    /// dropped.
    pub fn to_plain(&self) -> String {
        let mut out = String::with_capacity(self.text.len());
        self.collect_plain(&mut out);
        out
    }

    fn collect_plain(&self, out: &mut String) {
        out.push_str(&self.text);
        for child in &self.extra {
            child.collect_plain(out);
        }
    }

    /// Serializes to the wire's structured-text JSON value.
    pub fn to_wire_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "text": self.text }))
    }
}

impl From<&str> for TextComponent {
    fn from(text: &str) -> Self {
        TextComponent::plain(text)
    }
}

/// Formatting-code escape character embedded in legacy display strings.
pub const FORMATTING_CHAR: char = '\u{a7}';

/// Strips legacy formatting codes (`§` plus one selector character) from a
/// string, yielding the plain key used for team membership lookups.
pub fn strip_formatting(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == FORMATTING_CHAR {
            // The selector character is consumed along with the escape.
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}
