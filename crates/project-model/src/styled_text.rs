//! Bracket-tag styling for overlay text.
//!
//! Two independent tag families are recognised:
//!
//! - `[color=VALUE]text[/color]` colors a run. `VALUE` is a 3/6-digit hex
//!   color with optional `#`, or a bare alphabetic color name. A run closes at
//!   the first `[/color]` after its opening tag; anything in between, other
//!   opening tags included, is the run's literal text.
//! - `[bg_opacity=N]...[/bg_opacity]` sets the background box opacity for
//!   subtitle and CTA text. These tags are stripped before color parsing.
//!
//! Tags that do not form a complete, well-formed pair are kept verbatim as
//! plain text.

use serde::{Deserialize, Serialize};

/// Color used for text outside any color tag.
pub const DEFAULT_TEXT_COLOR: &str = "white";

/// A run of text sharing one display color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StyledRun {
    Plain(String),
    Colored { text: String, color: String },
}

impl StyledRun {
    pub fn text(&self) -> &str {
        match self {
            StyledRun::Plain(text) => text,
            StyledRun::Colored { text, .. } => text,
        }
    }

    /// Display color, with plain runs reporting [`DEFAULT_TEXT_COLOR`].
    pub fn color(&self) -> &str {
        match self {
            StyledRun::Plain(_) => DEFAULT_TEXT_COLOR,
            StyledRun::Colored { color, .. } => color,
        }
    }
}

/// Parsed overlay text: color runs per line plus the resolved box opacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayText {
    pub lines: Vec<Vec<StyledRun>>,
    /// Background box opacity in percent, `0..=100`.
    pub bg_opacity: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind<'a> {
    Text,
    OpenColor(&'a str),
    CloseColor,
    OpenBgOpacity(&'a str),
    CloseBgOpacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'a> {
    kind: TokenKind<'a>,
    src: &'a str,
}

const OPEN_COLOR: &str = "[color=";
const CLOSE_COLOR: &str = "[/color]";
const OPEN_BG: &str = "[bg_opacity=";
const CLOSE_BG: &str = "[/bg_opacity]";

fn starts_with_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.len() >= needle.len()
        && haystack.as_bytes()[..needle.len()].eq_ignore_ascii_case(needle.as_bytes())
}

/// Match a tag at the start of `s`, returning its kind and byte length.
fn match_tag(s: &str) -> Option<(TokenKind<'_>, usize)> {
    if let Some(rest) = s.strip_prefix(OPEN_COLOR) {
        let end = rest.find(']')?;
        let value = &rest[..end];
        return is_color_value(value)
            .then_some((TokenKind::OpenColor(value), OPEN_COLOR.len() + end + 1));
    }
    if s.starts_with(CLOSE_COLOR) {
        return Some((TokenKind::CloseColor, CLOSE_COLOR.len()));
    }
    if starts_with_ignore_case(s, OPEN_BG) {
        let rest = &s[OPEN_BG.len()..];
        let end = rest.find(|c| c == ']' || c == '[' || c == '\n')?;
        if rest.as_bytes()[end] != b']' {
            return None;
        }
        return Some((
            TokenKind::OpenBgOpacity(&rest[..end]),
            OPEN_BG.len() + end + 1,
        ));
    }
    if starts_with_ignore_case(s, CLOSE_BG) {
        return Some((TokenKind::CloseBgOpacity, CLOSE_BG.len()));
    }
    None
}

/// Grammar accepted inside `[color=...]`.
fn is_color_value(value: &str) -> bool {
    let hex = value.strip_prefix('#').unwrap_or(value);
    let is_hex = (hex.len() == 3 || hex.len() == 6) && hex.bytes().all(|b| b.is_ascii_hexdigit());
    is_hex || is_color_name(value)
}

fn is_color_name(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_alphabetic())
}

/// A value is usable as a color when it is `#` plus 3/6 hex digits or a bare
/// name. Bare digit strings pass the tag grammar but are not colors.
fn is_usable_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => hex.bytes().all(|b| b.is_ascii_hexdigit()),
        None => is_color_name(value),
    }
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < input.len() {
        if input.as_bytes()[i] == b'[' {
            if let Some((kind, len)) = match_tag(&input[i..]) {
                if text_start < i {
                    tokens.push(Token {
                        kind: TokenKind::Text,
                        src: &input[text_start..i],
                    });
                }
                tokens.push(Token {
                    kind,
                    src: &input[i..i + len],
                });
                i += len;
                text_start = i;
                continue;
            }
        }
        i += 1;
    }

    if text_start < input.len() {
        tokens.push(Token {
            kind: TokenKind::Text,
            src: &input[text_start..],
        });
    }
    tokens
}

/// Parse one line of text into color runs.
///
/// An empty line yields no runs.
pub fn parse_styled_line(line: &str) -> Vec<StyledRun> {
    let tokens = tokenize(line);
    let mut runs = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i];
        if let TokenKind::OpenColor(value) = token.kind {
            let close = tokens[i + 1..]
                .iter()
                .position(|t| t.kind == TokenKind::CloseColor)
                .map(|offset| i + 1 + offset);

            if let Some(close) = close {
                if !literal.is_empty() {
                    runs.push(StyledRun::Plain(std::mem::take(&mut literal)));
                }
                let text: String = tokens[i + 1..close].iter().map(|t| t.src).collect();
                runs.push(if is_usable_color(value) {
                    StyledRun::Colored {
                        text,
                        color: value.to_string(),
                    }
                } else {
                    StyledRun::Plain(text)
                });
                i = close + 1;
                continue;
            }
        }
        literal.push_str(token.src);
        i += 1;
    }

    if !literal.is_empty() {
        runs.push(StyledRun::Plain(literal));
    }
    runs
}

/// Parse multi-line text, splitting on `\n` only.
pub fn parse_styled_text(text: &str) -> Vec<Vec<StyledRun>> {
    text.split('\n').map(parse_styled_line).collect()
}

/// Strip every `[bg_opacity=...]`/`[/bg_opacity]` tag and resolve the box
/// opacity from the first opening tag.
///
/// Values that do not parse as an integer in `0..=100` resolve to
/// `default_opacity`, as does text without any opening tag.
pub fn extract_bg_opacity(text: &str, default_opacity: u8) -> (u8, String) {
    let mut opacity = None;
    let mut stripped = String::with_capacity(text.len());

    for token in tokenize(text) {
        match token.kind {
            TokenKind::OpenBgOpacity(value) => {
                if opacity.is_none() {
                    opacity = Some(
                        value
                            .trim()
                            .parse::<u32>()
                            .ok()
                            .filter(|v| *v <= 100)
                            .map(|v| v as u8)
                            .unwrap_or(default_opacity),
                    );
                }
            }
            TokenKind::CloseBgOpacity => {}
            _ => stripped.push_str(token.src),
        }
    }

    (opacity.unwrap_or(default_opacity), stripped)
}

/// Full overlay parse for boxed text roles (subtitle, CTA).
pub fn parse_overlay(text: &str, default_opacity: u8) -> OverlayText {
    let (bg_opacity, stripped) = extract_bg_opacity(text, default_opacity);
    OverlayText {
        lines: parse_styled_text(&stripped),
        bg_opacity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn colored(text: &str, color: &str) -> StyledRun {
        StyledRun::Colored {
            text: text.to_string(),
            color: color.to_string(),
        }
    }

    #[test]
    fn test_colored_then_plain() {
        let runs = parse_styled_line("[color=#ff0000]Hi[/color] there");
        assert_eq!(
            runs,
            vec![colored("Hi", "#ff0000"), StyledRun::Plain(" there".into())]
        );
        assert_eq!(runs[1].color(), "white");
    }

    #[test]
    fn test_unmatched_open_tag_is_plain_text() {
        let runs = parse_styled_line("[color=red]never closed");
        assert_eq!(runs, vec![StyledRun::Plain("[color=red]never closed".into())]);
    }

    #[test]
    fn test_stray_close_tag_is_plain_text() {
        let runs = parse_styled_line("a[/color]b");
        assert_eq!(runs, vec![StyledRun::Plain("a[/color]b".into())]);
    }

    #[test]
    fn test_malformed_color_value_is_literal() {
        let runs = parse_styled_line("[color=#12]x[/color]");
        assert_eq!(runs, vec![StyledRun::Plain("[color=#12]x[/color]".into())]);
    }

    #[test]
    fn test_bare_digit_value_drops_tags_keeps_default_color() {
        let runs = parse_styled_line("[color=123]x[/color]");
        assert_eq!(runs, vec![StyledRun::Plain("x".into())]);
    }

    #[test]
    fn test_run_closes_at_first_close_tag() {
        let runs = parse_styled_line("[color=red]a [color=blue]b[/color]c");
        assert_eq!(
            runs,
            vec![colored("a [color=blue]b", "red"), StyledRun::Plain("c".into())]
        );
    }

    #[test]
    fn test_named_and_short_hex_colors() {
        let runs = parse_styled_line("[color=Yellow]A[/color][color=fff]B[/color][color=#0f0]C[/color]");
        assert_eq!(
            runs,
            vec![
                colored("A", "Yellow"),
                colored("B", "fff"),
                colored("C", "#0f0")
            ]
        );
    }

    #[test]
    fn test_empty_line_has_no_runs() {
        assert!(parse_styled_line("").is_empty());
        assert_eq!(parse_styled_text("a\n\nb").len(), 3);
    }

    #[test]
    fn test_bg_opacity_out_of_range_uses_default() {
        let (opacity, text) = extract_bg_opacity("[bg_opacity=150]text[/bg_opacity]", 90);
        assert_eq!(opacity, 90);
        assert_eq!(text, "text");
    }

    #[test]
    fn test_bg_opacity_in_range_and_case_insensitive() {
        let (opacity, text) = extract_bg_opacity("[BG_OPACITY=0]quiet[/Bg_Opacity]", 70);
        assert_eq!(opacity, 0);
        assert_eq!(text, "quiet");
    }

    #[test]
    fn test_bg_opacity_unparsable_uses_default() {
        let (opacity, text) = extract_bg_opacity("[bg_opacity=abc]x[/bg_opacity]", 70);
        assert_eq!(opacity, 70);
        assert_eq!(text, "x");
    }

    #[test]
    fn test_overlay_strips_opacity_before_colors() {
        let overlay = parse_overlay(
            "[bg_opacity=70][color=#aaaaaa]Try it[/color][/bg_opacity]\nnow",
            90,
        );
        assert_eq!(overlay.bg_opacity, 70);
        assert_eq!(
            overlay.lines,
            vec![
                vec![colored("Try it", "#aaaaaa")],
                vec![StyledRun::Plain("now".into())]
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(input in "\\PC{0,64}") {
            let _ = parse_styled_text(&input);
            let _ = parse_overlay(&input, 90);
        }

        #[test]
        fn prop_untagged_text_is_one_plain_run(input in "[^\\[\\n]{1,64}") {
            let runs = parse_styled_line(&input);
            prop_assert_eq!(runs, vec![StyledRun::Plain(input.clone())]);
        }

        #[test]
        fn prop_runs_never_grow_text(input in "[a-z\\[\\]=/#0-9 ]{0,64}") {
            let total: usize = parse_styled_line(&input).iter().map(|r| r.text().len()).sum();
            prop_assert!(total <= input.len());
        }

        #[test]
        fn prop_opacity_always_in_range(value in 0u32..1000, default in 0u8..=100) {
            let (opacity, _) = extract_bg_opacity(&format!("[bg_opacity={value}]x[/bg_opacity]"), default);
            prop_assert!(opacity <= 100);
            if value <= 100 {
                prop_assert_eq!(opacity as u32, value);
            } else {
                prop_assert_eq!(opacity, default);
            }
        }
    }
}
