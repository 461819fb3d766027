use crate::config::LayoutConfig;
use crate::theme::Theme;

use super::TextBlock;

const ELLIPSIS: char = '\u{2026}';

/// Horizontal room a node label gets inside its box.
const NODE_TEXT_INSET: f32 = 24.0;

pub(super) fn measure_node_label(text: &str, theme: &Theme, config: &LayoutConfig) -> TextBlock {
    let max_width = (config.node_width - NODE_TEXT_INSET * 2.0).max(theme.font_size);
    measure_wrapped(text, theme.font_size, max_width, config.max_label_lines, config)
}

pub(super) fn measure_container_label(text: &str, theme: &Theme, config: &LayoutConfig) -> TextBlock {
    let font_size = theme.font_size;
    let lines = vec![text.trim().to_string()];
    TextBlock {
        width: text_width(&lines[0], font_size),
        height: font_size * config.label_line_height,
        lines,
    }
}

pub(super) fn measure_edge_label(text: &str, theme: &Theme, config: &LayoutConfig) -> TextBlock {
    let font_size = (theme.font_size - 2.0).max(8.0);
    measure_wrapped(text, font_size, config.edge_label_max_width, 2, config)
}

fn measure_wrapped(
    text: &str,
    font_size: f32,
    max_width: f32,
    max_lines: usize,
    config: &LayoutConfig,
) -> TextBlock {
    let mut lines = Vec::new();
    for line in split_lines(text) {
        lines.extend(wrap_line(&line, max_width, font_size));
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    truncate_lines(&mut lines, max_lines.max(1), max_width, font_size);

    let width = lines
        .iter()
        .map(|line| text_width(line, font_size))
        .fold(0.0, f32::max);
    let height = lines.len() as f32 * font_size * config.label_line_height;
    TextBlock {
        lines,
        width,
        height,
    }
}

pub(super) fn char_width_factor(ch: char) -> f32 {
    match ch {
        ' ' => 0.306,
        '.' | ',' | ':' | ';' | '|' | '!' | '\'' | '(' | ')' | '[' | ']' => 0.321,
        'i' | 'j' | 'l' | 'I' => 0.25,
        'f' | 't' | 'r' => 0.35,
        'm' | 'w' => 0.84,
        'M' | 'W' => 0.93,
        '@' | '#' | '%' | '&' => 0.946,
        'A'..='Z' => 0.66,
        'a'..='z' => 0.56,
        '0'..='9' => 0.6,
        '-' | '_' => 0.45,
        _ if (ch as u32) >= 0x2E80 => 1.0,
        _ => 0.568,
    }
}

pub(super) fn split_lines(text: &str) -> Vec<String> {
    text.replace("\\n", "\n")
        .split('\n')
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

pub(super) fn wrap_line(line: &str, max_width: f32, font_size: f32) -> Vec<String> {
    if text_width(line, font_size) <= max_width {
        return vec![line.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if text_width(&candidate, font_size) > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.push_str(word);
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Keep at most `max_lines`, ending the last kept line with an ellipsis when
/// anything was cut. Overlong single words are clipped the same way.
fn truncate_lines(lines: &mut Vec<String>, max_lines: usize, max_width: f32, font_size: f32) {
    let cut = lines.len() > max_lines;
    lines.truncate(max_lines);
    for (idx, line) in lines.iter_mut().enumerate() {
        let is_last = idx + 1 == max_lines;
        if text_width(line, font_size) > max_width || (cut && is_last) {
            *line = clip_with_ellipsis(line, max_width, font_size);
        }
    }
}

fn clip_with_ellipsis(line: &str, max_width: f32, font_size: f32) -> String {
    let budget = max_width - char_width_factor(ELLIPSIS) * font_size;
    let mut out = String::new();
    let mut used = 0.0;
    for ch in line.chars() {
        let w = char_width_factor(ch) * font_size;
        if used + w > budget {
            break;
        }
        used += w;
        out.push(ch);
    }
    let mut out = out.trim_end().to_string();
    out.push(ELLIPSIS);
    out
}

pub(crate) fn text_width(text: &str, font_size: f32) -> f32 {
    text.chars().map(char_width_factor).sum::<f32>() * font_size
}
