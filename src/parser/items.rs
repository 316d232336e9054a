use serde::{Deserialize, Serialize};

use super::lines::{classify_lines, Line};

/// A main point with its (never empty) list of sub-points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub main: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_points: Option<Vec<String>>,
}

impl ListItem {
    pub fn new(main: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            sub_points: None,
        }
    }

    #[cfg(test)]
    pub fn with_sub_points(main: impl Into<String>, subs: &[&str]) -> Self {
        let subs: Vec<String> = subs.iter().map(|s| s.to_string()).collect();
        Self {
            main: main.into(),
            sub_points: if subs.is_empty() { None } else { Some(subs) },
        }
    }

    pub fn sub_points(&self) -> &[String] {
        self.sub_points.as_deref().unwrap_or_default()
    }

    fn push_sub_point(&mut self, text: String) {
        self.sub_points.get_or_insert_with(Vec::new).push(text);
    }

    /// Soft-wrapped line: extends the last sub-point, or the main text.
    fn continue_with(&mut self, text: &str) {
        let target = match self.sub_points.as_mut().and_then(|subs| subs.last_mut()) {
            Some(last) => last,
            None => &mut self.main,
        };
        if !target.is_empty() {
            target.push(' ');
        }
        target.push_str(text);
    }
}

/// Fold accumulator: items built so far plus the item in progress.
#[derive(Default)]
struct ListBuilder {
    items: Vec<ListItem>,
    current: Option<ListItem>,
}

impl ListBuilder {
    fn push(mut self, line: Line) -> Self {
        match line {
            Line::Main(text) => {
                self.flush();
                self.current = Some(ListItem::new(text));
            }
            // Sub-points and continuations before the first main point are dropped.
            Line::Sub(text) => {
                if let Some(item) = self.current.as_mut() {
                    item.push_sub_point(text);
                }
            }
            Line::Text(text) => {
                if let Some(item) = self.current.as_mut() {
                    item.continue_with(&text);
                }
            }
            Line::Header(_) | Line::Empty => {}
        }
        self
    }

    fn flush(&mut self) {
        if let Some(item) = self.current.take() {
            self.items.push(item);
        }
    }

    fn finish(mut self) -> Vec<ListItem> {
        self.flush();
        self.items
    }
}

/// Recover the ordered main points (and their sub-points) of a section body.
pub fn parse_items(body: &str) -> Vec<ListItem> {
    classify_lines(body)
        .into_iter()
        .fold(ListBuilder::default(), ListBuilder::push)
        .finish()
}
