use std::{collections::HashMap, path::Path};

/// Maps class ids to display strings (§6, "Labels file"). A missing id renders as its decimal
/// value, so lookups never fail.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    labels: HashMap<u32, String>,
}

impl LabelMap {
    pub fn empty() -> Self {
        Self {
            labels: HashMap::new(),
        }
    }

    /// Parses a labels file. Each line is either a bare label (implicit id = line number,
    /// starting at 0) or `<id><whitespace><label>`.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut labels = HashMap::new();
        for (line_no, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            match line.split_once(char::is_whitespace) {
                Some((id_str, rest)) if id_str.parse::<u32>().is_ok() => {
                    let id: u32 = id_str.parse().unwrap();
                    labels.insert(id, rest.trim().to_string());
                }
                _ => {
                    labels.insert(line_no as u32, line.trim().to_string());
                }
            }
        }
        Self { labels }
    }

    /// Looks up the display string for `id`, falling back to its decimal representation.
    pub fn get(&self, id: u32) -> String {
        self.labels
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Number of distinct class ids this map has a label for.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_ids_are_line_numbers() {
        let map = LabelMap::parse("cat\ndog\nbird\n");
        assert_eq!(map.get(0), "cat");
        assert_eq!(map.get(1), "dog");
        assert_eq!(map.get(2), "bird");
    }

    #[test]
    fn explicit_ids_are_respected() {
        let map = LabelMap::parse("3 person\n7 car\n");
        assert_eq!(map.get(3), "person");
        assert_eq!(map.get(7), "car");
    }

    #[test]
    fn missing_id_renders_as_decimal() {
        let map = LabelMap::parse("cat\n");
        assert_eq!(map.get(42), "42");
    }
}
