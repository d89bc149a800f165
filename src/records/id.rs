// QA record identifiers

use std::fmt;
use std::str::FromStr;
use crate::constants::QA_ID_SEPARATOR;
use crate::error::AnnotatorError;

/// Structured record identifier: owning group plus position in that group.
/// The textual form `{group}_qa_{index}` is only used on the wire and on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QaId {
    pub group: String,
    pub index: usize,
}

impl QaId {
    pub fn new(group: impl Into<String>, index: usize) -> Self {
        Self {
            group: group.into(),
            index,
        }
    }

    /// Parse a textual id against the groups that actually exist.
    ///
    /// Separator occurrences are tried from the right, so a group whose name
    /// itself contains `_qa_` still resolves as long as it is known.
    pub fn resolve<'a, I>(text: &str, known_groups: I) -> Option<QaId>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let known: Vec<&str> = known_groups.into_iter().collect();

        for (pos, _) in text.rmatch_indices(QA_ID_SEPARATOR) {
            let group = &text[..pos];
            let tail = &text[pos + QA_ID_SEPARATOR.len()..];
            let index = match parse_index(tail) {
                Some(i) => i,
                None => continue,
            };
            if known.contains(&group) {
                return Some(QaId::new(group, index));
            }
        }
        None
    }
}

impl fmt::Display for QaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.group, QA_ID_SEPARATOR, self.index)
    }
}

impl FromStr for QaId {
    type Err = AnnotatorError;

    /// Strict parse: the separator must occur exactly once
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(QA_ID_SEPARATOR).collect();
        if parts.len() != 2 || parts[0].is_empty() {
            return Err(AnnotatorError::MalformedId(s.to_string()));
        }
        let index = parse_index(parts[1]).ok_or_else(|| AnnotatorError::MalformedId(s.to_string()))?;
        Ok(QaId::new(parts[0], index))
    }
}

fn parse_index(tail: &str) -> Option<usize> {
    if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    tail.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let id = QaId::new("seg_01", 3);
        assert_eq!(id.to_string(), "seg_01_qa_3");
        assert_eq!("seg_01_qa_3".parse::<QaId>().unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("seg_01".parse::<QaId>().is_err());
        assert!("seg_01_qa_".parse::<QaId>().is_err());
        assert!("seg_01_qa_x".parse::<QaId>().is_err());
        assert!("_qa_2".parse::<QaId>().is_err());
        assert!("seg_qa_01_qa_2".parse::<QaId>().is_err());
        assert!("seg_01_qa_-1".parse::<QaId>().is_err());
    }

    #[test]
    fn test_resolve_group_containing_separator() {
        let groups = ["seg_qa_01", "other"];
        let id = QaId::resolve("seg_qa_01_qa_2", groups.iter().copied()).unwrap();
        assert_eq!(id.group, "seg_qa_01");
        assert_eq!(id.index, 2);
    }

    #[test]
    fn test_resolve_unknown_group() {
        assert!(QaId::resolve("ghost_qa_0", ["seg"].iter().copied()).is_none());
        assert!(QaId::resolve("seg_qa_zero", ["seg"].iter().copied()).is_none());
    }
}
