use std::fmt;

use crate::model::Id;

/// One segment of a listener pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Id(Id),
    Any,
}

impl Segment {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Segment::Any)
    }
}

impl From<Option<&str>> for Segment {
    fn from(value: Option<&str>) -> Self {
        match value {
            Some(id) => Segment::Id(id.to_string()),
            None => Segment::Any,
        }
    }
}

/// A path whose segments may be wildcards
///
/// `None` arguments of the `add_*_listener` methods become `Segment::Any`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PathPattern(Vec<Segment>);

impl PathPattern {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    /// The pattern with no segments, used by whole-store categories
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_options(segments: &[Option<&str>]) -> Self {
        Self(segments.iter().map(|s| Segment::from(*s)).collect())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of concrete segments before the first wildcard
    pub fn leading_ids(&self) -> usize {
        self.0.iter().take_while(|s| !s.is_wildcard()).count()
    }

    /// Whether this pattern matches a concrete path of the same length
    pub fn matches<S: AsRef<str>>(&self, path: &[S]) -> bool {
        self.0.len() == path.len()
            && self.0.iter().zip(path).all(|(seg, id)| match seg {
                Segment::Any => true,
                Segment::Id(expected) => expected == id.as_ref(),
            })
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match seg {
                Segment::Id(id) => f.write_str(id)?,
                Segment::Any => f.write_str("*")?,
            }
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_with_wildcards() {
        let pattern = PathPattern::from_options(&[Some("pets"), None, Some("color")]);
        assert!(pattern.matches(&["pets", "fido", "color"]));
        assert!(pattern.matches(&["pets", "rex", "color"]));
        assert!(!pattern.matches(&["pets", "fido", "legs"]));
        assert!(!pattern.matches(&["pets", "fido"]));
    }

    #[test]
    fn test_leading_ids() {
        assert_eq!(PathPattern::from_options(&[Some("a"), Some("b")]).leading_ids(), 2);
        assert_eq!(PathPattern::from_options(&[None, Some("b")]).leading_ids(), 0);
        assert_eq!(PathPattern::root().leading_ids(), 0);
    }

    #[test]
    fn test_display() {
        let pattern = PathPattern::from_options(&[Some("pets"), None, Some("color")]);
        assert_eq!(pattern.to_string(), "(pets,*,color)");
    }
}
