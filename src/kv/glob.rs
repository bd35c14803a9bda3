//! Redis-style glob patterns (`*`, `?`, `[abc]`, `[^a-z]`, `\` escapes).

use regex::Regex;

use crate::error::StoreError;

/// A compiled glob pattern matched against whole keys.
#[derive(Debug, Clone)]
pub struct GlobPattern {
  regex: Regex,
}

impl GlobPattern {
  pub fn new(pattern: &str) -> Result<Self, StoreError> {
    let invalid = |reason: &str| StoreError::InvalidPattern {
      pattern: pattern.to_string(),
      reason: reason.to_string(),
    };

    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
      match c {
        '*' => re.push_str(".*"),
        '?' => re.push('.'),
        '\\' => match chars.next() {
          Some(escaped) => re.push_str(&regex::escape(&escaped.to_string())),
          None => return Err(invalid("trailing escape")),
        },
        '[' => {
          re.push('[');
          if chars.peek() == Some(&'^') {
            chars.next();
            re.push('^');
          }
          let mut closed = false;
          while let Some(inner) = chars.next() {
            match inner {
              ']' => {
                closed = true;
                break;
              }
              '\\' => {
                let escaped = chars.next().ok_or_else(|| invalid("trailing escape"))?;
                re.push_str(&regex::escape(&escaped.to_string()));
              }
              '-' => re.push('-'),
              other => re.push_str(&regex::escape(&other.to_string())),
            }
          }
          if !closed {
            return Err(invalid("unterminated character class"));
          }
          re.push(']');
        }
        other => re.push_str(&regex::escape(&other.to_string())),
      }
    }
    re.push('$');

    let regex = Regex::new(&re).map_err(|e| invalid(&e.to_string()))?;
    Ok(Self { regex })
  }

  pub fn matches(&self, key: &str) -> bool {
    self.regex.is_match(key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_star_matches_prefix() {
    let glob = GlobPattern::new("products:*").unwrap();
    assert!(glob.matches("products:page:1:abc"));
    assert!(glob.matches("products:"));
    assert!(!glob.matches("product:shoe"));
  }

  #[test]
  fn test_question_and_class() {
    let glob = GlobPattern::new("cart:?[0-9]").unwrap();
    assert!(glob.matches("cart:a1"));
    assert!(!glob.matches("cart:ab"));

    let negated = GlobPattern::new("h[^e]llo").unwrap();
    assert!(negated.matches("hallo"));
    assert!(!negated.matches("hello"));
  }

  #[test]
  fn test_regex_metacharacters_are_literal() {
    let glob = GlobPattern::new("a.b+c").unwrap();
    assert!(glob.matches("a.b+c"));
    assert!(!glob.matches("axbbc"));
  }

  #[test]
  fn test_escaped_star() {
    let glob = GlobPattern::new(r"literal\*").unwrap();
    assert!(glob.matches("literal*"));
    assert!(!glob.matches("literally"));
  }

  #[test]
  fn test_invalid_patterns() {
    assert!(GlobPattern::new("[abc").is_err());
    assert!(GlobPattern::new("abc\\").is_err());
  }
}
