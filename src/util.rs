//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Remove the markdown fence the model likes to wrap JSON in: a leading
/// "```" with an optional language tag and a trailing "```". Fences inside
/// the payload (code samples in theory text) are left alone.
pub fn strip_code_fences(s: &str) -> String {
  let t = s.trim();
  let t = match t.strip_prefix("```") {
    Some(rest) => {
      let tag_end = rest.find(|c: char| !c.is_ascii_alphanumeric()).unwrap_or(rest.len());
      rest[tag_end..].trim_start()
    }
    None => t,
  };
  let t = t.trim_end();
  t.strip_suffix("```").unwrap_or(t).trim().to_string()
}

/// Cache key for a topic + difficulty pair: lowercased, trimmed topic.
pub fn normalize_topic(topic: &str) -> String {
  topic.trim().to_lowercase()
}

/// First `max` characters of the text with line breaks flattened to spaces.
pub fn flat_snippet(s: &str, max: usize) -> String {
  let flat = s.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" ");
  flat.chars().take(max).collect()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) { cut -= 1; }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Mask an API key for diagnostics: first 6 chars and the length.
pub fn mask_key(key: &str) -> String {
  let head: String = key.chars().take(6).collect();
  format!("{head}… ({} chars)", key.chars().count())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_all_keys() {
    let out = fill_template("{topic} at {difficulty}, again {topic}", &[("topic", "Mars"), ("difficulty", "easy")]);
    assert_eq!(out, "Mars at easy, again Mars");
  }

  #[test]
  fn fences_are_stripped_idempotently() {
    let fenced = "```json\n{\"a\": 1}\n```";
    let once = strip_code_fences(fenced);
    assert_eq!(once, "{\"a\": 1}");
    assert_eq!(strip_code_fences(&once), once);
    assert_eq!(strip_code_fences("```{\"a\": 1}```"), "{\"a\": 1}");
    assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
  }

  #[test]
  fn inner_fences_survive() {
    let theory = "{\"theory\": \"Example:\\n```python\\nprint(1)\\n```\\n\"}";
    let fenced = format!("```json\n{theory}\n```");
    assert_eq!(strip_code_fences(&fenced), theory);
    assert_eq!(strip_code_fences(theory), theory);
  }

  #[test]
  fn trunc_respects_char_boundaries() {
    let s = "привет мир";
    let t = trunc_for_log(s, 3);
    assert!(t.starts_with('п'));
    assert!(t.contains("bytes total"));
  }

  #[test]
  fn snippet_flattens_lines() {
    assert_eq!(flat_snippet("[b]Intro[/b]\n\nline two\n", 200), "[b]Intro[/b] line two");
    assert_eq!(flat_snippet("abcdef", 3), "abc");
  }
}
