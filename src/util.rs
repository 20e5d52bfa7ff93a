//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Normalize a submitted answer letter: trim, uppercase, accept "b)" or "(b)".
pub fn normalize_choice(s: &str) -> String {
  s.trim()
    .trim_matches(|c: char| c == '(' || c == ')' || c == '.')
    .trim()
    .to_ascii_uppercase()
}

/// Log-safe truncation for large strings.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_fills_known_keys_only() {
    let out = fill_template("{a} and {b} but not {c}", &[("a", "1"), ("b", "2")]);
    assert_eq!(out, "1 and 2 but not {c}");
  }

  #[test]
  fn choice_normalization() {
    assert_eq!(normalize_choice(" b "), "B");
    assert_eq!(normalize_choice("(c)"), "C");
    assert_eq!(normalize_choice("d."), "D");
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    assert_eq!(trunc_for_log("short", 10), "short");
    let t = trunc_for_log("ééééé", 3);
    assert!(t.starts_with("é…"));
  }
}
