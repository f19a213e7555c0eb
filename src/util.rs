//! Small utility helpers used across modules.

/// Replaces occurrences of `{key}` in the template with provided values.
/// No nesting or conditionals.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings. Cuts on a char boundary.
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
  fn fills_known_keys_only() {
    let out = fill_template("make {count} questions about '{name}' {other}", &[("count", "4"), ("name", "a.pdf")]);
    assert_eq!(out, "make 4 questions about 'a.pdf' {other}");
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    assert_eq!(trunc_for_log("short", 10), "short");
    let out = trunc_for_log("ééééé", 3);
    assert!(out.starts_with("é…"));
    assert!(out.ends_with("(10 bytes total)"));
  }
}
