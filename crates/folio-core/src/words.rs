//! Word counting: the unit every ledger charge is measured in.

/// Count whitespace-delimited tokens in `text`.
pub fn count_words(text: &str) -> i64 { text.split_whitespace().count() as i64 }

/// The last `max_words` words of `text`, joined by single spaces.
///
/// Used to carry the end of the previous scene into the next prompt.
pub fn tail_words(text: &str, max_words: usize) -> String {
  let words: Vec<&str> = text.split_whitespace().collect();
  let start = words.len().saturating_sub(max_words);
  words[start..].join(" ")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn counts_across_mixed_whitespace() {
    assert_eq!(count_words("The  rain\tfell\n\non the  roof."), 6);
  }

  #[test]
  fn empty_and_blank_text_is_zero() {
    assert_eq!(count_words(""), 0);
    assert_eq!(count_words("  \n\t "), 0);
  }

  #[test]
  fn tail_keeps_last_words() {
    assert_eq!(tail_words("one two three four", 2), "three four");
    assert_eq!(tail_words("one two", 10), "one two");
    assert_eq!(tail_words("", 3), "");
  }
}
