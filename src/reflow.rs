use thiserror::Error;

/// Errors reported by [`reflow`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReflowError {
    #[error("line width must be at least 1 column")]
    InvalidWidth,
}

/// Insert padding spaces into `text` so that, when the result is read as
/// fixed-width rows of `line_width` columns, no word is split across a row
/// boundary.
///
/// Works one simulated row boundary at a time, left to right. A word that
/// straddles a boundary is pushed onto the next row by widening the single
/// space in front of it, and every later boundary is computed against the
/// longer text. A word with no space anywhere on its row is wider than a
/// row and is left unwrapped.
///
/// Only spaces are inserted, and only where a space already was, so the
/// output contains every input character in order (and stays valid UTF-8).
/// Column arithmetic is in bytes; METAR raw text is ASCII.
pub fn reflow(text: &str, line_width: usize) -> Result<String, ReflowError> {
    if line_width == 0 {
        return Err(ReflowError::InvalidWidth);
    }

    let mut out = String::from(text);
    let mut k = 1usize;
    while k * line_width < out.len() {
        let boundary = k * line_width;
        k += 1;

        // A space on the boundary wraps cleanly: zero padding.
        if out.as_bytes()[boundary] == b' ' {
            continue;
        }

        let row_start = boundary - line_width;
        let space_pos = match out.as_bytes()[..boundary].iter().rposition(|&b| b == b' ') {
            // The space must sit on the same row; otherwise the straddling
            // word is wider than a row and cannot be pushed anywhere.
            Some(pos) if pos >= row_start => pos,
            _ => continue,
        };

        // Widen the space so the word starts exactly on the next row.
        let pad = boundary - space_pos;
        out.replace_range(space_pos..space_pos + 1, &" ".repeat(pad));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(text: &str, width: usize) -> Vec<String> {
        text.as_bytes()
            .chunks(width)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect()
    }

    /// Assert that no maximal non-space run short enough to fit a row
    /// crosses a `width`-aligned boundary of `wrapped`.
    fn assert_words_intact(wrapped: &str, width: usize) {
        let bytes = wrapped.as_bytes();
        let mut start: Option<usize> = None;
        for i in 0..=bytes.len() {
            let is_space = i == bytes.len() || bytes[i] == b' ';
            match (is_space, start) {
                (false, None) => start = Some(i),
                (true, Some(s)) => {
                    let end = i - 1;
                    if end - s + 1 <= width {
                        assert_eq!(
                            s / width,
                            end / width,
                            "word at {}..={} crosses a row boundary in {:?}",
                            s,
                            end,
                            wrapped
                        );
                    }
                    start = None;
                }
                _ => {}
            }
        }
    }

    #[test]
    fn short_spaceless_input_is_identity() {
        assert_eq!(reflow("KSFO", 20).unwrap(), "KSFO");
        assert_eq!(reflow("METAR", 5).unwrap(), "METAR");
    }

    #[test]
    fn space_on_boundary_gets_zero_padding() {
        // Row 0 ends exactly where "AAAA" does; the space must be neither
        // duplicated nor dropped.
        assert_eq!(reflow("AAAA BB CCCC", 4).unwrap(), "AAAA BB CCCC");
    }

    #[test]
    fn straddling_word_pushed_to_next_row() {
        let out = reflow("AA BBBB CC", 4).unwrap();
        assert_eq!(out, "AA  BBBB CC");
        assert_eq!(rows(&out, 4), vec!["AA  ", "BBBB", " CC"]);
    }

    #[test]
    fn later_boundaries_use_the_grown_text() {
        // The first insertion shifts every later word; boundaries 2 and 3
        // must be evaluated against the padded text, not the input.
        let out = reflow("A BBB CCC DDD", 4).unwrap();
        assert_eq!(out, "A   BBB CCC DDD");
        assert_eq!(rows(&out, 4), vec!["A   ", "BBB ", "CCC ", "DDD"]);
    }

    #[test]
    fn oversized_word_left_unwrapped() {
        assert_eq!(reflow("AAAAAAAA", 4).unwrap(), "AAAAAAAA");
    }

    #[test]
    fn oversized_word_mid_text_skips_its_boundaries() {
        let out = reflow("WX AAAAAAAAAA OK", 4).unwrap();
        assert_eq!(out, "WX  AAAAAAAAAA  OK");
        // The short words wrap cleanly around the overflowing one.
        assert_words_intact(&out, 4);
    }

    #[test]
    fn words_never_split_in_realistic_report() {
        let raw = "KSFO 061756Z 28012KT 10SM FEW008 SCT200 17/12 A3002 RMK AO2 SLP165";
        for width in [10, 16, 20, 25] {
            let out = reflow(raw, width).unwrap();
            assert_words_intact(&out, width);
            // Character content is preserved; only spaces are added.
            assert_eq!(out.replace(' ', ""), raw.replace(' ', ""));
            assert!(out.len() >= raw.len());
        }
    }

    #[test]
    fn deterministic() {
        let raw = "KORD 061851Z 09008KT 6SM BR OVC004 12/11 A2990";
        assert_eq!(reflow(raw, 16).unwrap(), reflow(raw, 16).unwrap());
    }

    #[test]
    fn rewrapping_is_tolerated_but_not_required_equal() {
        let raw = "KJFK 061751Z 20015G22KT 10SM SCT047 BKN230 24/17 A2993";
        let once = reflow(raw, 12).unwrap();
        let twice = reflow(&once, 12).unwrap();
        // Padding from the first pass can move later boundaries, so the
        // outputs may differ; the second pass must still be well formed.
        assert_words_intact(&twice, 12);
        assert_eq!(twice.replace(' ', ""), raw.replace(' ', ""));
    }

    #[test]
    fn zero_width_rejected() {
        assert_eq!(reflow("anything", 0), Err(ReflowError::InvalidWidth));
        assert_eq!(reflow("", 0), Err(ReflowError::InvalidWidth));
    }

    #[test]
    fn width_one_leaves_multichar_words_alone() {
        // Every multi-character word is oversized at width 1.
        assert_eq!(reflow("AB CD", 1).unwrap(), "AB CD");
    }
}
