use proptest::prelude::*;

use buildcast::exec::LineFramer;

fn frame_all(bytes: &[u8], cuts: &[usize]) -> Vec<String> {
    let mut framer = LineFramer::new();
    let mut out = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        out.extend(framer.feed(&bytes[start..cut]));
        start = cut;
    }
    out.extend(framer.feed(&bytes[start..]));
    out.extend(framer.flush());
    out
}

// Sorted, deduplicated cut points inside `0..=len`.
fn cuts_for(len: usize, raw: Vec<usize>) -> Vec<usize> {
    let mut cuts: Vec<usize> = raw.into_iter().map(|c| c % (len + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();
    cuts
}

#[test]
fn chunk_boundaries_do_not_split_lines() {
    let bytes = b"abcdef\nghi\njkl";
    let lines = frame_all(bytes, &[3, 11]);
    assert_eq!(lines, vec!["abcdef", "ghi", "jkl"]);
}

proptest! {
    #[test]
    fn any_chunking_yields_the_same_lines(
        lines in proptest::collection::vec("[^\n]{0,20}", 0..12),
        trailing_newline in any::<bool>(),
        raw_cuts in proptest::collection::vec(any::<usize>(), 0..16),
    ) {
        let mut text = lines.join("\n");
        if trailing_newline && !lines.is_empty() {
            text.push('\n');
        }
        let bytes = text.as_bytes();

        let whole = frame_all(bytes, &[]);
        let chunked = frame_all(bytes, &cuts_for(bytes.len(), raw_cuts));
        prop_assert_eq!(&chunked, &whole);

        // Every byte except the separators comes out exactly once.
        let emitted: usize = chunked.iter().map(|l| l.len()).sum();
        let newlines = bytes.iter().filter(|&&b| b == b'\n').count();
        prop_assert_eq!(emitted, bytes.len() - newlines);
        prop_assert!(chunked.iter().all(|l| !l.contains('\n')));
    }

    #[test]
    fn framed_lines_match_str_lines(
        lines in proptest::collection::vec("[a-z ]{0,12}", 1..8),
        raw_cuts in proptest::collection::vec(any::<usize>(), 0..8),
    ) {
        let text = format!("{}\n", lines.join("\n"));
        let bytes = text.as_bytes();
        let framed = frame_all(bytes, &cuts_for(bytes.len(), raw_cuts));
        prop_assert_eq!(framed, lines);
    }
}
