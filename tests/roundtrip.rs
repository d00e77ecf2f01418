//! Property tests: generated diffs parse, apply and reverse losslessly,
//! and hostile input never panics.

use hunkwise::core::{
    MemoryProvider, Patch, Script, apply, combine_diffs, generate_diff, parse, parse_report,
    model::{ChangeKind, FilePatch, Hunk},
    reverse,
};
use proptest::prelude::*;

const PATH: &str = "src/module.py";

/// Text over a tiny alphabet so that diffs share plenty of context.
fn text() -> impl Strategy<Value = String>
{
    (prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d", "", "  x = 1"]), 0..24), any::<bool>())
        .prop_map(|(lines, trailing)| {
            let mut out = lines.join("\n");
            if trailing && !lines.is_empty()
            {
                out.push('\n');
            }
            out
        })
}

/// Hunk header numbers, biased towards the edges.
fn header_number() -> impl Strategy<Value = usize>
{
    prop_oneof![
        Just(0usize),
        Just(1usize),
        Just(usize::MAX),
        Just(usize::MAX - 1),
        0usize..8,
        any::<usize>(),
    ]
}

/// Diff-shaped text: file headers, git headers, hunk headers with any
/// numbers, body lines and markers in arbitrary order.
fn diff_like() -> impl Strategy<Value = String>
{
    let header = (header_number(), header_number(), header_number(), header_number())
        .prop_map(|(a, b, c, d)| format!("@@ -{a},{b} +{c},{d} @@"));
    let line = prop_oneof![
        Just("--- a/f".to_string()),
        Just("+++ b/f".to_string()),
        Just("--- /dev/null".to_string()),
        Just("+++ /dev/null".to_string()),
        Just("diff --git a/f b/g".to_string()),
        Just("rename from f".to_string()),
        Just("rename to g".to_string()),
        Just("new file mode 100644".to_string()),
        Just("deleted file mode 100644".to_string()),
        Just("Binary files a/f and b/f differ".to_string()),
        Just("\\ No newline at end of file".to_string()),
        Just(String::new()),
        header,
        "[ +-][a-c]{0,3}",
    ];
    (prop::collection::vec(line, 0..32), any::<bool>()).prop_map(|(lines, trailing)| {
        let mut out = lines.join("\n");
        if trailing
        {
            out.push('\n');
        }
        out
    })
}

fn apply_text(
    patch: &Patch,
    content: &str,
) -> String
{
    let mut provider = MemoryProvider::new().with_file(PATH, content);
    let report = apply(patch, &mut provider, false);
    assert!(report.is_clean(), "conflicts: {:?}", report.conflicts());
    provider.get(PATH)
        .unwrap_or_default()
        .to_string()
}

/// Old/new line counts in each header match the body.
fn counts_hold(hunk: &Hunk) -> bool
{
    let old = hunk
        .changes()
        .iter()
        .filter(|c| c.kind != ChangeKind::Added)
        .count();
    let new = hunk
        .changes()
        .iter()
        .filter(|c| c.kind != ChangeKind::Removed)
        .count();
    old == hunk.old_count() && new == hunk.new_count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn parsed_diff_applies_to_original(original in text(), modified in text(), context in 0usize..4)
    {
        let diff = generate_diff(&original, &modified, PATH, context);
        let patch = parse(&diff);
        if original == modified
        {
            prop_assert!(diff.is_empty());
            prop_assert!(patch.is_empty());
        }
        else
        {
            prop_assert_eq!(apply_text(&patch, &original), modified);
        }
    }

    #[test]
    fn reverse_undoes_apply(original in text(), modified in text())
    {
        let patch = parse(&generate_diff(&original, &modified, PATH, 3));
        prop_assume!(!patch.is_empty());

        let patched = apply_text(&patch, &original);
        prop_assert_eq!(apply_text(&reverse(&patch), &patched), original);
    }

    #[test]
    fn hunk_counts_match_bodies(original in text(), modified in text())
    {
        let patch = parse(&generate_diff(&original, &modified, PATH, 2));
        for hunk in patch.files().flat_map(FilePatch::hunks)
        {
            prop_assert!(counts_hold(hunk));
        }
    }

    #[test]
    fn rendering_reparses_equal(original in text(), modified in text())
    {
        let patch = parse(&generate_diff(&original, &modified, PATH, 3));
        prop_assert_eq!(parse(&patch.to_unified_diff()), patch);
    }

    #[test]
    fn arbitrary_text_parses_without_panicking(input in any::<String>())
    {
        let report = parse_report(&input);
        prop_assert!(report.patch.len() <= input.lines().count());
    }

    #[test]
    fn diff_shaped_input_never_panics(input in diff_like(), content in text())
    {
        let report = parse_report(&input);
        let patch = report.patch;
        let _ = parse(&patch.to_unified_diff());
        let undo = reverse(&patch);

        let mut provider = MemoryProvider::new()
            .with_file("f", content.clone())
            .with_file("g", content);
        let _ = apply(&patch, &mut provider, true);
        let _ = apply(&patch, &mut provider, false);
        let _ = apply(&undo, &mut provider, false);
        let _ = Script::from_patch(&patch).replay(&mut provider, true);
    }

    #[test]
    fn rewritten_hunk_headers_never_panic(
        original in text(),
        modified in text(),
        numbers in (header_number(), header_number(), header_number(), header_number())
    )
    {
        let (a, b, c, d) = numbers;
        let diff: String = generate_diff(&original, &modified, PATH, 1)
            .lines()
            .map(|line| {
                if line.starts_with("@@ ")
                {
                    format!("@@ -{a},{b} +{c},{d} @@\n")
                }
                else
                {
                    format!("{line}\n")
                }
            })
            .collect();

        let patch = parse(&diff);
        let mut provider = MemoryProvider::new().with_file(PATH, original);
        let _ = apply(&patch, &mut provider, false);
        let _ = apply(&reverse(&patch), &mut provider, true);
    }

    #[test]
    fn combined_order_ignores_input_order(names in prop::collection::btree_set("[a-z]{1,6}\\.txt", 1..6))
    {
        let diffs: Vec<(String, String)> = names
            .iter()
            .map(|n| (n.clone(), generate_diff("old\n", &format!("{n}\n"), n, 3)))
            .collect();
        let mut shuffled = diffs.clone();
        shuffled.reverse();

        let combined = combine_diffs(diffs);
        prop_assert_eq!(&combined, &combine_diffs(shuffled));

        let paths: Vec<String> = parse(&combined)
            .paths()
            .map(str::to_string)
            .collect();
        let expected: Vec<String> = names.into_iter().collect();
        prop_assert_eq!(paths, expected);
    }
}

#[test]
fn empty_text_parses_to_nothing()
{
    assert!(parse("").is_empty());
    assert_eq!(combine_diffs(Vec::<(String, String)>::new()), "");
}
