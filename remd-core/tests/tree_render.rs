// Tree building and rendering over hand-made retrieved files.

use remd_core::contract::{RetrievedFile, SkipReason, TreeEntry};
use remd_core::error::ConvertError;
use remd_core::render::{fence_for, render};
use remd_core::tree::build;

fn text(path: &str, content: &str) -> RetrievedFile {
    RetrievedFile::text(TreeEntry::file(path, "sha", None), content.as_bytes().to_vec())
}

fn sample_files() -> Vec<RetrievedFile> {
    vec![
        text("src/main.rs", "fn main() {}"),
        RetrievedFile::binary(TreeEntry::file("logo.png", "sha", Some(10))),
        text("README.md", "# App\n"),
        text("src/lib.rs", "pub fn answer() -> u32 {\n    42\n}\n"),
    ]
}

#[test]
fn test_render_full_document() {
    let root = build(sample_files()).expect("tree builds");
    let document = render("acme/app", &root);

    let expected = "\
# Repository: acme/app

## File Structure

```
├── src/
│   ├── lib.rs
│   └── main.rs
├── README.md
└── logo.png
```

## Files

### `src/lib.rs`

```rust
pub fn answer() -> u32 {
    42
}
```

### `src/main.rs`

```rust
fn main() {}
```

### `README.md`

```markdown
# App
```

### `logo.png`

> Skipped: binary content

";
    assert_eq!(document, expected);
}

#[test]
fn test_render_is_independent_of_input_order() {
    let forward = build(sample_files()).expect("tree builds");
    let mut reversed_files = sample_files();
    reversed_files.reverse();
    let reversed = build(reversed_files).expect("tree builds");

    let a = render("acme/app", &forward);
    let b = render("acme/app", &reversed);
    assert_eq!(a, b);
    assert_eq!(a, render("acme/app", &forward), "rendering is repeatable");
}

#[test]
fn test_directories_precede_files_at_every_level() {
    let root = build(vec![
        text("z.txt", "z"),
        text("a/z.txt", "z"),
        text("a/b/c.txt", "c"),
        text("a/a.txt", "a"),
    ])
    .expect("tree builds");

    let order: Vec<&str> = root.files().iter().map(|f| f.path()).collect();
    assert_eq!(order, vec!["a/b/c.txt", "a/a.txt", "a/z.txt", "z.txt"]);
}

#[test]
fn test_fence_outgrows_backticks_in_content() {
    let content = "Example:\n````rust\nlet x = 1;\n````\n";
    let root = build(vec![text("docs/guide.md", content)]).expect("tree builds");
    let document = render("acme/app", &root);

    assert_eq!(fence_for(content), "`````");
    assert!(document.contains("`````markdown\nExample:\n````rust\n"));
    assert!(document.contains("let x = 1;\n````\n`````\n"));
}

#[test]
fn test_skipped_files_keep_heading_and_reason() {
    let root = build(vec![
        RetrievedFile::skipped(
            TreeEntry::file("data/huge.csv", "sha", Some(5_000_000)),
            SkipReason::TooLarge {
                size: 5_000_000,
                limit: 1_000_000,
            },
        ),
        RetrievedFile::skipped(
            TreeEntry::file("notes.txt", "sha", None),
            SkipReason::FetchError {
                message: "rate limit exceeded: api.github.com\nretry later".to_string(),
            },
        ),
    ])
    .expect("tree builds");
    let document = render("acme/app", &root);

    assert!(document.contains("### `data/huge.csv`\n\n> Skipped: file too large (5000000 bytes, limit 1000000 bytes)\n"));
    assert!(document.contains(
        "### `notes.txt`\n\n> Skipped: fetch failed: rate limit exceeded: api.github.com retry later\n"
    ));
    assert!(document.contains("├── data/\n│   └── huge.csv\n└── notes.txt\n"));
}

#[test]
fn test_empty_tree_renders_headings_only() {
    let root = build(Vec::new()).expect("empty tree builds");
    assert!(root.is_empty());
    assert_eq!(
        render("acme/empty", &root),
        "# Repository: acme/empty\n\n## File Structure\n\n```\n```\n\n## Files\n\n"
    );
}

#[test]
fn test_file_and_directory_with_same_path_conflict() {
    let err = build(vec![text("docs", "a file"), text("docs/intro.md", "# Intro")]).unwrap_err();
    assert!(matches!(err, ConvertError::TreeConflict(ref p) if p == "docs"), "{err:?}");

    let err = build(vec![text("docs/intro.md", "# Intro"), text("docs", "a file")]).unwrap_err();
    assert!(matches!(err, ConvertError::TreeConflict(ref p) if p == "docs"), "{err:?}");

    let err = build(vec![text("a.txt", "1"), text("a.txt", "2")]).unwrap_err();
    assert!(matches!(err, ConvertError::TreeConflict(_)), "{err:?}");
}
