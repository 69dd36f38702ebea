//! Marker-based code injection into generated cut source.
//!
//! The generator emits `SubProcesses/cuts.f` with two recognizable anchor
//! lines. Injection is two passes over the document, performed as one
//! in-memory transaction with a single atomic overwrite at the end:
//!
//! 1. declaration pass: variable-declaration snippets inserted at a fixed
//!    offset below the `passcuts_user` function entry;
//! 2. body pass: the anchor is re-located (pass 1 shifted it), one blank
//!    line is inserted just above the insertion point, then the rendered cut
//!    bodies are inserted in REVERSE declaration order. Each insertion lands
//!    at the same fixed offset, so later insertions push earlier-declared
//!    content down and the final document reads in declaration order.
//!
//! The document is held as a list of newline-terminated segments; inserted
//! blocks are multi-line strings carrying their own terminators, mirroring
//! how the anchors' surrounding comment block was laid out by the generator.

use std::path::Path;

use tracing::debug;

use crate::cuts::RenderedCut;
use crate::error::InjectError;

/// Anchor for the declaration pass: the cut function entry.
pub const DECLARATION_MARKER: &str = "logical function passcuts_user";
/// Lines between the function entry and the declaration insertion point.
pub const DECLARATION_OFFSET: usize = 8;

/// Anchor for the body pass.
pub const BODY_MARKER: &str = "USER-DEFINED CUTS";
/// Lines between the body anchor and the insertion point (skips the
/// anchor's comment block).
pub const BODY_OFFSET: usize = 4;

/// Index of the first line containing `marker`.
///
/// The first occurrence wins; absence is fatal and names both the marker
/// and the document.
pub fn find_marker(lines: &[String], marker: &str, document: &Path) -> Result<usize, InjectError> {
    lines
        .iter()
        .position(|line| line.contains(marker))
        .ok_or_else(|| InjectError::MarkerNotFound {
            marker: marker.to_string(),
            document: document.to_path_buf(),
        })
}

/// Injects declaration snippets and rendered cut bodies into the cut file
/// at `path`.
///
/// Called even with zero cuts: the body pass still inserts its single blank
/// line, which is the only change in that case. On any error the document
/// is left untouched; the mutated content replaces it atomically via a
/// temporary sibling.
pub fn apply_user_cuts(
    path: &Path,
    declarations: &[String],
    cuts: &[RenderedCut],
) -> Result<(), InjectError> {
    let text = std::fs::read_to_string(path)?;
    let mut lines: Vec<String> = text.split_inclusive('\n').map(str::to_owned).collect();

    // declaration pass
    let position = find_marker(&lines, DECLARATION_MARKER, path)? + DECLARATION_OFFSET;
    for snippet in declarations {
        insert(&mut lines, position, snippet.clone());
    }

    // body pass; the anchor may have shifted during pass 1
    let position = find_marker(&lines, BODY_MARKER, path)? + BODY_OFFSET;
    insert(&mut lines, position - 1, "\n".to_string());

    for cut in cuts.iter().rev() {
        debug!("Injecting cut '{}' at line {}", cut.name, position);
        insert(&mut lines, position, cut.body.clone());
    }

    write_atomic(path, &lines.concat())
}

/// List-insert semantics: an offset past the end appends.
fn insert(lines: &mut Vec<String>, position: usize, block: String) {
    let position = position.min(lines.len());
    lines.insert(position, block);
}

fn write_atomic(path: &Path, content: &str) -> Result<(), InjectError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// The canonical anchor layout: function entry at line 1, body anchor
    /// below a padding block, comment block, end.
    fn document() -> String {
        [
            "c other",
            "logical function passcuts_user",
            "c1",
            "c2",
            "c3",
            "c4",
            "c5",
            "c6",
            "c7",
            "c USER-DEFINED CUTS",
            "c a",
            "c b",
            "c c",
            "end",
        ]
        .map(|l| format!("{l}\n"))
        .concat()
    }

    fn rendered(name: &str, body: &str) -> RenderedCut {
        RenderedCut {
            name: name.to_string(),
            body: body.to_string(),
        }
    }

    fn inject(declarations: &[String], cuts: &[RenderedCut]) -> Vec<String> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cuts.f");
        fs::write(&path, document()).unwrap();
        apply_user_cuts(&path, declarations, cuts).unwrap();
        fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn test_find_marker_first_occurrence() {
        let lines: Vec<String> = ["a", "needle one", "needle two"]
            .iter()
            .map(|l| l.to_string())
            .collect();
        let index = find_marker(&lines, "needle", Path::new("doc.f")).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_find_marker_missing_names_marker_and_document() {
        let lines = vec!["a".to_string()];
        let err = find_marker(&lines, "USER-DEFINED CUTS", Path::new("cuts.f")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("USER-DEFINED CUTS"));
        assert!(message.contains("cuts.f"));
    }

    #[test]
    fn test_single_cut_positions() {
        // declaration at marker+8 = index 9; after that the body anchor
        // shifts to 10, blank at 13, body at 14

        let declarations = vec!["      integer i,j\n".to_string()];
        let cuts = [rendered(
            "ptl1min",
            "      if (pt_04(p_reco(0,j)) .lt. 25.0d0) return\n",
        )];
        let lines = inject(&declarations, &cuts);

        assert_eq!(lines[9], "      integer i,j");
        assert_eq!(lines[10], "c USER-DEFINED CUTS");
        assert_eq!(lines[11], "c a");
        assert_eq!(lines[12], "c b");
        assert_eq!(lines[13], "");
        assert!(lines[14].contains("25.0d0"));
        assert_eq!(lines[15], "c c");
        assert_eq!(lines[16], "end");
    }

    #[test]
    fn test_zero_cuts_inserts_only_blank_line() {
        let lines = inject(&[], &[]);
        let original: Vec<String> = document().lines().map(str::to_owned).collect();

        assert_eq!(lines.len(), original.len() + 1);
        assert_eq!(lines[12], "");
        // everything else is untouched
        assert_eq!(&lines[..12], &original[..12]);
        assert_eq!(&lines[13..], &original[12..]);
    }

    #[test]
    fn test_bodies_restore_declaration_order() {
        let cuts = [
            rendered("first", "body first\n"),
            rendered("second", "body second\n"),
            rendered("third", "body third\n"),
        ];
        let lines = inject(&[], &cuts);

        let first = lines.iter().position(|l| l == "body first").unwrap();
        assert_eq!(lines[first + 1], "body second");
        assert_eq!(lines[first + 2], "body third");
    }

    #[test]
    fn test_each_body_preceded_only_by_earlier_declarations() {
        let cuts = [
            rendered("a", "body a\n"),
            rendered("b", "body b\n"),
            rendered("c", "body c\n"),
        ];
        let lines = inject(&[], &cuts);

        let anchor = lines
            .iter()
            .position(|l| l.contains(BODY_MARKER))
            .unwrap();
        let end = lines.iter().position(|l| l == "end").unwrap();
        let between: Vec<&String> = lines[anchor..end].iter().collect();

        let pos_a = between.iter().position(|l| l.as_str() == "body a").unwrap();
        let pos_b = between.iter().position(|l| l.as_str() == "body b").unwrap();
        let pos_c = between.iter().position(|l| l.as_str() == "body c").unwrap();
        assert!(pos_a < pos_b && pos_b < pos_c);
    }

    #[test]
    fn test_multiline_blocks_keep_their_shape() {
        let cuts = [rendered(
            "mmllmax",
            "c     cut for mmllmax\n      do i=1,nexternal-1\n      enddo\n\n",
        )];
        let lines = inject(&[], &cuts);

        let start = lines
            .iter()
            .position(|l| l.contains("cut for mmllmax"))
            .unwrap();
        assert_eq!(lines[start + 1], "      do i=1,nexternal-1");
        assert_eq!(lines[start + 2], "      enddo");
    }

    #[test]
    fn test_missing_body_marker_leaves_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cuts.f");
        let content = "logical function passcuts_user\nend\n";
        fs::write(&path, content).unwrap();

        let result = apply_user_cuts(&path, &[], &[]);
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }
}
