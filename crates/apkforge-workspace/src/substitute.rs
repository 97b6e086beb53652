//! Placeholder substitution over the fixed list of template files.

use std::fs;

use apkforge_config::{SubstitutionMode, TemplateLayout};
use tracing::debug;

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::model::{BuildFields, Placeholder, Workspace};

/// Rewrite every substituted file of `workspace` with the caller's values.
///
/// Returns the total number of replacements performed.
///
/// # Errors
///
/// Returns an IO error when a listed file is missing or cannot be rewritten.
pub fn substitute(
    workspace: &Workspace,
    layout: &TemplateLayout,
    fields: &BuildFields,
    mode: SubstitutionMode,
) -> WorkspaceResult<usize> {
    let mut total = 0;
    for relative in &layout.substituted_files {
        let path = workspace.path().join(relative);
        let contents = fs::read_to_string(&path)
            .map_err(|source| WorkspaceError::io("substitute.read", &path, source))?;
        let (rewritten, replaced) = replace_tokens(&contents, fields, mode);
        if replaced > 0 {
            fs::write(&path, rewritten)
                .map_err(|source| WorkspaceError::io("substitute.write", &path, source))?;
        }
        debug!(file = %relative.display(), replaced, "placeholders substituted");
        total += replaced;
    }
    Ok(total)
}

/// Replace placeholder tokens in `contents`.
///
/// Matches are located in the original text only, so inserted values are
/// never rescanned. Matching is literal. Returns the rewritten text and the
/// replacement count.
#[must_use]
pub fn replace_tokens(contents: &str, fields: &BuildFields, mode: SubstitutionMode) -> (String, usize) {
    let mut matches: Vec<(usize, Placeholder)> = Vec::new();
    for placeholder in Placeholder::ALL {
        let mut found = contents.match_indices(placeholder.token()).map(|(start, _)| (start, placeholder));
        match mode {
            SubstitutionMode::FirstOccurrence => matches.extend(found.next()),
            SubstitutionMode::Global => matches.extend(found),
        }
    }
    matches.sort_unstable_by_key(|(start, _)| *start);

    let mut output = String::with_capacity(contents.len());
    let mut cursor = 0;
    let mut replaced = 0;
    for (start, placeholder) in matches {
        // Overlapping matches are skipped.
        if start < cursor {
            continue;
        }
        output.push_str(&contents[cursor..start]);
        output.push_str(fields.value(placeholder));
        cursor = start + placeholder.token().len();
        replaced += 1;
    }
    output.push_str(&contents[cursor..]);
    (output, replaced)
}
