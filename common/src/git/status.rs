// Parsing of `git status --porcelain -z` output

/// One entry of porcelain v1 status output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Index (staging area) status column
    pub index: char,
    /// Working tree status column
    pub worktree: char,
    pub path: String,
}

impl StatusEntry {
    /// Whether the entry has changes recorded in the index
    pub fn is_staged(&self) -> bool {
        !matches!(self.index, ' ' | '?' | '!')
    }
}

/// Parse NUL-separated porcelain v1 output
///
/// Renames and copies carry their source path in the following field,
/// which is skipped.
pub fn parse_porcelain(output: &str) -> Vec<StatusEntry> {
    let mut entries = Vec::new();
    let mut fields = output.split('\0').filter(|f| !f.is_empty());

    while let Some(field) = fields.next() {
        let mut chars = field.chars();
        let (Some(index), Some(worktree)) = (chars.next(), chars.next()) else {
            continue;
        };
        let path = field.get(3..).unwrap_or_default().to_string();

        if matches!(index, 'R' | 'C') {
            fields.next();
        }

        entries.push(StatusEntry {
            index,
            worktree,
            path,
        });
    }

    entries
}
