//! Which subjects a batch covers

use shared::{Recording, SharedError, SharedResult};

/// Subjects addressed either by an inclusive numeric range or by explicit ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectSelection {
    Range { start: u64, end: u64 },
    List(Vec<String>),
}

impl SubjectSelection {
    /// Validate the mutually exclusive `start/end` and `list` arguments
    pub fn from_args(start: Option<u64>, end: Option<u64>, list: Option<&str>) -> SharedResult<Self> {
        match (start, end, list) {
            (Some(start), Some(end), None) => {
                if start > end {
                    return Err(SharedError::selection(format!("start {start} is after end {end}")));
                }
                Ok(Self::Range { start, end })
            }
            (None, None, Some(list)) => {
                let ids: Vec<String> = list
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if ids.is_empty() {
                    return Err(SharedError::selection("--list is empty"));
                }
                Ok(Self::List(ids))
            }
            (None, None, None) => Err(SharedError::selection("provide either --start and --end, or --list")),
            (Some(_), None, None) | (None, Some(_), None) => {
                Err(SharedError::selection("--start and --end must be given together"))
            }
            _ => Err(SharedError::selection("--list cannot be combined with --start/--end")),
        }
    }

    /// Expand into recordings named `<prefix>-<id>`, dropping repeats
    pub fn recordings(&self, prefix: &str) -> SharedResult<Vec<Recording>> {
        let ids: Vec<String> = match self {
            Self::Range { start, end } => (*start..=*end).map(|i| i.to_string()).collect(),
            Self::List(ids) => ids.clone(),
        };

        let mut recordings: Vec<Recording> = Vec::with_capacity(ids.len());
        for id in ids {
            let recording = Recording::new(prefix, &id)?;
            if !recordings.contains(&recording) {
                recordings.push(recording);
            }
        }
        Ok(recordings)
    }
}
