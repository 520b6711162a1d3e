//! Output planning: filenames, destinations and collision resolution.
//!
//! Planning is pure so the dry-run preview and the committing writer share it
//! and can never disagree. Two collision policies apply per folder:
//!
//! * **BM.04** groups never overwrite: a clash appends ` - 2`, ` - 3`, … to
//!   the base name. Files already on disk count as clashes; a name whose
//!   write failed is free again.
//! * **Everything else** is last-write-wins: a later group with the same
//!   name replaces the earlier one in the output set.

use crate::model::{form_matches, DocumentGroup, OutputArtifact, ServiceType};
use crate::route::route_group;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// File names already present per destination folder.
pub type ExistingFiles = HashMap<Vec<String>, HashSet<String>>;

/// One group's place in the output set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    /// Index into the group list.
    pub group_index: usize,
    pub artifact: OutputArtifact,
    /// Group index of the earlier write this one overwrites.
    pub supersedes: Option<usize>,
}

static RE_UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_\-]+").unwrap());

/// Make `raw` safe as part of a file name: dots are dropped, any other run
/// of unsafe characters becomes `_`.
pub fn sanitize_component(raw: &str) -> String {
    let without_dots = raw.trim().replace('.', "");
    RE_UNSAFE
        .replace_all(&without_dots, "_")
        .trim_matches('_')
        .to_string()
}

/// Sanitised stem of the source file name (`"Bundle 12.pdf"` → `"Bundle_12"`).
pub fn source_base_name(source_file_name: &str) -> String {
    let stem = Path::new(source_file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let base = sanitize_component(&stem);
    if base.is_empty() {
        "document".to_string()
    } else {
        base
    }
}

/// `{source}_{code}{_SERVICE}{_SUBTYPE}.pdf`; suffixes only when set and not OTHER.
pub fn base_filename(source_base: &str, group: &DocumentGroup) -> String {
    let mut name = format!("{}_{}", source_base, sanitize_component(&group.code()));
    if let Some(service) = group.service_type.filter(|s| *s != ServiceType::Other) {
        name.push('_');
        name.push_str(service.as_str());
    }
    if let Some(sub) = group.sub_type.filter(|s| s.is_specific()) {
        name.push('_');
        name.push_str(sub.as_str());
    }
    name.push_str(".pdf");
    name
}

/// `X.pdf` → `X - n.pdf`.
pub fn with_counter(filename: &str, n: usize) -> String {
    match filename.strip_suffix(".pdf") {
        Some(stem) => format!("{stem} - {n}.pdf"),
        None => format!("{filename} - {n}"),
    }
}

/// Whether a group's collisions are resolved by counting rather than overwriting.
pub fn is_counted(group: &DocumentGroup) -> bool {
    form_matches(Some(&group.code()), "BM.04")
}

/// Assigns output names group by group, in page order.
///
/// Each planned name is claimed in its folder until [`Planner::release`]
/// hands it back, so a group whose write failed does not push later BM.04
/// groups onto a counter or mark them as overwrites.
pub struct Planner<'a> {
    source_base: String,
    existing: &'a ExistingFiles,
    /// Folder → file name → group index of the current holder.
    claimed: HashMap<Vec<String>, HashMap<String, usize>>,
}

impl<'a> Planner<'a> {
    pub fn new(source_file_name: &str, existing: &'a ExistingFiles) -> Self {
        Self {
            source_base: source_base_name(source_file_name),
            existing,
            claimed: HashMap::new(),
        }
    }

    pub fn plan(&mut self, group_index: usize, group: &DocumentGroup) -> PlannedWrite {
        let destination_path = route_group(group);
        let base = base_filename(&self.source_base, group);
        let on_disk = self.existing.get(&destination_path);
        let in_folder = self.claimed.entry(destination_path.clone()).or_default();

        let (filename, supersedes) = if is_counted(group) {
            let taken = |name: &str| {
                in_folder.contains_key(name) || on_disk.is_some_and(|d| d.contains(name))
            };
            let mut name = base.clone();
            let mut n = 1;
            while taken(&name) {
                n += 1;
                name = with_counter(&base, n);
            }
            (name, None)
        } else {
            let previous = in_folder.get(&base).copied();
            (base, previous)
        };

        in_folder.insert(filename.clone(), group_index);
        PlannedWrite {
            group_index,
            artifact: OutputArtifact {
                filename,
                destination_path,
                page_range: (group.start_page(), group.end_page()),
                code: group.code(),
                service_type: group.service_type,
                sub_type: group.sub_type,
                is_log: group.is_log(),
            },
            supersedes,
        }
    }

    /// Undo the claim `planned` made: the name goes back to the write it
    /// superseded, or becomes free.
    pub fn release(&mut self, planned: &PlannedWrite) {
        let artifact = &planned.artifact;
        let Some(in_folder) = self.claimed.get_mut(&artifact.destination_path) else {
            return;
        };
        if in_folder.get(&artifact.filename) != Some(&planned.group_index) {
            return;
        }
        match planned.supersedes {
            Some(previous) => {
                in_folder.insert(artifact.filename.clone(), previous);
            }
            None => {
                in_folder.remove(&artifact.filename);
            }
        }
    }
}

/// Plan every group, in order, assuming every write succeeds.
pub fn plan_outputs(
    groups: &[DocumentGroup],
    source_file_name: &str,
    existing: &ExistingFiles,
) -> Vec<PlannedWrite> {
    let mut planner = Planner::new(source_file_name, existing);
    groups
        .iter()
        .enumerate()
        .map(|(group_index, group)| planner.plan(group_index, group))
        .collect()
}

/// Artifacts left in the output set once same-named writes in the same
/// folder have overwritten each other. A replacement keeps the position of
/// the artifact it replaced.
pub fn surviving_artifacts<'a>(
    written: impl IntoIterator<Item = &'a OutputArtifact>,
) -> Vec<OutputArtifact> {
    let mut out: Vec<OutputArtifact> = Vec::new();
    let mut slot_of: HashMap<(Vec<String>, String), usize> = HashMap::new();
    for artifact in written {
        let key = (artifact.destination_path.clone(), artifact.filename.clone());
        match slot_of.get(&key) {
            Some(&slot) => out[slot] = artifact.clone(),
            None => {
                slot_of.insert(key, out.len());
                out.push(artifact.clone());
            }
        }
    }
    out
}
