//! Folder routing: map a document group onto the filing taxonomy.
//!
//! The taxonomy is a fixed decision table evaluated top to bottom; the first
//! matching rule wins and the router never fails (no match files the group
//! under [`UNCLASSIFIED`]). A missing subtype is filed under a literal
//! `OTHER` folder.
//!
//! ```text
//! BM.01                    → COVER / COVER|KTKS-COVER / sub
//! LOG                      → LOG-FTP / sub
//! SOURCE_MESSAGE           → SOURCE-MESSAGES / sub
//! BM.04                    → SERVICE-x / PROCESSED / POST-TRANSMISSION-CHECK / sub
//! BM.02                    → SERVICE-x / PROCESSED / PROCESSED|KTKS-PROCESSED / sub
//! BM.03                    → SERVICE-x / PRE-TRANSMISSION / KTKS-PRE-TRANSMISSION|PRE-TRANSMISSION-CONTENT / sub
//! service ≠ OTHER          → SERVICE-x / sub
//! otherwise                → UNCLASSIFIED
//! ```
//!
//! [`FolderTree`] collects routed artifacts into an arena-backed tree for
//! previews.

use crate::model::{form_matches, DocumentGroup, OutputArtifact, PageType, ServiceType, SubType};
use serde::Serialize;
use std::fmt::Write as _;

pub const COVER: &str = "COVER";
pub const KTKS_COVER: &str = "KTKS-COVER";
pub const LOG_FTP: &str = "LOG-FTP";
pub const SOURCE_MESSAGES: &str = "SOURCE-MESSAGES";
pub const SERVICE_RTP: &str = "SERVICE-RTP";
pub const SERVICE_EGC: &str = "SERVICE-EGC";
pub const SERVICE_NTX: &str = "SERVICE-NTX";
pub const PROCESSED_MESSAGES: &str = "PROCESSED-MESSAGES";
pub const KTKS_PROCESSED_MESSAGES: &str = "KTKS-PROCESSED-MESSAGES";
pub const POST_TRANSMISSION_CHECK: &str = "POST-TRANSMISSION-CHECK";
pub const PRE_TRANSMISSION: &str = "PRE-TRANSMISSION";
pub const KTKS_PRE_TRANSMISSION: &str = "KTKS-PRE-TRANSMISSION";
pub const PRE_TRANSMISSION_CONTENT: &str = "PRE-TRANSMISSION-CONTENT";
pub const UNCLASSIFIED: &str = "UNCLASSIFIED";

/// Inputs to the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteKey<'a> {
    pub form_code: Option<&'a str>,
    pub service_type: Option<ServiceType>,
    pub sub_type: Option<SubType>,
    pub page_type: Option<PageType>,
}

impl<'a> RouteKey<'a> {
    pub fn for_group(group: &'a DocumentGroup) -> Self {
        Self {
            form_code: group.form_code.as_deref(),
            service_type: group.service_type,
            sub_type: group.sub_type,
            page_type: group.page_type,
        }
    }
}

/// Destination folder segments for a group.
pub fn route_group(group: &DocumentGroup) -> Vec<String> {
    route(RouteKey::for_group(group))
}

/// Evaluate the routing table.
pub fn route(key: RouteKey<'_>) -> Vec<String> {
    let sub = key.sub_type.unwrap_or(SubType::Other).as_str();
    let ktks = key.page_type == Some(PageType::Ktks);
    let has = |fragment: &str| form_matches(key.form_code, fragment);

    let segments: Vec<&str> = if has("BM.01") {
        vec![COVER, if ktks { KTKS_COVER } else { COVER }, sub]
    } else if key.page_type == Some(PageType::Log) {
        vec![LOG_FTP, sub]
    } else if key.page_type == Some(PageType::SourceMessage) {
        vec![SOURCE_MESSAGES, sub]
    } else {
        let service = key.service_type.unwrap_or(ServiceType::Other);
        let service_folder = service_folder(service);
        if has("BM.04") {
            vec![
                service_folder,
                processed_messages_folder(service_folder),
                POST_TRANSMISSION_CHECK,
                sub,
            ]
        } else if has("BM.02") {
            // The non-KTKS branch repeats the parent folder as its own child;
            // the filing system nests it that way.
            let leaf = if ktks {
                ktks_variant(service_folder)
            } else {
                processed_messages_folder(service_folder)
            };
            vec![
                service_folder,
                processed_messages_folder(service_folder),
                leaf,
                sub,
            ]
        } else if has("BM.03") {
            vec![
                service_folder,
                PRE_TRANSMISSION,
                if ktks {
                    KTKS_PRE_TRANSMISSION
                } else {
                    PRE_TRANSMISSION_CONTENT
                },
                sub,
            ]
        } else if service != ServiceType::Other {
            vec![service_folder, sub]
        } else {
            vec![UNCLASSIFIED]
        }
    };

    segments.into_iter().map(str::to_string).collect()
}

/// RTP and OTHER share the RTP tree.
pub fn service_folder(service: ServiceType) -> &'static str {
    match service {
        ServiceType::Egc => SERVICE_EGC,
        ServiceType::Ntx => SERVICE_NTX,
        ServiceType::Rtp | ServiceType::Other => SERVICE_RTP,
    }
}

fn processed_messages_folder(service_folder: &str) -> &'static str {
    if service_folder == SERVICE_EGC {
        "PROCESSED-MESSAGES-EGC"
    } else {
        PROCESSED_MESSAGES
    }
}

fn ktks_variant(service_folder: &str) -> &'static str {
    if service_folder == SERVICE_EGC {
        "KTKS-PROCESSED-MESSAGES-EGC"
    } else {
        KTKS_PROCESSED_MESSAGES
    }
}

// ── Folder tree ──────────────────────────────────────────────────────────

/// Index of a node inside a [`FolderTree`].
pub type NodeId = usize;

/// A folder or a planned file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNode {
    Folder {
        name: String,
        children: Vec<NodeId>,
    },
    File {
        name: String,
        code: String,
        start_page: usize,
        end_page: usize,
    },
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Folder { name, .. } | TreeNode::File { name, .. } => name,
        }
    }
}

/// Arena-backed folder tree. Node 0 is the unnamed root folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderTree {
    nodes: Vec<TreeNode>,
}

impl Default for FolderTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FolderTree {
    pub const ROOT: NodeId = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![TreeNode::Folder {
                name: String::new(),
                children: Vec::new(),
            }],
        }
    }

    /// Build a tree from routed artifacts, in order.
    pub fn from_artifacts(artifacts: &[OutputArtifact]) -> Self {
        let mut tree = Self::new();
        for artifact in artifacts {
            tree.insert(artifact);
        }
        tree
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.nodes.get(id) {
            Some(TreeNode::Folder { children, .. }) => children,
            _ => &[],
        }
    }

    /// Child of `parent` named `name`, if any.
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.nodes[c].name() == name)
    }

    /// Node reached by following folder names from the root.
    pub fn lookup(&self, path: &[&str]) -> Option<NodeId> {
        path.iter()
            .try_fold(Self::ROOT, |id, name| self.find_child(id, name))
    }

    /// Add an artifact, creating folders as needed. A file with the same
    /// name in the same folder is replaced.
    pub fn insert(&mut self, artifact: &OutputArtifact) -> NodeId {
        let mut parent = Self::ROOT;
        for segment in &artifact.destination_path {
            parent = match self.find_child(parent, segment) {
                Some(id) if matches!(self.nodes[id], TreeNode::Folder { .. }) => id,
                _ => self.push_child(
                    parent,
                    TreeNode::Folder {
                        name: segment.clone(),
                        children: Vec::new(),
                    },
                ),
            };
        }

        let file = TreeNode::File {
            name: artifact.filename.clone(),
            code: artifact.code.clone(),
            start_page: artifact.page_range.0,
            end_page: artifact.page_range.1,
        };
        match self.find_child(parent, &artifact.filename) {
            Some(id) if matches!(self.nodes[id], TreeNode::File { .. }) => {
                self.nodes[id] = file;
                id
            }
            _ => self.push_child(parent, file),
        }
    }

    fn push_child(&mut self, parent: NodeId, node: TreeNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        if let TreeNode::Folder { children, .. } = &mut self.nodes[parent] {
            children.push(id);
        }
        id
    }

    /// Number of file nodes.
    pub fn file_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::File { .. }))
            .count()
    }

    /// Indented listing, two spaces per level, folders suffixed with `/`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(Self::ROOT, 0, &mut out);
        out
    }

    fn render_into(&self, id: NodeId, depth: usize, out: &mut String) {
        for &child in self.children(id) {
            let indent = "  ".repeat(depth);
            match &self.nodes[child] {
                TreeNode::Folder { name, .. } => {
                    let _ = writeln!(out, "{indent}{name}/");
                    self.render_into(child, depth + 1, out);
                }
                TreeNode::File {
                    name,
                    start_page,
                    end_page,
                    ..
                } => {
                    let _ = writeln!(out, "{indent}{name}  [pages {start_page}-{end_page}]");
                }
            }
        }
    }
}
