//! Local spec discovery and the upload decision.

use crate::types::SpecDetails;
use devplan_core::{io, metadata};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Human-authored inputs; never uploaded.
pub const INPUT_SPECS: &[&str] = &[
    "prd.md",
    "tech_brief.md",
    "requirements.md",
    "instructions.md",
    "dependencies.md",
];

pub const SPEC_EXTENSION: &str = ".md";

/// Where `start` writes the task's own description. Listed in
/// [`INPUT_SPECS`], so it is never uploaded back.
pub const TASK_CONTEXT_FILE: &str = "instructions.md";

/// A generated artifact found in the task directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spec {
    /// File name; the key on the server.
    pub name: String,
    pub path: PathBuf,
    pub checksum: String,
    pub content: Vec<u8>,
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn checksum_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn is_spec_file(name: &str) -> bool {
    name.ends_with(SPEC_EXTENSION) && !INPUT_SPECS.contains(&name)
}

/// Markdown artifacts under `dir`, sorted by path. Hidden files and hidden
/// directories are skipped, as are [`INPUT_SPECS`].
pub fn discover_task_specs(dir: &Path) -> std::io::Result<Vec<Spec>> {
    let mut specs = Vec::new();
    // The root itself may be hidden, e.g. `.devplan/specs`.
    let walker = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_spec_file(&name) {
            continue;
        }
        let content = std::fs::read(entry.path())?;
        specs.push(Spec {
            checksum: checksum_bytes(&content),
            name,
            path: entry.into_path(),
            content,
        });
    }
    specs.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(specs)
}

/// The directory a task's specs live in: the service's workspace-relative
/// task dir when it names a safe one, else the sidecar default.
pub fn task_specs_dir(workspace: &Path, task_dir: Option<&str>) -> PathBuf {
    match task_dir.map(Path::new) {
        Some(rel)
            if rel.components().next().is_some()
                && rel.components().all(|c| matches!(c, Component::Normal(_))) =>
        {
            workspace.join(rel)
        }
        _ => metadata::specs_dir(workspace),
    }
}

/// Write the task's title and body as [`TASK_CONTEXT_FILE`] in `dir`,
/// replacing any previous copy.
pub fn persist_task_context(dir: &Path, title: &str, body: &str) -> devplan_core::Result<PathBuf> {
    let path = dir.join(TASK_CONTEXT_FILE);
    let mut doc = format!("# {}\n", title.trim());
    if !body.trim().is_empty() {
        doc.push('\n');
        doc.push_str(body.trim_end());
        doc.push('\n');
    }
    io::atomic_write(&path, doc.as_bytes())?;
    Ok(path)
}

/// True when the server has no entry named like `spec` or its checksum
/// differs.
pub fn should_upload(spec: &Spec, server: &[SpecDetails]) -> bool {
    match server.iter().find(|s| s.name == spec.name) {
        Some(existing) => existing.checksum != spec.checksum,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn spec(name: &str, body: &str) -> Spec {
        Spec {
            name: name.into(),
            path: PathBuf::from(name),
            checksum: checksum_bytes(body.as_bytes()),
            content: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn checksum_known_vector() {
        assert_eq!(checksum_bytes(b""), EMPTY_SHA256);
        let a = checksum_bytes(b"hello");
        assert_eq!(a, checksum_bytes(b"hello"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, checksum_bytes(b"hello\n"));
    }

    #[test]
    fn discovery_filters_hidden_inputs_and_non_markdown() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for f in ["readme.md", "data.json", "script.py", ".hidden.md", "prd.md"] {
            std::fs::write(root.join(f), f).unwrap();
        }
        std::fs::create_dir(root.join(".hidden")).unwrap();
        std::fs::write(root.join(".hidden/secret.md"), "s").unwrap();

        let specs = discover_task_specs(root).unwrap();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["readme.md"]);
        assert_eq!(specs[0].content, b"readme.md");
        assert_eq!(specs[0].checksum, checksum_bytes(b"readme.md"));
    }

    #[test]
    fn discovery_recurses_and_sorts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("sub/b.md"), "b").unwrap();
        std::fs::write(root.join("a.md"), "a").unwrap();
        std::fs::write(root.join("sub/requirements.md"), "r").unwrap();

        let specs = discover_task_specs(root).unwrap();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a.md", "b.md"]);
    }

    #[test]
    fn discovery_descends_into_hidden_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".devplan/specs");
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::write(root.join("plan.md"), "p").unwrap();
        std::fs::write(root.join("nested/code.md"), "c").unwrap();
        std::fs::write(root.join("prd.md"), "input").unwrap();

        let specs = discover_task_specs(&root).unwrap();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["code.md", "plan.md"]);
    }

    #[test]
    fn task_dir_from_service_or_sidecar() {
        let ws = Path::new("/w/proj/add_login");
        assert_eq!(
            task_specs_dir(ws, Some("devplan/auth/t1")),
            ws.join("devplan/auth/t1")
        );
        for unsafe_dir in [None, Some("/etc"), Some("../other"), Some("a/../../b"), Some("")] {
            assert_eq!(task_specs_dir(ws, unsafe_dir), ws.join(".devplan/specs"));
        }
    }

    #[test]
    fn task_context_is_written_but_not_discovered() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("specs");
        let path = persist_task_context(&root, "Add Login", "Users sign in.\n\n").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "# Add Login\n\nUsers sign in.\n"
        );
        std::fs::write(root.join("plan.md"), "p").unwrap();

        let specs = discover_task_specs(&root).unwrap();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["plan.md"]);

        persist_task_context(&root, "Renamed", "").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Renamed\n");
    }

    #[test]
    fn discovery_of_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        assert!(discover_task_specs(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn upload_only_new_or_changed() {
        let local = spec("plan.md", "v2");
        let same = SpecDetails {
            name: "plan.md".into(),
            checksum: local.checksum.clone(),
        };
        let stale = SpecDetails {
            name: "plan.md".into(),
            checksum: checksum_bytes(b"v1"),
        };
        let other = SpecDetails {
            name: "code.md".into(),
            checksum: local.checksum.clone(),
        };
        assert!(should_upload(&local, &[]));
        assert!(should_upload(&local, &[other.clone()]));
        assert!(should_upload(&local, &[stale]));
        assert!(!should_upload(&local, &[other, same]));
    }
}
