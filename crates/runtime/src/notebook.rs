//! Notebook scanning and watching.
//!
//! The notebook is a directory with `automations/*.md`, `cues/*.md`, and a
//! shared `memory.md`. Each file becomes an [`Automation`] whose identity is
//! its content hash, so renames keep their schedule and edits are new
//! automations.

use hearth_core::automation::Automation;
use notify::{RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One scan of the notebook directory.
#[derive(Debug, Clone, Default)]
pub struct Notebook {
    pub automations: Vec<Automation>,
    pub cues: Vec<Automation>,
}

impl Notebook {
    pub fn automation_by_hash(&self, hash: &str) -> Option<&Automation> {
        self.automations.iter().find(|a| a.hash == hash)
    }

    pub fn cue_by_name(&self, file_name: &str) -> Option<&Automation> {
        self.cues.iter().find(|c| c.file_name == file_name)
    }
}

/// The scratchpad path inside a notebook.
pub fn memory_path(dir: &Path) -> PathBuf {
    dir.join("memory.md")
}

/// Scan the notebook directory. Missing subtrees read as empty.
pub fn scan_notebook(dir: &Path) -> io::Result<Notebook> {
    Ok(Notebook {
        automations: scan_subdir(&dir.join("automations"))?,
        cues: scan_subdir(&dir.join("cues"))?,
    })
}

fn scan_subdir(dir: &Path) -> io::Result<Vec<Automation>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
        .collect();
    files.sort();

    let mut automations = Vec::with_capacity(files.len());
    for path in files {
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable notebook file");
                continue;
            }
        };
        if contents.trim().is_empty() {
            continue;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        automations.push(Automation::new(file_name, contents));
    }

    debug!(dir = %dir.display(), count = automations.len(), "notebook subtree scanned");
    Ok(automations)
}

/// Filesystem watcher over the notebook. Sends one unit per change burst;
/// the runtime debounces and rescans.
pub struct NotebookWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl NotebookWatcher {
    pub fn start(dir: &Path, tx: mpsc::Sender<()>) -> notify::Result<Self> {
        let mut watcher =
            notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
                match event {
                    Ok(event) if event.kind.is_access() => {}
                    Ok(_) => {
                        // a full channel already carries a pending rescan
                        let _ = tx.try_send(());
                    }
                    Err(e) => warn!(error = %e, "notebook watch error"),
                }
            })?;
        watcher.watch(dir, RecursiveMode::Recursive)?;
        Ok(Self { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn empty_notebook_scans_clean() {
        let dir = tempdir().unwrap();
        let notebook = scan_notebook(dir.path()).unwrap();
        assert!(notebook.automations.is_empty());
        assert!(notebook.cues.is_empty());
    }

    #[test]
    fn scans_automations_and_cues() {
        let dir = tempdir().unwrap();
        write(dir.path(), "automations/coffee.md", "Turn on the coffee maker at 7am");
        write(dir.path(), "automations/door.md", "Flash the porch light when the door opens");
        write(dir.path(), "cues/goodnight.md", "Turn everything off");
        write(dir.path(), "automations/notes.txt", "not an automation");
        write(dir.path(), "memory.md", "scratchpad");

        let notebook = scan_notebook(dir.path()).unwrap();
        assert_eq!(notebook.automations.len(), 2);
        assert_eq!(notebook.cues.len(), 1);
        // sorted by file name
        assert_eq!(notebook.automations[0].file_name, "coffee.md");
        assert_eq!(notebook.automations[1].file_name, "door.md");
        assert!(notebook.cue_by_name("goodnight.md").is_some());
    }

    #[test]
    fn blank_files_are_skipped() {
        let dir = tempdir().unwrap();
        write(dir.path(), "automations/empty.md", "  \n\n ");
        let notebook = scan_notebook(dir.path()).unwrap();
        assert!(notebook.automations.is_empty());
    }

    #[test]
    fn edit_changes_hash_rename_does_not() {
        let dir = tempdir().unwrap();
        write(dir.path(), "automations/a.md", "original text");
        let first = scan_notebook(dir.path()).unwrap().automations[0].hash.clone();

        std::fs::rename(
            dir.path().join("automations/a.md"),
            dir.path().join("automations/b.md"),
        )
        .unwrap();
        let renamed = scan_notebook(dir.path()).unwrap().automations[0].hash.clone();
        assert_eq!(first, renamed);

        write(dir.path(), "automations/b.md", "edited text");
        let edited = scan_notebook(dir.path()).unwrap().automations[0].hash.clone();
        assert_ne!(first, edited);
    }

    #[test]
    fn lookup_by_hash() {
        let dir = tempdir().unwrap();
        write(dir.path(), "automations/a.md", "some automation");
        let notebook = scan_notebook(dir.path()).unwrap();
        let hash = notebook.automations[0].hash.clone();
        assert!(notebook.automation_by_hash(&hash).is_some());
        assert!(notebook.automation_by_hash("missing").is_none());
    }
}
