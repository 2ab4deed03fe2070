//! Common test utilities and helpers

#![allow(dead_code)]

use ladderpath_vocab::artifact::{artifact_path, write_artifact, PosetMultiset};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch workspace holding inputs and outputs of one test
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Write a headed CSV whose `DNA_Sequence` column holds `sequences`
    pub fn sequence_csv(&self, name: &str, sequences: &[&str]) -> PathBuf {
        let mut content = String::from("Gene_ID,DNA_Sequence\n");
        for (i, sequence) in sequences.iter().enumerate() {
            content.push_str(&format!("gene{},{}\n", i + 1, sequence));
        }
        let path = self.join(name);
        fs::write(&path, content).expect("write csv");
        path
    }

    /// Write one artifact from JSON into `folder`
    pub fn artifact(&self, folder: &str, batch_index: usize, json: &str) -> PathBuf {
        let pom: PosetMultiset = serde_json::from_str(json).expect("artifact json");
        let path = artifact_path(&self.join(folder), batch_index);
        write_artifact(&path, &pom).expect("write artifact");
        path
    }

    /// Write an executable shell script
    #[cfg(unix)]
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
        let mut permissions = fs::metadata(&path).expect("script metadata").permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).expect("chmod script");
        path
    }
}
