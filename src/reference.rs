//! Attach reference sequences to assemblies by name.
//!
//! Every assembly is matched against sequences with the same name found in
//! a list of files. Files already open in the project are scanned right
//! away; the rest are loaded as subtasks. Loaded files that matched
//! something are added to the project, the others are dropped. Once every
//! kept file is added, the matched references are set on their assemblies.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StrandrError};
use crate::task::{Task, TaskContext, TaskFlags, TaskOutput, TaskReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceObject {
    pub name: String,
}

impl SequenceObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A file's content as the project sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub sequences: Vec<SequenceObject>,
}

impl Document {
    pub fn new(url: impl Into<String>, sequences: Vec<SequenceObject>) -> Self {
        Self {
            url: url.into(),
            sequences,
        }
    }
}

/// Points at one sequence of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceRef {
    pub document_url: String,
    pub sequence_name: String,
}

/// The project the assemblies live in.
///
/// Loading and adding documents are tasks of their own so they run under
/// the same scheduler as the resolution.
pub trait Project: Send + Sync {
    /// A document already open in the project
    fn find_document_by_url(&self, url: &str) -> Option<Document>;

    /// Task loading `url`; its output is the loaded [`Document`]
    fn load_document_task(&self, url: &str) -> Box<dyn Task>;

    /// Task adding a loaded document to the project
    fn add_document_task(&self, document: Document) -> Box<dyn Task>;

    fn set_reference(&self, assembly: &str, reference: &SequenceRef);
}

/// Assemblies in the order given, each with at most one reference.
///
/// A reference is set once and never replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyReferenceMap {
    entries: Vec<(String, Option<SequenceRef>)>,
}

impl AssemblyReferenceMap {
    pub fn new<I, S>(assemblies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: assemblies.into_iter().map(|a| (a.into(), None)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reference of the first assembly named `assembly`.
    pub fn get(&self, assembly: &str) -> Option<&SequenceRef> {
        self.entries
            .iter()
            .find(|(name, _)| name == assembly)
            .and_then(|(_, reference)| reference.as_ref())
    }

    pub fn matched(&self) -> impl Iterator<Item = (&str, &SequenceRef)> {
        self.entries
            .iter()
            .filter_map(|(name, reference)| reference.as_ref().map(|r| (name.as_str(), r)))
    }

    pub fn unmatched_count(&self) -> usize {
        self.entries.iter().filter(|(_, r)| r.is_none()).count()
    }

    /// Match the document's sequences against assemblies still without a
    /// reference. Each sequence goes to the first such assembly of the same
    /// name. Returns true when anything matched.
    pub fn scan(&mut self, document: &Document) -> bool {
        let unmatched: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].1.is_none())
            .collect();
        let mut taken = vec![false; unmatched.len()];
        let mut found = false;

        for sequence in &document.sequences {
            let slot = unmatched
                .iter()
                .enumerate()
                .find(|&(k, &i)| !taken[k] && self.entries[i].0 == sequence.name);
            if let Some((k, &i)) = slot {
                taken[k] = true;
                log::debug!("assembly {} -> {} in {}", self.entries[i].0, sequence.name, document.url);
                self.entries[i].1 = Some(SequenceRef {
                    document_url: document.url.clone(),
                    sequence_name: sequence.name.clone(),
                });
                found = true;
            }
        }
        found
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceResolutionResult {
    pub map: AssemblyReferenceMap,
    /// Files that contributed no reference
    pub not_found: Vec<String>,
}

enum Role {
    Load(String),
    Commit(String),
}

pub struct ReferenceResolutionTask {
    project: Arc<dyn Project>,
    urls: Vec<String>,
    map: AssemblyReferenceMap,
    roles: HashMap<String, Role>,
    loads_left: usize,
    commits_left: usize,
    kept: Vec<Document>,
    not_found: Vec<String>,
}

impl ReferenceResolutionTask {
    pub fn new<I, S>(project: Arc<dyn Project>, assemblies: I, urls: Vec<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            project,
            urls,
            map: AssemblyReferenceMap::new(assemblies),
            roles: HashMap::new(),
            loads_left: 0,
            commits_left: 0,
            kept: Vec::new(),
            not_found: Vec::new(),
        }
    }

    fn apply_references(&self) {
        for (assembly, reference) in self.map.matched() {
            self.project.set_reference(assembly, reference);
        }
    }

    fn load_finished(&mut self, url: String, subtask: &mut TaskReport, ctx: &mut TaskContext) -> Result<()> {
        let document = subtask
            .take_output::<Document>()
            .ok_or_else(|| StrandrError::TaskFailed(format!("loading {} produced no document", url)))?;

        if self.map.scan(&document) {
            self.kept.push(document);
        } else {
            log::debug!("[{}] dropping {}: no matching sequence", ctx.id(), document.url);
            self.not_found.push(document.url);
        }

        self.loads_left -= 1;
        if self.loads_left > 0 {
            return Ok(());
        }
        if self.kept.is_empty() {
            self.apply_references();
            return Ok(());
        }
        for document in std::mem::take(&mut self.kept) {
            let url = document.url.clone();
            let id = ctx.add_subtask(self.project.add_document_task(document));
            self.roles.insert(id, Role::Commit(url));
            self.commits_left += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl Task for ReferenceResolutionTask {
    fn name(&self) -> &str {
        "Add references to assemblies by name"
    }

    fn flags(&self) -> TaskFlags {
        TaskFlags::composite().cancel_on_subtask_cancel()
    }

    fn prepare(&mut self, ctx: &mut TaskContext) -> Result<()> {
        for url in self.urls.clone() {
            match self.project.find_document_by_url(&url) {
                Some(document) => {
                    if !self.map.scan(&document) {
                        self.not_found.push(url);
                    }
                }
                None => {
                    let id = ctx.add_subtask(self.project.load_document_task(&url));
                    self.roles.insert(id, Role::Load(url));
                    self.loads_left += 1;
                }
            }
        }
        if self.loads_left == 0 {
            self.apply_references();
        }
        Ok(())
    }

    fn on_subtask_finished(&mut self, mut subtask: TaskReport, ctx: &mut TaskContext) -> Result<()> {
        let role = self.roles.remove(&subtask.id);
        if ctx.should_stop() {
            return Ok(());
        }
        match role {
            Some(Role::Load(url)) => self.load_finished(url, &mut subtask, ctx),
            Some(Role::Commit(url)) => {
                log::debug!("[{}] added {}", ctx.id(), url);
                self.commits_left -= 1;
                if self.commits_left == 0 {
                    self.apply_references();
                }
                Ok(())
            }
            None => {
                log::warn!("[{}] unknown subtask {}", ctx.id(), subtask.id);
                Ok(())
            }
        }
    }

    fn report(&mut self, ctx: &mut TaskContext) -> Result<()> {
        if ctx.should_stop() {
            return Ok(());
        }
        if self.not_found.len() == self.urls.len() {
            ctx.set_error("no files matched: none of the files has a sequence named like a selected assembly");
        } else if !self.not_found.is_empty() {
            ctx.add_warning(format!(
                "These files have no sequence named like a selected assembly: {}",
                self.not_found.join(", ")
            ));
        }
        Ok(())
    }

    fn take_output(&mut self) -> Option<TaskOutput> {
        Some(Box::new(ReferenceResolutionResult {
            map: std::mem::take(&mut self.map),
            not_found: std::mem::take(&mut self.not_found),
        }))
    }
}
